//! Inbound request parameters.
//!
//! Form providers deliver entries as URL-encoded parameters, split between the
//! query string and the request body. [`Parameters`] merges both sources into
//! one ordered collection where the first value of a repeated name wins.

use url::form_urlencoded;

/// Ordered, de-duplicated name/value parameters of one inbound request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parameters {
    pairs: Vec<(String, String)>,
}

impl Parameters {
    /// Create an empty parameter set
    pub fn new() -> Self {
        Self::default()
    }

    /// Build parameters from the raw query string and URL-encoded body.
    ///
    /// Query parameters are read first, so a name present in both sources
    /// keeps its query-string value.
    pub fn from_query_and_form(query: Option<&str>, form_body: &[u8]) -> Self {
        let mut params = Self::new();
        if let Some(query) = query {
            params.extend_encoded(query.as_bytes());
        }
        params.extend_encoded(form_body);
        params
    }

    /// Append URL-encoded pairs, ignoring names that are already present.
    pub fn extend_encoded(&mut self, encoded: &[u8]) {
        for (name, value) in form_urlencoded::parse(encoded) {
            self.insert(name.into_owned(), value.into_owned());
        }
    }

    /// Insert a parameter unless one with the same name already exists.
    ///
    /// Returns `true` when the value was stored.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> bool {
        let name = name.into();
        if self.contains(&name) {
            return false;
        }
        self.pairs.push((name, value.into()));
        true
    }

    /// Look up the value of a parameter
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Check whether a parameter is present
    pub fn contains(&self, name: &str) -> bool {
        self.pairs.iter().any(|(n, _)| n == name)
    }

    /// Iterate parameters in arrival order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of distinct parameter names
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Check whether no parameter was supplied
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Parameters
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (name, value) in iter {
            params.insert(name, value);
        }
        params
    }
}

#[cfg(test)]
#[path = "params_tests.rs"]
mod tests;
