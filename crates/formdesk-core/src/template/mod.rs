//! # Per-form Transformation Templates
//!
//! A template is a small declarative YAML program that maps one [`Entry`] to
//! the ordered [`RequestDocument`]s sent to the ticketing system. Templates
//! are selected by form hash and fetched through a [`TemplateStore`].
//!
//! ```yaml
//! description: Consent form
//! requests:
//!   - name: ticket
//!     method: POST
//!     path: /api/v1/sr
//!     body:
//!       name: ServiceRequest
//!       attributes: { source: "webform-{{entry.hash}}" }
//!       children:
//!         - name: title
//!           value: "Entry {{entry.id}}: {{Field1.title}}"
//!         - name: notes
//!           value: "{{Field9?}}"
//!           omit_empty: true
//! ```
//!
//! Each request may also carry `when: <FieldId>` (emit only when the field
//! is present and non-empty) and `for_each: { pattern: <regex> }` (emit one
//! document per entry field whose id matches, in entry order). Placeholder
//! syntax is described in the `placeholder` module.
//!
//! Transformation is pure: the output depends only on the entry and the
//! template.

use crate::entry::Entry;
use crate::request::{is_xml_name, HttpMethod, RequestDocument, XmlElement};
use crate::FormHash;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, instrument};

mod placeholder;
mod store;

use placeholder::{RenderContext, TextTemplate};
pub use store::{FilesystemTemplateStore, InMemoryTemplateStore};

/// Base used to check that compiled request paths form valid URLs.
const PATH_CHECK_BASE: &str = "http://ticketing.invalid";

// ============================================================================
// Errors
// ============================================================================

/// Errors raised while locating or compiling a template.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("No template is registered for form '{hash}'")]
    NotFound { hash: String },

    #[error("Template for form '{hash}' could not be read: {message}")]
    Unreadable { hash: String, message: String },

    #[error("Form hash '{hash}' cannot name a template location: {message}")]
    InvalidLocation { hash: String, message: String },

    #[error("Template is malformed: {message}")]
    Malformed { message: String },
}

impl TemplateError {
    fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }
}

/// Errors raised while applying a template to an entry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransformError {
    #[error("Request '{request}' requires field '{field}' which the entry does not contain")]
    MissingField { request: String, field: String },

    #[error("Request '{request}' produced invalid output: {message}")]
    InvalidOutput { request: String, message: String },
}

// ============================================================================
// Template Store
// ============================================================================

/// Source of raw per-form template text.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Fetch the template source registered for a form.
    ///
    /// # Errors
    ///
    /// - [`TemplateError::NotFound`] when nothing is registered for the hash
    /// - [`TemplateError::InvalidLocation`] when the hash cannot address a template
    /// - [`TemplateError::Unreadable`] when the template exists but cannot be read
    async fn fetch(&self, hash: &FormHash) -> Result<String, TemplateError>;
}

/// Fetch and compile the template for a form.
#[instrument(skip(store), fields(form_hash = %hash))]
pub async fn load_template(
    store: &dyn TemplateStore,
    hash: &FormHash,
) -> Result<Template, TemplateError> {
    let source = store.fetch(hash).await?;
    let template = Template::parse(&source)?;
    debug!(
        description = template.description().unwrap_or_default(),
        requests = ?template.request_names().collect::<Vec<_>>(),
        "Template compiled"
    );
    Ok(template)
}

// ============================================================================
// Template Definition (YAML)
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TemplateDefinition {
    #[serde(default)]
    description: Option<String>,
    requests: Vec<RequestDefinition>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RequestDefinition {
    name: String,
    #[serde(default)]
    method: HttpMethod,
    path: String,
    #[serde(default)]
    when: Option<String>,
    #[serde(default)]
    for_each: Option<ForEachDefinition>,
    body: ElementDefinition,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ForEachDefinition {
    pattern: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ElementDefinition {
    name: String,
    #[serde(default)]
    attributes: BTreeMap<String, String>,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    children: Vec<ElementDefinition>,
    #[serde(default)]
    omit_empty: bool,
}

// ============================================================================
// Compiled Template
// ============================================================================

/// A compiled, validated template.
#[derive(Debug, Clone)]
pub struct Template {
    description: Option<String>,
    requests: Vec<RequestTemplate>,
}

#[derive(Debug, Clone)]
struct RequestTemplate {
    name: String,
    method: HttpMethod,
    path: TextTemplate,
    when: Option<String>,
    for_each: Option<Regex>,
    body: ElementTemplate,
}

#[derive(Debug, Clone)]
struct ElementTemplate {
    name: String,
    attributes: Vec<(String, TextTemplate)>,
    value: Option<TextTemplate>,
    children: Vec<ElementTemplate>,
    omit_empty: bool,
}

impl Template {
    /// Parse and compile template source.
    ///
    /// Every placeholder, pattern, element name, and path is checked here so
    /// that a template which compiles can only fail to transform because of
    /// the entry it is applied to.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Malformed`] describing the first problem found.
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let definition: TemplateDefinition = serde_yaml::from_str(source)
            .map_err(|e| TemplateError::malformed(format!("invalid template YAML: {e}")))?;

        let mut seen = HashSet::new();
        let mut requests = Vec::with_capacity(definition.requests.len());
        for request in definition.requests {
            if !seen.insert(request.name.clone()) {
                return Err(TemplateError::malformed(format!(
                    "request name '{}' is used more than once",
                    request.name
                )));
            }
            requests.push(RequestTemplate::compile(request)?);
        }

        Ok(Self {
            description: definition.description,
            requests,
        })
    }

    /// Free-text description from the template file
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Names of the template's requests in declaration order
    pub fn request_names(&self) -> impl Iterator<Item = &str> {
        self.requests.iter().map(|r| r.name.as_str())
    }

    /// Number of declared requests, before guards and fan-out
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Check whether the template declares no requests
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Apply the template to an entry.
    ///
    /// # Errors
    ///
    /// - [`TransformError::MissingField`] when a required reference is absent
    /// - [`TransformError::InvalidOutput`] when a value cannot be represented in XML
    pub fn transform(&self, entry: &Entry) -> Result<Vec<RequestDocument>, TransformError> {
        let mut documents = Vec::new();

        for request in &self.requests {
            if let Some(guard) = &request.when {
                let present = entry.field(guard).is_some_and(|f| !f.value().is_empty());
                if !present {
                    debug!(request = %request.name, field_id = %guard, "Request skipped by guard");
                    continue;
                }
            }

            match &request.for_each {
                None => {
                    let ctx = RenderContext {
                        entry,
                        current: None,
                        request: &request.name,
                    };
                    documents.push(request.render(request.name.clone(), &ctx)?);
                }
                Some(pattern) => {
                    for field in entry.fields().iter().filter(|f| pattern.is_match(f.id())) {
                        let ctx = RenderContext {
                            entry,
                            current: Some(field),
                            request: &request.name,
                        };
                        let name = format!("{}:{}", request.name, field.id());
                        documents.push(request.render(name, &ctx)?);
                    }
                }
            }
        }

        Ok(documents)
    }
}

impl RequestTemplate {
    fn compile(definition: RequestDefinition) -> Result<Self, TemplateError> {
        let name = definition.name;
        if name.trim().is_empty() {
            return Err(TemplateError::malformed("request name must not be empty"));
        }
        let in_for_each = definition.for_each.is_some();
        let context =
            |message: String| TemplateError::malformed(format!("request '{name}': {message}"));

        let path = TextTemplate::parse(&definition.path, in_for_each).map_err(context)?;
        check_path(&path.sample("x")).map_err(context)?;

        let for_each = definition
            .for_each
            .map(|fe| {
                Regex::new(&fe.pattern)
                    .map_err(|e| context(format!("invalid for_each pattern: {e}")))
            })
            .transpose()?;

        let when = match definition.when {
            Some(field) if field.trim().is_empty() => {
                return Err(context("'when' must name a field".to_string()));
            }
            other => other,
        };

        let body = ElementTemplate::compile(definition.body, in_for_each).map_err(context)?;

        Ok(Self {
            name,
            method: definition.method,
            path,
            when,
            for_each,
            body,
        })
    }

    fn render(
        &self,
        name: String,
        ctx: &RenderContext<'_>,
    ) -> Result<RequestDocument, TransformError> {
        let path = self.path.render(ctx, true)?;
        let body = self.body.render_root(ctx)?;

        Ok(RequestDocument {
            name,
            method: self.method,
            path,
            body,
        })
    }
}

impl ElementTemplate {
    fn compile(definition: ElementDefinition, in_for_each: bool) -> Result<Self, String> {
        if !is_xml_name(&definition.name) {
            return Err(format!("'{}' is not a valid element name", definition.name));
        }

        let mut attributes = Vec::with_capacity(definition.attributes.len());
        for (name, value) in definition.attributes {
            if !is_xml_name(&name) {
                return Err(format!(
                    "'{name}' is not a valid attribute name on <{}>",
                    definition.name
                ));
            }
            attributes.push((name, TextTemplate::parse(&value, in_for_each)?));
        }

        let value = definition
            .value
            .map(|v| TextTemplate::parse(&v, in_for_each))
            .transpose()?;

        let children = definition
            .children
            .into_iter()
            .map(|child| Self::compile(child, in_for_each))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: definition.name,
            attributes,
            value,
            children,
            omit_empty: definition.omit_empty,
        })
    }

    /// Render a request body. The root is kept even when `omit_empty` is set.
    fn render_root(&self, ctx: &RenderContext<'_>) -> Result<XmlElement, TransformError> {
        self.build(ctx)
    }

    /// Render a nested element. Returns `None` when `omit_empty` applies.
    fn render(&self, ctx: &RenderContext<'_>) -> Result<Option<XmlElement>, TransformError> {
        let element = self.build(ctx)?;
        let has_text = element.text.as_deref().is_some_and(|t| !t.is_empty());
        if self.omit_empty && !has_text && element.children.is_empty() {
            return Ok(None);
        }
        Ok(Some(element))
    }

    fn build(&self, ctx: &RenderContext<'_>) -> Result<XmlElement, TransformError> {
        let mut element = XmlElement::new(self.name.as_str());

        for (name, value) in &self.attributes {
            element = element.with_attribute(name.as_str(), value.render(ctx, false)?);
        }
        if let Some(value) = &self.value {
            element = element.with_text(value.render(ctx, false)?);
        }
        for child in &self.children {
            if let Some(rendered) = child.render(ctx)? {
                element = element.with_child(rendered);
            }
        }
        Ok(element)
    }
}

/// Check a request path with placeholders already substituted.
fn check_path(path: &str) -> Result<(), String> {
    if !path.starts_with('/') {
        return Err(format!("path '{path}' must start with '/'"));
    }
    if path.starts_with("//") {
        return Err(format!("path '{path}' must not name a host"));
    }
    url::Url::parse(PATH_CHECK_BASE)
        .and_then(|base| base.join(path))
        .map(|_| ())
        .map_err(|e| format!("path '{path}' is not a valid URL path: {e}"))
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
