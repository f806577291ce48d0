//! Outbound request documents and XML rendering.
//!
//! A [`RequestDocument`] is one service-desk request produced by a template:
//! the HTTP method and path to use against the ticketing system, plus an XML
//! body. The [`RequestSet`] groups every document produced for one entry and
//! renders them as the response body returned to the form provider.

use crate::{EntryId, FormHash};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// HTTP Method
// ============================================================================

/// HTTP method used to deliver a request document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    #[serde(alias = "post")]
    Post,
    #[serde(alias = "put")]
    Put,
    #[serde(alias = "patch")]
    Patch,
}

impl HttpMethod {
    /// Upper-case method token as sent on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// XML Element Tree
// ============================================================================

/// Error raised when a document cannot be serialized as XML 1.0.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Failed to render XML document: {message}")]
pub struct RenderError {
    pub message: String,
}

impl RenderError {
    /// Create a render error with a description of the offending content
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A minimal owned XML element.
///
/// Attributes keep insertion order. Text, when present, is written before
/// any child elements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: Option<String>,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    /// Create an empty element. The name is validated when rendering.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Append an attribute
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    /// Set the text content, replacing any earlier text
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Append a child element
    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(child);
        self
    }

    /// Value of the first attribute with the given name
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// First direct child with the given element name
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Render this element as an indented XML document with declaration.
    pub fn to_pretty_xml(&self) -> Result<String, RenderError> {
        render_document(self)
    }

    fn validate(&self) -> Result<(), RenderError> {
        if !is_xml_name(&self.name) {
            return Err(RenderError::new(format!(
                "'{}' is not a valid element name",
                self.name
            )));
        }
        for (name, value) in &self.attributes {
            if !is_xml_name(name) {
                return Err(RenderError::new(format!(
                    "'{name}' is not a valid attribute name on <{}>",
                    self.name
                )));
            }
            check_text(value).map_err(|c| {
                RenderError::new(format!(
                    "attribute '{name}' on <{}> contains character U+{:04X}",
                    self.name, c as u32
                ))
            })?;
        }
        if let Some(text) = &self.text {
            check_text(text).map_err(|c| {
                RenderError::new(format!(
                    "text of <{}> contains character U+{:04X}",
                    self.name, c as u32
                ))
            })?;
        }
        self.children.iter().try_for_each(XmlElement::validate)
    }

    fn write_to<W: std::io::Write>(&self, writer: &mut Writer<W>) -> Result<(), quick_xml::Error> {
        let mut start = BytesStart::new(self.name.as_str());
        for (name, value) in &self.attributes {
            start.push_attribute((name.as_str(), value.as_str()));
        }

        let text = self.text.as_deref().filter(|t| !t.is_empty());
        if text.is_none() && self.children.is_empty() {
            return writer.write_event(Event::Empty(start));
        }

        writer.write_event(Event::Start(start))?;
        if let Some(text) = text {
            writer.write_event(Event::Text(BytesText::new(text)))?;
        }
        for child in &self.children {
            child.write_to(writer)?;
        }
        writer.write_event(Event::End(BytesEnd::new(self.name.as_str())))
    }
}

/// Check whether `c` may appear in an XML 1.0 document.
pub fn is_xml_char(c: char) -> bool {
    matches!(c,
        '\u{9}' | '\u{A}' | '\u{D}'
        | '\u{20}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
}

/// Return the first character of `text` that XML 1.0 cannot represent.
pub fn check_text(text: &str) -> Result<(), char> {
    match text.chars().find(|c| !is_xml_char(*c)) {
        Some(c) => Err(c),
        None => Ok(()),
    }
}

/// Check whether `name` is usable as an element or attribute name.
pub fn is_xml_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    let first_ok = first.is_alphabetic() || first == '_';
    first_ok && chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

fn render_document(root: &XmlElement) -> Result<String, RenderError> {
    root.validate()?;

    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .and_then(|_| root.write_to(&mut writer))
        .map_err(|e| RenderError::new(e.to_string()))?;

    String::from_utf8(writer.into_inner()).map_err(|e| RenderError::new(e.to_string()))
}

// ============================================================================
// Request Documents
// ============================================================================

/// One outbound service-desk request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDocument {
    /// Template-assigned name, unique within one request set
    pub name: String,
    pub method: HttpMethod,
    /// Path relative to the ticketing base URL
    pub path: String,
    pub body: XmlElement,
}

impl RequestDocument {
    /// Render the body as a standalone XML document for transport.
    pub fn body_xml(&self) -> Result<String, RenderError> {
        self.body.to_pretty_xml()
    }

    fn to_element(&self) -> XmlElement {
        XmlElement::new("request")
            .with_attribute("name", self.name.as_str())
            .with_attribute("method", self.method.as_str())
            .with_attribute("path", self.path.as_str())
            .with_child(self.body.clone())
    }
}

/// The ordered request documents produced for one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSet {
    pub hash: FormHash,
    pub entry_id: EntryId,
    pub requests: Vec<RequestDocument>,
}

impl RequestSet {
    /// Wrap rendered requests for one entry
    pub fn new(hash: FormHash, entry_id: EntryId, requests: Vec<RequestDocument>) -> Self {
        Self {
            hash,
            entry_id,
            requests,
        }
    }

    /// Number of requests in the set
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Check whether every request was guarded out
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Render the full set as the indented XML returned to the caller.
    ///
    /// ```text
    /// <requests hash=".." entryId="..">
    ///   <request name=".." method=".." path="..">BODY</request>
    /// </requests>
    /// ```
    pub fn to_pretty_xml(&self) -> Result<String, RenderError> {
        let root = self.requests.iter().fold(
            XmlElement::new("requests")
                .with_attribute("hash", self.hash.as_str())
                .with_attribute("entryId", self.entry_id.as_str()),
            |root, request| root.with_child(request.to_element()),
        );
        render_document(&root)
    }
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
