//! # Formdesk Core
//!
//! Core pipeline for turning form-provider webhook entries into service-desk
//! ticket requests.
//!
//! This crate contains the domain logic for authenticating inbound entries,
//! resolving field titles against the caller-supplied field structure,
//! assembling the canonical [`Entry`], interpreting per-form templates, and
//! dispatching the resulting requests to the ticketing system.
//!
//! ## Architecture
//!
//! The pipeline depends only on trait abstractions at its edges:
//! - [`template::TemplateStore`] supplies raw per-form templates
//! - [`dispatch::TicketTransport`] delivers rendered requests
//!
//! Concrete implementations (filesystem store, HTTP transport) are injected
//! by the service binary at startup.
//!
//! ## Usage
//!
//! ```rust
//! use formdesk_core::{EntryId, FormHash};
//!
//! let hash = FormHash::new("z7x4a9").unwrap();
//! let entry_id = EntryId::new("42");
//! assert_eq!(hash.as_str(), "z7x4a9");
//! assert_eq!(entry_id.to_string(), "42");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Domain Identifier Types
// ============================================================================

/// Identifier of a source form; selects the transformation template.
///
/// The value is opaque. The only rule is that it must not be empty, since an
/// empty hash cannot select a template.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FormHash(String);

impl FormHash {
    /// Create new form hash with validation
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        if value.is_empty() {
            return Err(ValidationError::Required {
                field: "form_hash".to_string(),
            });
        }
        Ok(Self(value))
    }

    /// Build a form hash from a request path, stripping every slash.
    pub fn from_path(path: &str) -> Result<Self, ValidationError> {
        Self::new(path.replace('/', ""))
    }

    /// Get string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FormHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FormHash {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

/// Provider-assigned identifier of a single form submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryId(String);

impl EntryId {
    /// Create new entry ID
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Get string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Error type for input validation failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum ValidationError {
    #[error("Field '{field}' is required")]
    Required { field: String },
}

// ============================================================================
// Module declarations
// ============================================================================

/// Inbound request parameters
pub mod params;

/// Shared-secret handshake verification
pub mod auth;

/// Field structure parsing and title resolution
pub mod schema;

/// Canonical entry assembly
pub mod entry;

/// Outbound request documents and XML rendering
pub mod request;

/// Per-form transformation templates
pub mod template;

/// Delivery of request documents to the ticketing system
pub mod dispatch;

/// End-to-end pipeline orchestration
pub mod pipeline;

// Re-export key types for convenience
pub use auth::{HandshakeError, HandshakeVerifier};
pub use dispatch::{
    DispatchAck, DispatchError, DispatchOutcome, DispatchReport, Dispatcher, HttpTicketTransport,
    TicketTransport,
};
pub use entry::{Entry, EntryAssembler, EntryField};
pub use params::Parameters;
pub use pipeline::{EntryPipeline, PipelineError, PipelineOutput, Submission, SubmissionError};
pub use request::{HttpMethod, RenderError, RequestDocument, RequestSet, XmlElement};
pub use schema::{FieldNode, FieldStructure, StructureError};
pub use template::{
    FilesystemTemplateStore, InMemoryTemplateStore, Template, TemplateError, TemplateStore,
    TransformError,
};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
