//! Error types for the HTTP service

use crate::DISPATCH_FAILURES_HEADER;
use axum::{
    http::{header::CONTENT_TYPE, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use formdesk_core::{
    HandshakeError, PipelineError, StructureError, SubmissionError, TemplateError, TransformError,
};
use tracing::{error, warn};

/// Entry handler errors with HTTP status code mapping
///
/// - `400 Bad Request`: the entry itself is incomplete (missing handshake
///   key, entry id, field structure, or a field the template requires), or
///   the form hash cannot name a template
/// - `403 Forbidden`: the handshake key does not match
/// - `404 Not Found`: no template exists for the form
/// - `500 Internal Server Error`: the field structure or template is broken,
///   or the output cannot be rendered
/// - `502 Bad Gateway`: dispatch failed and the service is configured to
///   report it
///
/// Messages are returned to the caller as-is; the form provider's
/// notification log is where operators see them.
#[derive(Debug, thiserror::Error)]
pub enum EntryHandlerError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// Some requests could not be delivered to the ticketing system.
    ///
    /// The response body is still the rendered request set.
    #[error("{failed} of {total} ticket requests could not be dispatched")]
    DispatchFailed {
        failed: usize,
        total: usize,
        rendered: String,
    },
}

impl EntryHandlerError {
    /// HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Pipeline(e) => pipeline_status(e),
            Self::DispatchFailed { .. } => StatusCode::BAD_GATEWAY,
        }
    }
}

fn pipeline_status(error: &PipelineError) -> StatusCode {
    match error {
        PipelineError::Handshake(HandshakeError::Missing) => StatusCode::BAD_REQUEST,
        PipelineError::Handshake(HandshakeError::Mismatch) => StatusCode::FORBIDDEN,
        PipelineError::Submission(SubmissionError::MissingEntryId) => StatusCode::BAD_REQUEST,
        PipelineError::Submission(SubmissionError::MissingHash) => StatusCode::NOT_FOUND,
        PipelineError::Structure(StructureError::Missing { .. }) => StatusCode::BAD_REQUEST,
        PipelineError::Structure(
            StructureError::InvalidJson { .. } | StructureError::InvalidShape { .. },
        ) => StatusCode::INTERNAL_SERVER_ERROR,
        PipelineError::Template(
            TemplateError::NotFound { .. } | TemplateError::Unreadable { .. },
        ) => StatusCode::NOT_FOUND,
        PipelineError::Template(TemplateError::InvalidLocation { .. }) => StatusCode::BAD_REQUEST,
        PipelineError::Template(TemplateError::Malformed { .. }) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        PipelineError::Transform(TransformError::MissingField { .. }) => StatusCode::BAD_REQUEST,
        PipelineError::Transform(TransformError::InvalidOutput { .. }) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        PipelineError::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for EntryHandlerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();

        if status.is_server_error() {
            error!(status = %status, error = %message, "Entry processing failed");
        } else {
            warn!(status = %status, error = %message, "Entry rejected");
        }

        if let Self::DispatchFailed {
            failed, rendered, ..
        } = self
        {
            let mut response = (status, rendered).into_response();
            let headers = response.headers_mut();
            headers.insert(
                CONTENT_TYPE,
                HeaderValue::from_static(crate::XML_CONTENT_TYPE),
            );
            headers.insert(DISPATCH_FAILURES_HEADER, HeaderValue::from(failed));
            return response;
        }

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        (status, Json(body)).into_response()
    }
}

/// Service-level errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Failed to bind to address {address}: {message}")]
    BindFailed { address: String, message: String },

    #[error("Server failed: {message}")]
    ServerFailed { message: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },
}
