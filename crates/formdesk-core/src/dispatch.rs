//! # Ticket Dispatch
//!
//! Delivers rendered [`RequestDocument`]s to the ticketing system.
//!
//! Requests are sent one at a time in order. A failed request never stops
//! the ones after it, and nothing is retried or rolled back: the caller gets
//! a [`DispatchReport`] with exactly one [`DispatchOutcome`] per request.

use crate::request::{HttpMethod, RenderError, RequestDocument};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};
use url::Url;

/// Content type of outbound request bodies.
pub const XML_CONTENT_TYPE: &str = "text/xml; charset=UTF-8";

// ============================================================================
// Core Types
// ============================================================================

/// Acknowledgement returned by the ticketing system for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchAck {
    pub status: u16,
    pub body: String,
}

/// Result of sending one request document.
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    Delivered {
        request: String,
        acknowledgement: DispatchAck,
    },
    Failed {
        request: String,
        error: DispatchError,
        is_transient: bool,
    },
}

impl DispatchOutcome {
    /// Name of the request this outcome belongs to
    pub fn request(&self) -> &str {
        match self {
            Self::Delivered { request, .. } | Self::Failed { request, .. } => request,
        }
    }

    /// Check whether the ticketing system accepted the request
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

/// Outcomes of one dispatch run, in request order.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    pub outcomes: Vec<DispatchOutcome>,
}

impl DispatchReport {
    /// Number of requests attempted
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Check whether nothing was dispatched
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Number of requests the ticketing system accepted
    pub fn delivered_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_delivered()).count()
    }

    /// Number of requests that failed
    pub fn failed_count(&self) -> usize {
        self.len() - self.delivered_count()
    }

    /// Check if every request was delivered
    pub fn is_complete_success(&self) -> bool {
        self.outcomes.iter().all(DispatchOutcome::is_delivered)
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while delivering one request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("Ticketing system rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Transport failure: {message}")]
    Transport { message: String },

    #[error("Invalid request target: {message}")]
    InvalidTarget { message: String },

    #[error(transparent)]
    Render(#[from] RenderError),
}

impl DispatchError {
    /// Check if a later attempt could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Rejected { status, .. } => *status >= 500 || *status == 429 || *status == 408,
            Self::Transport { .. } => true,
            Self::InvalidTarget { .. } | Self::Render(_) => false,
        }
    }
}

// ============================================================================
// Transport Trait
// ============================================================================

/// Interface for delivering one request document to the ticketing system.
#[async_trait]
pub trait TicketTransport: Send + Sync {
    async fn send(&self, request: &RequestDocument) -> Result<DispatchAck, DispatchError>;
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Sends request documents sequentially through a [`TicketTransport`].
#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn TicketTransport>,
}

impl Dispatcher {
    /// Create a dispatcher sending through the given transport
    pub fn new(transport: Arc<dyn TicketTransport>) -> Self {
        Self { transport }
    }

    /// Send every request, in order, isolating failures.
    #[instrument(skip_all, fields(requests = requests.len()))]
    pub async fn dispatch_all(&self, requests: &[RequestDocument]) -> DispatchReport {
        let mut report = DispatchReport::default();

        for request in requests {
            let outcome = match self.transport.send(request).await {
                Ok(acknowledgement) => {
                    info!(
                        request = %request.name,
                        method = %request.method,
                        path = %request.path,
                        status = acknowledgement.status,
                        "Request delivered"
                    );
                    DispatchOutcome::Delivered {
                        request: request.name.clone(),
                        acknowledgement,
                    }
                }
                Err(error) => {
                    let is_transient = error.is_transient();
                    error!(
                        request = %request.name,
                        method = %request.method,
                        path = %request.path,
                        error = %error,
                        is_transient,
                        "Request delivery failed"
                    );
                    DispatchOutcome::Failed {
                        request: request.name.clone(),
                        error,
                        is_transient,
                    }
                }
            };
            report.outcomes.push(outcome);
        }

        report
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("transport", &"<TicketTransport>")
            .finish()
    }
}

// ============================================================================
// HTTP Transport
// ============================================================================

/// Delivers request documents over HTTP.
///
/// The document path is appended to the base URL, so a base of
/// `https://desk.example.com/api` and a path of `/v1/sr` target
/// `https://desk.example.com/api/v1/sr`.
#[derive(Clone)]
pub struct HttpTicketTransport {
    client: reqwest::Client,
    base_url: Url,
    api_key: Option<(String, String)>,
}

impl HttpTicketTransport {
    /// Create a transport with the given request timeout.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::InvalidTarget` when the base URL cannot carry
    /// a path, and `DispatchError::Transport` when the HTTP client cannot be
    /// built.
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, DispatchError> {
        if base_url.cannot_be_a_base() {
            return Err(DispatchError::InvalidTarget {
                message: format!("'{base_url}' cannot be used as a base URL"),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("formdesk/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DispatchError::Transport {
                message: format!("Failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url,
            api_key: None,
        })
    }

    /// Send an API key in the named header with every request.
    pub fn with_api_key(mut self, header: impl Into<String>, key: impl Into<String>) -> Self {
        self.api_key = Some((header.into(), key.into()));
        self
    }

    /// Base URL request paths are appended to
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build the absolute URL for a request path.
    pub fn target_url(&self, path: &str) -> Result<Url, DispatchError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Url::parse(&format!("{base}/{path}")).map_err(|e| DispatchError::InvalidTarget {
            message: format!("'{path}' cannot be joined to '{base}': {e}"),
        })
    }
}

#[async_trait]
impl TicketTransport for HttpTicketTransport {
    async fn send(&self, request: &RequestDocument) -> Result<DispatchAck, DispatchError> {
        let url = self.target_url(&request.path)?;
        let body = request.body_xml()?;

        let method = match request.method {
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
        };

        let mut builder = self
            .client
            .request(method, url)
            .header(CONTENT_TYPE, XML_CONTENT_TYPE)
            .body(body);
        if let Some((header, key)) = &self.api_key {
            builder = builder.header(header.as_str(), key.as_str());
        }

        let response = builder.send().await.map_err(|e| DispatchError::Transport {
            message: e.to_string(),
        })?;

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!(
                    request = %request.name,
                    status = status.as_u16(),
                    error = %e,
                    "Failed to read ticketing response body"
                );
                format!("<unreadable response body: {e}>")
            }
        };

        if status.is_success() {
            Ok(DispatchAck {
                status: status.as_u16(),
                body,
            })
        } else {
            Err(DispatchError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}

impl std::fmt::Debug for HttpTicketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTicketTransport")
            .field("base_url", &self.base_url.as_str())
            .field(
                "api_key",
                &self
                    .api_key
                    .as_ref()
                    .map(|(header, _)| (header, "<REDACTED>")),
            )
            .finish()
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
