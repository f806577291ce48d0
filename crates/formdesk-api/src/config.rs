//! Configuration types for the HTTP service

use crate::errors::ConfigError;
use axum::http::HeaderName;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Service configuration
///
/// Every section carries serde defaults, so an empty configuration source
/// yields a runnable (unauthenticated) service.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Inbound entry endpoint settings
    pub webhook: WebhookConfig,

    /// Template lookup settings
    pub templates: TemplatesConfig,

    /// Outbound ticketing system settings
    pub ticketing: TicketingConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl ServiceConfig {
    /// Check the configuration for values the service cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.webhook.validate()?;
        self.ticketing.validate()?;
        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,

    /// Maximum request size in bytes
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            shutdown_timeout_seconds: 30,
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

impl ServerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Missing {
                key: "server.host".to_string(),
            });
        }
        if self.max_body_size == 0 {
            return Err(ConfigError::Invalid {
                message: "server.max_body_size must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Inbound entry endpoint configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Path prefix of the entry endpoint; the form hash follows it
    pub endpoint_path: String,

    /// Pre-shared handshake key. Unset or empty disables authentication.
    pub handshake_key: Option<String>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            endpoint_path: "/entries".to_string(),
            handshake_key: None,
        }
    }
}

impl WebhookConfig {
    /// Endpoint prefix without trailing slashes; empty for a root endpoint.
    pub fn endpoint_prefix(&self) -> &str {
        self.endpoint_path.trim_end_matches('/')
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.endpoint_path.starts_with('/') {
            return Err(ConfigError::Invalid {
                message: format!(
                    "webhook.endpoint_path '{}' must start with '/'",
                    self.endpoint_path
                ),
            });
        }
        if self
            .endpoint_path
            .contains(|c| matches!(c, '{' | '}' | '*'))
        {
            return Err(ConfigError::Invalid {
                message: format!(
                    "webhook.endpoint_path '{}' must not contain route parameters",
                    self.endpoint_path
                ),
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("endpoint_path", &self.endpoint_path)
            .field(
                "handshake_key",
                &self.handshake_key.as_ref().map(|_| "<REDACTED>"),
            )
            .finish()
    }
}

/// Template lookup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplatesConfig {
    /// Directory holding `<form-hash>.yaml` templates
    pub directory: PathBuf,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./templates"),
        }
    }
}

/// Outbound ticketing system configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TicketingConfig {
    /// Base URL that request paths are appended to
    pub base_url: String,

    /// Per-request timeout in seconds
    pub timeout_seconds: u64,

    /// Header carrying the API key, if the ticketing system needs one
    pub api_key_header: Option<String>,

    pub api_key: Option<String>,

    /// Answer 502 instead of 200 when any request fails to dispatch
    pub fail_on_dispatch_error: bool,
}

impl Default for TicketingConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8081".to_string(),
            timeout_seconds: 30,
            api_key_header: None,
            api_key: None,
            fail_on_dispatch_error: false,
        }
    }
}

impl TicketingConfig {
    /// Parse the configured base URL.
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.base_url).map_err(|e| ConfigError::Invalid {
            message: format!(
                "ticketing.base_url '{}' is not a valid URL: {e}",
                self.base_url
            ),
        })?;
        if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid {
                message: format!(
                    "ticketing.base_url '{}' must be an absolute http(s) URL",
                    self.base_url
                ),
            });
        }
        Ok(url)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Header name and key to send with every request, when both are set.
    pub fn api_key(&self) -> Option<(&str, &str)> {
        match (&self.api_key_header, &self.api_key) {
            (Some(header), Some(key)) => Some((header.as_str(), key.as_str())),
            _ => None,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.base_url()?;

        if self.timeout_seconds == 0 {
            return Err(ConfigError::Invalid {
                message: "ticketing.timeout_seconds must be greater than zero".to_string(),
            });
        }

        match (&self.api_key_header, &self.api_key) {
            (Some(header), Some(_)) => {
                HeaderName::from_bytes(header.as_bytes()).map_err(|_| ConfigError::Invalid {
                    message: format!(
                        "ticketing.api_key_header '{header}' is not a valid header name"
                    ),
                })?;
            }
            (None, Some(_)) => {
                return Err(ConfigError::Missing {
                    key: "ticketing.api_key_header".to_string(),
                });
            }
            (Some(_), None) => {
                return Err(ConfigError::Missing {
                    key: "ticketing.api_key".to_string(),
                });
            }
            (None, None) => {}
        }
        Ok(())
    }
}

impl std::fmt::Debug for TicketingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketingConfig")
            .field("base_url", &self.base_url)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("api_key_header", &self.api_key_header)
            .field("api_key", &self.api_key.as_ref().map(|_| "<REDACTED>"))
            .field("fail_on_dispatch_error", &self.fail_on_dispatch_error)
            .finish()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is not set
    pub level: String,

    /// Enable JSON structured logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
