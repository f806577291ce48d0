//! Shared-secret handshake verification for inbound entries.
//!
//! Form providers authenticate notifications by echoing a pre-shared
//! handshake key as a request parameter. When no key is configured the
//! service runs unauthenticated; this mode is supported but every request
//! logs a warning.

use crate::params::Parameters;
use subtle::ConstantTimeEq;
use tracing::warn;

/// Name of the request parameter carrying the handshake key.
pub const HANDSHAKE_PARAMETER: &str = "HandshakeKey";

/// Errors raised when an inbound request fails the handshake check.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandshakeError {
    /// A secret is configured but the request did not supply one.
    #[error(
        "Handshake key is missing from request. Make sure form notifications \
         are properly configured"
    )]
    Missing,

    /// The supplied key does not match the configured secret.
    #[error(
        "Invalid handshake key. Make sure the correct handshake key is \
         configured for your form notification"
    )]
    Mismatch,
}

/// Verifies the handshake key carried by an inbound request.
///
/// The secret is excluded from `Debug` output.
#[derive(Clone, Default)]
pub struct HandshakeVerifier {
    secret: Option<String>,
}

impl HandshakeVerifier {
    /// Create a verifier. An empty secret is treated as no secret.
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
        }
    }

    /// Returns `true` when a secret is configured.
    pub fn is_enforced(&self) -> bool {
        self.secret.is_some()
    }

    /// Check the handshake parameter of a request.
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError::Missing`] when a secret is configured and the
    /// request carries no (or an empty) key, and [`HandshakeError::Mismatch`]
    /// when the key differs from the secret.
    pub fn verify(&self, params: &Parameters) -> Result<(), HandshakeError> {
        let Some(secret) = &self.secret else {
            warn!(
                "No handshake key is configured. Without authentication the \
                 service accepts entries from any sender"
            );
            return Ok(());
        };

        let supplied = params
            .get(HANDSHAKE_PARAMETER)
            .filter(|key| !key.is_empty())
            .ok_or(HandshakeError::Missing)?;

        if bool::from(supplied.as_bytes().ct_eq(secret.as_bytes())) {
            Ok(())
        } else {
            Err(HandshakeError::Mismatch)
        }
    }
}

impl std::fmt::Debug for HandshakeVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandshakeVerifier")
            .field("secret", &self.secret.as_ref().map(|_| "<REDACTED>"))
            .finish()
    }
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
