//! EVE Online SSO integration.
//!
//! Drives the OAuth2 authorization-code flow against the provider, verifies
//! the provider's access tokens against its published key set, links the
//! authenticated character to a stable user and keeps stored tokens fresh.

pub mod client;
pub mod flow;
pub mod identity;
pub mod jwks;
pub mod refresh;
pub mod state;

use thiserror::Error;

/// Failures talking to the provider or acting on its answers.
#[derive(Debug, Error)]
pub enum SsoError {
    /// Malformed provider response or unexpected HTTP status.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The provider rejected a grant (`invalid_grant`): expired or revoked code/refresh token.
    #[error("Grant rejected: {0}")]
    InvalidGrant(String),

    /// State replay, bad signature, issuer/audience mismatch, algorithm substitution.
    #[error("Security check failed: {0}")]
    Security(String),

    #[error("No profile for character {0}")]
    NotFound(i64),

    /// Timeouts, connection failures and provider 5xx answers.
    #[error("Provider unavailable: {0}")]
    Transient(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    DbError(#[from] sqlx::Error),
}

impl SsoError {
    /// Whether a later attempt may succeed without user involvement.
    pub fn is_transient(&self) -> bool {
        matches!(self, SsoError::Transient(_))
    }

    /// Short label used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            SsoError::Protocol(_) => "protocol",
            SsoError::InvalidGrant(_) => "invalid_grant",
            SsoError::Security(_) => "security",
            SsoError::NotFound(_) => "not_found",
            SsoError::Transient(_) => "transient",
            SsoError::Storage(_) | SsoError::DbError(_) => "storage",
        }
    }
}

impl From<reqwest::Error> for SsoError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            SsoError::Protocol(format!("response decode: {e}"))
        } else if e.is_status() && e.status().is_some_and(|s| s.is_client_error()) {
            SsoError::Protocol(format!("unexpected status: {e}"))
        } else {
            SsoError::Transient(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_errors_are_transient() {
        assert!(SsoError::Transient("timeout".into()).is_transient());
        assert!(!SsoError::Protocol("bad json".into()).is_transient());
        assert!(!SsoError::Security("bad signature".into()).is_transient());
        assert!(!SsoError::InvalidGrant("revoked".into()).is_transient());
    }

    #[test]
    fn kinds_are_stable_labels() {
        assert_eq!(SsoError::NotFound(1).kind(), "not_found");
        assert_eq!(SsoError::Storage("x".into()).kind(), "storage");
        assert_eq!(SsoError::InvalidGrant("x".into()).kind(), "invalid_grant");
    }
}
