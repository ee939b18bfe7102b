//! Session authentication.
//!
//! Mints and verifies the subsystem's own session token. This works with no
//! network access so existing sessions survive a provider outage.

pub mod jwt;

use thiserror::Error;

/// Session errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid session: {0}")]
    InvalidSession(String),

    #[error("Token error: {0}")]
    TokenError(String),
}
