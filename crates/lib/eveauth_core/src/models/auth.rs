//! Session domain models.
//!
//! Claims carried by the subsystem's own session token. These are signed with
//! the server secret and never with the provider's keys.

use serde::{Deserialize, Serialize};

/// JWT claims embedded in session tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject — stable user ID (standard JWT `sub` claim).
    pub sub: String,
    /// Character the session was established with.
    pub character_id: i64,
    pub character_name: String,
    /// Provider scopes granted to that character.
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Expiry (unix timestamp).
    pub exp: i64,
}

impl SessionClaims {
    /// The stable user ID this session belongs to.
    pub fn user_id(&self) -> &str {
        &self.sub
    }
}

/// A freshly minted session token with its expiry.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}
