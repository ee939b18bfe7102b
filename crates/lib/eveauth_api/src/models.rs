//! Request and response bodies.

use chrono::{DateTime, Utc};
use eveauth_core::models::auth::SessionClaims;
use eveauth_core::sso::flow::LoginOutcome;
use serde::{Deserialize, Serialize};

/// Error body returned for every failed request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// `GET /auth/login` query.
#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    /// Request the registration scope set instead of the login scopes.
    #[serde(default)]
    pub full: bool,
}

/// `GET /auth/callback` query. Both fields are checked by the core.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub state: String,
}

/// `POST /auth/mobile` body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MobileTokenRequest {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// A freshly issued session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub session_token: String,
    pub expires_at: DateTime<Utc>,
    pub user_id: String,
    pub character_id: i64,
    pub character_name: String,
}

impl From<LoginOutcome> for SessionResponse {
    fn from(outcome: LoginOutcome) -> Self {
        Self {
            session_token: outcome.session.token,
            expires_at: outcome.session.expires_at,
            user_id: outcome.profile.user_id,
            character_id: outcome.identity.character_id,
            character_name: outcome.identity.character_name,
        }
    }
}

/// The caller's current session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub user_id: String,
    pub character_id: i64,
    pub character_name: String,
    pub scopes: Vec<String>,
    pub expires_at: i64,
}

impl From<SessionClaims> for SessionInfo {
    fn from(claims: SessionClaims) -> Self {
        Self {
            user_id: claims.sub,
            character_id: claims.character_id,
            character_name: claims.character_name,
            scopes: claims.scopes,
            expires_at: claims.exp,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogoutResponse {
    pub success: bool,
}
