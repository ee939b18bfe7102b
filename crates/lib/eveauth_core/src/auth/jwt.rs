//! Session token generation and verification.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use tracing::{debug, info, warn};

use super::AuthError;
use crate::models::auth::{IssuedSession, SessionClaims};

/// Default session lifetime: 24 hours.
pub const DEFAULT_SESSION_LIFETIME_SECS: i64 = 24 * 60 * 60;

/// Mints and verifies HS256 session tokens with a server-held secret.
#[derive(Clone)]
pub struct SessionIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    lifetime: Duration,
}

impl SessionIssuer {
    /// Create an issuer with the default 24h lifetime.
    pub fn new(secret: &[u8]) -> Self {
        Self::with_lifetime(secret, Duration::seconds(DEFAULT_SESSION_LIFETIME_SECS))
    }

    pub fn with_lifetime(secret: &[u8], lifetime: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            lifetime,
        }
    }

    /// Sign a session token for a user/character pair.
    pub fn issue(
        &self,
        user_id: &str,
        character_id: i64,
        character_name: &str,
        scopes: &[String],
    ) -> Result<IssuedSession, AuthError> {
        let now = Utc::now();
        let expires_at = now + self.lifetime;
        let claims = SessionClaims {
            sub: user_id.to_string(),
            character_id,
            character_name: character_name.to_string(),
            scopes: scopes.to_vec(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::TokenError(format!("jwt encode: {e}")))?;
        debug!(user_id, character_id, "issued session token");
        Ok(IssuedSession {
            token,
            expires_at: DateTime::from_timestamp(claims.exp, 0).unwrap_or(expires_at),
        })
    }

    /// Verify a session token, returning the claims on success.
    ///
    /// Only HS256 is accepted and expiry is checked without leeway.
    pub fn verify(&self, token: &str) -> Result<SessionClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);
        let claims = decode::<SessionClaims>(token, &self.decoding, &validation)
            .map_err(|e| AuthError::InvalidSession(e.to_string()))?
            .claims;
        if claims.sub.is_empty() || claims.character_id == 0 {
            return Err(AuthError::InvalidSession("incomplete claims".into()));
        }
        Ok(claims)
    }
}

/// Resolve the session secret: env var `SESSION_SECRET` → `AUTH_SECRET` → persisted file.
///
/// When the file cannot be written the secret lives only as long as the process.
pub fn resolve_session_secret() -> String {
    if let Ok(secret) = std::env::var("SESSION_SECRET")
        && !secret.is_empty()
    {
        return secret;
    }
    if let Ok(secret) = std::env::var("AUTH_SECRET")
        && !secret.is_empty()
    {
        return secret;
    }
    let path = data_path("session-secret");
    load_or_create_secret(&path).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "could not persist session secret");
        random_secret()
    })
}

/// Read a persisted secret, generating and writing a new one when absent.
pub(crate) fn load_or_create_secret(secret_path: &Path) -> std::io::Result<String> {
    if let Ok(existing) = std::fs::read_to_string(secret_path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return Ok(trimmed.to_string());
        }
    }
    let secret = random_secret();
    if let Some(parent) = secret_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(secret_path, &secret)?;
    info!(path = %secret_path.display(), "generated new secret");
    Ok(secret)
}

fn random_secret() -> String {
    rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect()
}

/// Path of a file under the service's data directory.
pub(crate) fn data_path(name: &str) -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("eveauth")
        .join(name)
}
