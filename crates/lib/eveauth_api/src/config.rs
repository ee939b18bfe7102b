//! API server configuration.

use eveauth_core::auth::jwt::resolve_session_secret;
use eveauth_core::profiles::secrets::resolve_token_encryption_key;
use eveauth_core::sso::SsoError;

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3100").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub pg_connection_url: String,
    /// Session token signing secret.
    pub session_secret: String,
    /// Passphrase for sealing stored refresh tokens.
    pub token_encryption_key: String,
    /// Mark the session cookie `Secure`.
    pub secure_cookies: bool,
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                   | Default                                 |
    /// |----------------------------|-----------------------------------------|
    /// | `BIND_ADDR`                | `127.0.0.1:3100`                        |
    /// | `DATABASE_URL`             | `postgres://localhost:5432/eveauth`     |
    /// | `SESSION_SECRET` / `AUTH_SECRET` | generated & persisted to file     |
    /// | `TOKEN_ENCRYPTION_KEY`     | generated & persisted to file           |
    /// | `SECURE_COOKIES`           | `true`                                  |
    ///
    /// Fails only when no encryption key is configured and a generated one
    /// cannot be persisted.
    pub fn from_env() -> Result<Self, SsoError> {
        Ok(Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3100".into()),
            pg_connection_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost:5432/eveauth".into()),
            session_secret: resolve_session_secret(),
            token_encryption_key: resolve_token_encryption_key()?,
            secure_cookies: std::env::var("SECURE_COOKIES")
                .map(|v| !matches!(v.as_str(), "0" | "false" | "no"))
                .unwrap_or(true),
        })
    }
}
