//! SSO configuration.
//!
//! Provider endpoints, client credentials, scope sets and the timing knobs of
//! the background tasks.

use std::time::Duration;

use thiserror::Error;

/// Production login server.
pub const EVE_LOGIN_BASE: &str = "https://login.eveonline.com";

/// Audience value the provider puts in every access token.
pub const EVE_AUDIENCE: &str = "EVE Online";

/// Scopes requested for a plain login.
pub const DEFAULT_BASIC_SCOPES: &[&str] = &["publicData"];

/// Scopes requested when registering a character.
pub const DEFAULT_FULL_SCOPES: &[&str] = &[
    "publicData",
    "esi-characters.read_corporation_roles.v1",
    "esi-clones.read_clones.v1",
    "esi-corporations.read_corporation_membership.v1",
    "esi-location.read_location.v1",
    "esi-location.read_ship_type.v1",
    "esi-skills.read_skills.v1",
    "esi-wallet.read_character_wallet.v1",
];

/// Outbound request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// How long a fetched key set is trusted.
pub const DEFAULT_JWKS_TTL: Duration = Duration::from_secs(60 * 60);

/// Minimum gap between refetches triggered by an unknown key id.
pub const DEFAULT_JWKS_REFETCH_COOLDOWN: Duration = Duration::from_secs(30);

/// Refresh worker cadence.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Tokens expiring within this window are refreshed.
pub const DEFAULT_REFRESH_LOOKAHEAD: Duration = Duration::from_secs(60 * 60);

pub const DEFAULT_REFRESH_BATCH_SIZE: usize = 100;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}

/// Provider and scheduling configuration for the SSO subsystem.
#[derive(Clone, Debug)]
pub struct SsoConfig {
    /// Application client ID registered with the provider.
    pub client_id: String,
    pub client_secret: String,
    /// Redirect URI registered with the provider.
    pub callback_url: String,
    pub authorize_url: String,
    pub token_url: String,
    pub jwks_url: String,
    /// Accepted `iss` values. The provider uses both the bare host and the URL.
    pub issuers: Vec<String>,
    /// Provider audience; the client ID is accepted as well.
    pub audience: String,
    pub basic_scopes: Vec<String>,
    pub full_scopes: Vec<String>,
    pub http_timeout: Duration,
    pub jwks_ttl: Duration,
    /// While a fresh key set is younger than this, unknown key ids fail
    /// without a refetch.
    pub jwks_refetch_cooldown: Duration,
    pub state_ttl: Duration,
    pub max_pending_logins: usize,
    pub refresh_interval: Duration,
    pub refresh_lookahead: Duration,
    pub refresh_batch_size: usize,
}

impl SsoConfig {
    /// Configuration against the production login server with default timings.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        callback_url: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            callback_url: callback_url.into(),
            authorize_url: String::new(),
            token_url: String::new(),
            jwks_url: String::new(),
            issuers: Vec::new(),
            audience: EVE_AUDIENCE.to_string(),
            basic_scopes: DEFAULT_BASIC_SCOPES.iter().map(|s| s.to_string()).collect(),
            full_scopes: DEFAULT_FULL_SCOPES.iter().map(|s| s.to_string()).collect(),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            jwks_ttl: DEFAULT_JWKS_TTL,
            jwks_refetch_cooldown: DEFAULT_JWKS_REFETCH_COOLDOWN,
            state_ttl: crate::sso::state::STATE_TTL,
            max_pending_logins: crate::sso::state::DEFAULT_MAX_PENDING,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            refresh_lookahead: DEFAULT_REFRESH_LOOKAHEAD,
            refresh_batch_size: DEFAULT_REFRESH_BATCH_SIZE,
        }
        .with_login_base(EVE_LOGIN_BASE)
    }

    /// Point every provider endpoint and the accepted issuers at another login server.
    pub fn with_login_base(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        self.authorize_url = format!("{base}/v2/oauth/authorize");
        self.token_url = format!("{base}/v2/oauth/token");
        self.jwks_url = format!("{base}/oauth/jwks");
        let host = base
            .strip_prefix("https://")
            .or_else(|| base.strip_prefix("http://"))
            .unwrap_or(base);
        self.issuers = vec![base.to_string(), host.to_string()];
        self
    }

    /// Scope set for a login attempt.
    pub fn scopes(&self, with_full_scopes: bool) -> &[String] {
        if with_full_scopes {
            &self.full_scopes
        } else {
            &self.basic_scopes
        }
    }

    /// Reads configuration from environment variables.
    ///
    /// | Variable                  | Default                          |
    /// |---------------------------|----------------------------------|
    /// | `EVE_CLIENT_ID`           | required                         |
    /// | `EVE_CLIENT_SECRET`       | required                         |
    /// | `EVE_CALLBACK_URL`        | required                         |
    /// | `EVE_LOGIN_BASE`          | `https://login.eveonline.com`    |
    /// | `EVE_BASIC_SCOPES`        | `publicData`                     |
    /// | `EVE_FULL_SCOPES`         | registration scope set           |
    /// | `SSO_HTTP_TIMEOUT_SECS`   | `30`                             |
    /// | `JWKS_TTL_SECS`           | `3600`                           |
    /// | `JWKS_REFETCH_COOLDOWN_SECS` | `30`                          |
    /// | `REFRESH_INTERVAL_SECS`   | `900`                            |
    /// | `REFRESH_LOOKAHEAD_SECS`  | `3600`                           |
    /// | `REFRESH_BATCH_SIZE`      | `100`                            |
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::new(
            required("EVE_CLIENT_ID")?,
            required("EVE_CLIENT_SECRET")?,
            required("EVE_CALLBACK_URL")?,
        );
        if let Ok(base) = std::env::var("EVE_LOGIN_BASE")
            && !base.is_empty()
        {
            config = config.with_login_base(&base);
        }
        if let Some(scopes) = scope_list("EVE_BASIC_SCOPES") {
            config.basic_scopes = scopes;
        }
        if let Some(scopes) = scope_list("EVE_FULL_SCOPES") {
            config.full_scopes = scopes;
        }
        if let Some(secs) = parsed::<u64>("SSO_HTTP_TIMEOUT_SECS")? {
            config.http_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parsed::<u64>("JWKS_TTL_SECS")? {
            config.jwks_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = parsed::<u64>("JWKS_REFETCH_COOLDOWN_SECS")? {
            config.jwks_refetch_cooldown = Duration::from_secs(secs);
        }
        if let Some(secs) = parsed::<u64>("REFRESH_INTERVAL_SECS")? {
            config.refresh_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parsed::<u64>("REFRESH_LOOKAHEAD_SECS")? {
            config.refresh_lookahead = Duration::from_secs(secs);
        }
        if let Some(size) = parsed::<usize>("REFRESH_BATCH_SIZE")? {
            config.refresh_batch_size = size;
        }
        Ok(config)
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    match std::env::var(name) {
        Ok(v) if !v.is_empty() => Ok(v),
        _ => Err(ConfigError::MissingVar(name)),
    }
}

fn scope_list(name: &str) -> Option<Vec<String>> {
    let raw = std::env::var(name).ok()?;
    let scopes: Vec<String> = raw.split_whitespace().map(String::from).collect();
    (!scopes.is_empty()).then_some(scopes)
}

fn parsed<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(raw) if !raw.is_empty() => raw
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(name, raw)),
        _ => Ok(None),
    }
}
