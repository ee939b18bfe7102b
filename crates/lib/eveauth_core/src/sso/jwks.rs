//! Provider access-token verification against the published key set.
//!
//! The key set is cached for a bounded time and replaced wholesale on expiry
//! or when a token names a key id the cache does not know. Only asymmetric
//! signatures are accepted.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::DateTime;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::jwk::{AlgorithmParameters, Jwk};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::SsoError;
use crate::config::SsoConfig;
use crate::models::profile::VerifiedIdentity;

/// Prefix of the `sub` claim for character tokens.
pub const CHARACTER_SUBJECT_PREFIX: &str = "CHARACTER:EVE:";

/// Whether `alg` is a public-key signature algorithm.
pub fn is_asymmetric(alg: Algorithm) -> bool {
    !matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)
}

/// Key set document as published; records are parsed one by one.
#[derive(Debug, Deserialize)]
struct RawKeySet {
    #[serde(default)]
    keys: Vec<serde_json::Value>,
}

/// `scp` is a plain string for a single scope and a list otherwise.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScopeClaim {
    Joined(String),
    List(Vec<String>),
}

impl ScopeClaim {
    fn into_set(self) -> BTreeSet<String> {
        match self {
            ScopeClaim::Joined(s) => s.split_whitespace().map(String::from).collect(),
            ScopeClaim::List(list) => list.into_iter().filter(|s| !s.is_empty()).collect(),
        }
    }
}

/// Claims of a provider access token that this subsystem reads.
#[derive(Debug, Deserialize)]
struct ProviderClaims {
    sub: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    owner: String,
    #[serde(default)]
    scp: Option<ScopeClaim>,
    exp: i64,
}

/// Parse `CHARACTER:EVE:<id>` into a positive character id.
fn parse_character_id(sub: &str) -> Option<i64> {
    sub.strip_prefix(CHARACTER_SUBJECT_PREFIX)?
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
}

/// One complete key set with its expiry.
struct JwksCacheEntry {
    keys: HashMap<String, Jwk>,
    fetched_at: Instant,
    expires_at: Instant,
    generation: u64,
}

impl JwksCacheEntry {
    fn is_fresh(&self) -> bool {
        Instant::now() < self.expires_at
    }

    fn fetched_within(&self, window: Duration) -> bool {
        self.fetched_at.elapsed() < window
    }
}

/// Verifies provider access tokens with cached key material.
pub struct JwksVerifier {
    http: reqwest::Client,
    jwks_url: String,
    issuers: Vec<String>,
    audiences: Vec<String>,
    ttl: Duration,
    refetch_cooldown: Duration,
    cache: RwLock<Option<Arc<JwksCacheEntry>>>,
    /// Serializes refetches; readers never wait on it.
    refresh_lock: Mutex<()>,
    generation: AtomicU64,
}

impl JwksVerifier {
    pub fn new(http: reqwest::Client, config: &SsoConfig) -> Self {
        Self {
            http,
            jwks_url: config.jwks_url.clone(),
            issuers: config.issuers.clone(),
            audiences: vec![config.audience.clone(), config.client_id.clone()],
            ttl: config.jwks_ttl,
            refetch_cooldown: config.jwks_refetch_cooldown,
            cache: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    /// Verify an access token and extract the character identity.
    pub async fn verify(&self, access_token: &str) -> Result<VerifiedIdentity, SsoError> {
        let header = decode_header(access_token)
            .map_err(|e| SsoError::Protocol(format!("malformed token header: {e}")))?;

        if !is_asymmetric(header.alg) {
            warn!(alg = ?header.alg, "rejected token with symmetric algorithm");
            return Err(SsoError::Security(format!(
                "symmetric algorithm {:?} not accepted",
                header.alg
            )));
        }

        let kid = header
            .kid
            .ok_or_else(|| SsoError::Security("token header has no kid".into()))?;
        let jwk = self.key_for(&kid).await?;

        if let Some(pinned) = jwk.common.key_algorithm
            && pinned.to_string().parse::<Algorithm>().ok() != Some(header.alg)
        {
            warn!(kid = %kid, alg = ?header.alg, "token algorithm does not match key");
            return Err(SsoError::Security("algorithm does not match key".into()));
        }

        let key = DecodingKey::from_jwk(&jwk)
            .map_err(|e| SsoError::Protocol(format!("unusable key {kid}: {e}")))?;

        let mut validation = Validation::new(header.alg);
        validation.leeway = 0;
        validation.set_issuer(&self.issuers);
        validation.set_audience(&self.audiences);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        let claims = decode::<ProviderClaims>(access_token, &key, &validation)
            .map_err(|e| {
                let err = map_decode_error(e.kind());
                warn!(kid = %kid, kind = err.kind(), error = %err, "access token rejected");
                err
            })?
            .claims;

        let character_id = parse_character_id(&claims.sub)
            .ok_or_else(|| SsoError::Security(format!("unexpected subject {}", claims.sub)))?;
        if claims.name.trim().is_empty() {
            return Err(SsoError::Security(format!(
                "token for character {character_id} has no name"
            )));
        }
        let expires_on = DateTime::from_timestamp(claims.exp, 0)
            .ok_or_else(|| SsoError::Protocol("exp out of range".into()))?;

        debug!(character_id, kid = %kid, "access token verified");
        Ok(VerifiedIdentity {
            character_id,
            character_name: claims.name,
            scopes: claims.scp.map(ScopeClaim::into_set).unwrap_or_default(),
            owner_hash: claims.owner,
            expires_on,
        })
    }

    /// Look up a key by id, refetching the whole set when needed.
    async fn key_for(&self, kid: &str) -> Result<Jwk, SsoError> {
        let observed = {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.as_ref() {
                if entry.is_fresh()
                    && let Some(jwk) = entry.keys.get(kid)
                {
                    return Ok(jwk.clone());
                }
                Some(entry.generation)
            } else {
                None
            }
        };

        let _refreshing = self.refresh_lock.lock().await;

        {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.as_ref()
                && entry.is_fresh()
            {
                // Another task may have installed a new set while we waited.
                if Some(entry.generation) != observed {
                    return entry.keys.get(kid).cloned().ok_or_else(|| unknown_kid(kid));
                }
                if entry.fetched_within(self.refetch_cooldown) {
                    debug!(kid = %kid, "unknown kid inside refetch cooldown");
                    return Err(unknown_kid(kid));
                }
            }
        }

        let entry = Arc::new(self.fetch().await?);
        let found = entry.keys.get(kid).cloned();
        *self.cache.write().await = Some(entry);

        found.ok_or_else(|| unknown_kid(kid))
    }

    /// Fetch and parse the full key set. Symmetric keys are dropped.
    async fn fetch(&self) -> Result<JwksCacheEntry, SsoError> {
        let resp = self.http.get(&self.jwks_url).send().await?;
        let status = resp.status();
        if status.is_server_error() {
            return Err(SsoError::Transient(format!("JWKS endpoint HTTP {status}")));
        }
        if !status.is_success() {
            return Err(SsoError::Protocol(format!("JWKS endpoint HTTP {status}")));
        }
        let raw = resp.json::<RawKeySet>().await?;

        let mut keys = HashMap::with_capacity(raw.keys.len());
        for value in raw.keys {
            let jwk = match serde_json::from_value::<Jwk>(value) {
                Ok(jwk) => jwk,
                Err(e) => {
                    debug!(error = %e, "skipping unparseable key record");
                    continue;
                }
            };
            let Some(kid) = jwk.common.key_id.clone() else {
                continue;
            };
            if matches!(jwk.algorithm, AlgorithmParameters::OctetKey(_)) {
                warn!(kid = %kid, "ignoring symmetric key in published key set");
                continue;
            }
            keys.insert(kid, jwk);
        }

        if keys.is_empty() {
            return Err(SsoError::Protocol("key set has no usable keys".into()));
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        info!(keys = keys.len(), generation, "refreshed provider key set");
        let fetched_at = Instant::now();
        Ok(JwksCacheEntry {
            keys,
            fetched_at,
            expires_at: fetched_at + self.ttl,
            generation,
        })
    }
}

fn unknown_kid(kid: &str) -> SsoError {
    warn!(kid = %kid, "token signed with unknown key id");
    SsoError::Security(format!("unknown key id {kid}"))
}

fn map_decode_error(kind: &ErrorKind) -> SsoError {
    match kind {
        ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
            SsoError::Protocol(format!("malformed token: {kind:?}"))
        }
        ErrorKind::ExpiredSignature => SsoError::Security("token expired".into()),
        ErrorKind::InvalidIssuer => SsoError::Security("issuer mismatch".into()),
        ErrorKind::InvalidAudience => SsoError::Security("audience mismatch".into()),
        ErrorKind::InvalidSignature => SsoError::Security("bad signature".into()),
        ErrorKind::InvalidAlgorithm => SsoError::Security("algorithm not allowed for key".into()),
        ErrorKind::MissingRequiredClaim(claim) => {
            SsoError::Security(format!("missing claim {claim}"))
        }
        other => SsoError::Security(format!("token rejected: {other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_must_be_a_character() {
        assert_eq!(parse_character_id("CHARACTER:EVE:2112625428"), Some(2112625428));
        assert_eq!(parse_character_id("CHARACTER:EVE:0"), None);
        assert_eq!(parse_character_id("CHARACTER:EVE:"), None);
        assert_eq!(parse_character_id("CORPORATION:EVE:98000001"), None);
        assert_eq!(parse_character_id("2112625428"), None);
    }

    #[test]
    fn scopes_accept_string_and_list() {
        let joined: ScopeClaim =
            serde_json::from_value(serde_json::json!("publicData esi-skills.read_skills.v1"))
                .unwrap();
        let list: ScopeClaim = serde_json::from_value(serde_json::json!([
            "esi-skills.read_skills.v1",
            "publicData"
        ]))
        .unwrap();
        assert_eq!(joined.into_set(), list.into_set());
    }

    #[test]
    fn hmac_algorithms_are_symmetric() {
        assert!(!is_asymmetric(Algorithm::HS256));
        assert!(!is_asymmetric(Algorithm::HS512));
        assert!(is_asymmetric(Algorithm::RS256));
        assert!(is_asymmetric(Algorithm::ES256));
        assert!(is_asymmetric(Algorithm::EdDSA));
    }
}
