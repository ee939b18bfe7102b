//! Character identity and profile models.
//!
//! A [`UserProfile`] is the durable per-character record. A "user" has no
//! table of its own: it is the set of profiles sharing a `user_id`.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Token endpoint response for both the authorization-code and refresh grants.
#[derive(Clone, Deserialize)]
pub struct ExternalCredential {
    pub access_token: String,
    /// Omitted by the provider on some refresh responses.
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: i64,
}

impl fmt::Debug for ExternalCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalCredential")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Character claims extracted from a provider access token whose signature,
/// issuer, audience and expiry have been checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedIdentity {
    pub character_id: i64,
    pub character_name: String,
    pub scopes: BTreeSet<String>,
    pub owner_hash: String,
    pub expires_on: DateTime<Utc>,
}

/// Durable per-character record.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub character_id: i64,
    pub character_name: String,
    /// Stable account identifier shared by all characters of one person.
    pub user_id: String,
    pub owner_hash: String,
    pub scopes: Vec<String>,
    /// `false` once the provider has revoked the stored refresh token.
    pub valid: bool,
    #[serde(skip)]
    pub access_token: String,
    #[serde(skip)]
    pub refresh_token: Option<String>,
    /// Expiry of `access_token`; `None` when it was never recorded.
    pub token_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    /// Build a fresh, valid profile for a verified identity.
    ///
    /// `created_at` and `updated_at` are both set to now; the store keeps the
    /// original `created_at` when the character already has a row.
    pub fn from_identity(
        identity: &VerifiedIdentity,
        user_id: &str,
        credential: &ExternalCredential,
    ) -> Self {
        let now = Utc::now();
        Self {
            character_id: identity.character_id,
            character_name: identity.character_name.clone(),
            user_id: user_id.to_string(),
            owner_hash: identity.owner_hash.clone(),
            scopes: identity.scopes.iter().cloned().collect(),
            valid: true,
            access_token: credential.access_token.clone(),
            refresh_token: credential.refresh_token.clone(),
            token_expires_at: Some(identity.expires_on),
            created_at: now,
            updated_at: now,
        }
    }
}

impl fmt::Debug for UserProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserProfile")
            .field("character_id", &self.character_id)
            .field("character_name", &self.character_name)
            .field("user_id", &self.user_id)
            .field("scopes", &self.scopes)
            .field("valid", &self.valid)
            .field("token_expires_at", &self.token_expires_at)
            .finish_non_exhaustive()
    }
}
