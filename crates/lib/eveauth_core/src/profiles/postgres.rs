//! PostgreSQL profile store.
//!
//! Raw SQLx queries against `user_profiles`. Refresh tokens are sealed before
//! they reach the database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::warn;

use super::ProfileStore;
use super::secrets::TokenSealer;
use crate::models::profile::UserProfile;
use crate::sso::SsoError;

const PROFILE_COLUMNS: &str = "character_id, character_name, user_id, owner_hash, scopes, valid, \
     access_token, refresh_token_enc, token_expires_at, created_at, updated_at";

/// Database row for `user_profiles`.
#[derive(Debug, Clone, sqlx::FromRow)]
struct ProfileRow {
    character_id: i64,
    character_name: String,
    user_id: String,
    owner_hash: String,
    scopes: Vec<String>,
    valid: bool,
    access_token: String,
    refresh_token_enc: Option<String>,
    token_expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

pub struct PgProfileStore {
    pool: PgPool,
    sealer: TokenSealer,
}

impl PgProfileStore {
    pub fn new(pool: PgPool, encryption_key: &str) -> Self {
        Self {
            pool,
            sealer: TokenSealer::new(encryption_key),
        }
    }

    fn profile_from_row(&self, row: ProfileRow) -> UserProfile {
        let refresh_token =
            open_refresh_token(&self.sealer, row.character_id, row.refresh_token_enc.as_deref());
        UserProfile {
            character_id: row.character_id,
            character_name: row.character_name,
            user_id: row.user_id,
            owner_hash: row.owner_hash,
            scopes: row.scopes,
            valid: row.valid,
            access_token: row.access_token,
            refresh_token,
            token_expires_at: row.token_expires_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }

    fn profiles_from_rows(&self, rows: Vec<ProfileRow>) -> Vec<UserProfile> {
        rows.into_iter().map(|row| self.profile_from_row(row)).collect()
    }
}

/// Open a stored refresh token. A value that no longer opens (rotated key,
/// corrupt row) reads as absent so the rest of the profile stays usable.
fn open_refresh_token(
    sealer: &TokenSealer,
    character_id: i64,
    sealed: Option<&str>,
) -> Option<String> {
    match sealer.open(sealed?) {
        Ok(token) => Some(token),
        Err(e) => {
            warn!(character_id, error = %e, "stored refresh token unreadable, treating as absent");
            None
        }
    }
}

#[async_trait]
impl ProfileStore for PgProfileStore {
    async fn get_profile(&self, character_id: i64) -> Result<Option<UserProfile>, SsoError> {
        let row = sqlx::query_as::<_, ProfileRow>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM user_profiles WHERE character_id = $1"
        ))
        .bind(character_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| self.profile_from_row(r)))
    }

    async fn upsert_profile(&self, profile: &UserProfile) -> Result<UserProfile, SsoError> {
        let sealed = profile
            .refresh_token
            .as_deref()
            .map(|rt| self.sealer.seal(rt))
            .transpose()?;

        // user_id and created_at are deliberately absent from the UPDATE list.
        let row = sqlx::query_as::<_, ProfileRow>(&format!(
            "INSERT INTO user_profiles \
               (character_id, character_name, user_id, owner_hash, scopes, valid, \
                access_token, refresh_token_enc, token_expires_at, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now(), now()) \
             ON CONFLICT (character_id) DO UPDATE SET \
               character_name = EXCLUDED.character_name, \
               owner_hash = EXCLUDED.owner_hash, \
               scopes = EXCLUDED.scopes, \
               valid = EXCLUDED.valid, \
               access_token = EXCLUDED.access_token, \
               refresh_token_enc = EXCLUDED.refresh_token_enc, \
               token_expires_at = EXCLUDED.token_expires_at, \
               updated_at = now() \
             RETURNING {PROFILE_COLUMNS}"
        ))
        .bind(profile.character_id)
        .bind(&profile.character_name)
        .bind(&profile.user_id)
        .bind(&profile.owner_hash)
        .bind(&profile.scopes)
        .bind(profile.valid)
        .bind(&profile.access_token)
        .bind(sealed)
        .bind(profile.token_expires_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(self.profile_from_row(row))
    }

    async fn list_profiles_expiring_before(
        &self,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<UserProfile>, SsoError> {
        let rows = sqlx::query_as::<_, ProfileRow>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM user_profiles \
             WHERE valid \
               AND refresh_token_enc IS NOT NULL \
               AND (token_expires_at IS NULL OR token_expires_at < $1) \
             ORDER BY token_expires_at ASC NULLS FIRST, character_id \
             LIMIT $2"
        ))
        .bind(before)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        Ok(self.profiles_from_rows(rows))
    }

    async fn list_profiles_for_user(&self, user_id: &str) -> Result<Vec<UserProfile>, SsoError> {
        let rows = sqlx::query_as::<_, ProfileRow>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM user_profiles WHERE user_id = $1 ORDER BY created_at"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(self.profiles_from_rows(rows))
    }

    async fn mark_invalid(&self, character_id: i64) -> Result<(), SsoError> {
        let result = sqlx::query(
            "UPDATE user_profiles SET valid = false, updated_at = now() WHERE character_id = $1",
        )
        .bind(character_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(SsoError::NotFound(character_id));
        }
        Ok(())
    }

    async fn count_users(&self) -> Result<i64, SsoError> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(DISTINCT user_id) FROM user_profiles")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}
