//! Character profile persistence.
//!
//! The identity subsystem only needs a handful of operations from storage;
//! they are expressed as the [`ProfileStore`] trait so the resolver and the
//! refresh worker do not care whether profiles live in PostgreSQL or memory.

pub mod memory;
pub mod postgres;
pub mod secrets;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::profile::UserProfile;
use crate::sso::SsoError;

pub use memory::MemoryProfileStore;
pub use postgres::PgProfileStore;

/// Storage operations for character profiles.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_profile(&self, character_id: i64) -> Result<Option<UserProfile>, SsoError>;

    /// Atomic insert-or-replace keyed by `character_id`.
    ///
    /// Every mutable field is replaced. When the character already has a row,
    /// its `user_id` binding and `created_at` are kept, so concurrent first
    /// logins of one character converge on a single user. Returns the row as
    /// stored.
    async fn upsert_profile(&self, profile: &UserProfile) -> Result<UserProfile, SsoError>;

    /// Valid profiles holding a refresh token whose access token expires
    /// before `before` or has no recorded expiry, soonest first.
    async fn list_profiles_expiring_before(
        &self,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<UserProfile>, SsoError>;

    /// All characters linked to a user, valid or not.
    async fn list_profiles_for_user(&self, user_id: &str) -> Result<Vec<UserProfile>, SsoError>;

    /// Deactivate a profile. Tokens are left untouched.
    async fn mark_invalid(&self, character_id: i64) -> Result<(), SsoError>;

    /// Number of distinct user IDs.
    async fn count_users(&self) -> Result<i64, SsoError>;
}
