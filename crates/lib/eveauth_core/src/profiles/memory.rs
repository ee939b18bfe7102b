//! In-memory profile store.
//!
//! Used by tests and single-process deployments that accept losing profiles
//! on restart. Upserts go through the map's entry API, which holds the shard
//! lock for the whole read-modify-write.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::ProfileStore;
use crate::models::profile::UserProfile;
use crate::sso::SsoError;

#[derive(Default)]
pub struct MemoryProfileStore {
    profiles: DashMap<i64, UserProfile>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn get_profile(&self, character_id: i64) -> Result<Option<UserProfile>, SsoError> {
        Ok(self.profiles.get(&character_id).map(|p| p.value().clone()))
    }

    async fn upsert_profile(&self, profile: &UserProfile) -> Result<UserProfile, SsoError> {
        let now = Utc::now();
        let stored = match self.profiles.entry(profile.character_id) {
            Entry::Occupied(mut entry) => {
                let mut next = profile.clone();
                next.user_id = entry.get().user_id.clone();
                next.created_at = entry.get().created_at;
                next.updated_at = now;
                entry.insert(next.clone());
                next
            }
            Entry::Vacant(entry) => {
                let mut next = profile.clone();
                next.created_at = now;
                next.updated_at = now;
                entry.insert(next.clone());
                next
            }
        };
        Ok(stored)
    }

    async fn list_profiles_expiring_before(
        &self,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<UserProfile>, SsoError> {
        let mut due: Vec<UserProfile> = self
            .profiles
            .iter()
            .filter(|p| p.valid && p.refresh_token.is_some())
            .filter(|p| p.token_expires_at.is_none_or(|at| at < before))
            .map(|p| p.value().clone())
            .collect();
        // `None` sorts first: never-recorded expiries are refreshed before anything else.
        due.sort_by_key(|p| (p.token_expires_at, p.character_id));
        due.truncate(limit);
        Ok(due)
    }

    async fn list_profiles_for_user(&self, user_id: &str) -> Result<Vec<UserProfile>, SsoError> {
        let mut profiles: Vec<UserProfile> = self
            .profiles
            .iter()
            .filter(|p| p.user_id == user_id)
            .map(|p| p.value().clone())
            .collect();
        profiles.sort_by_key(|p| p.created_at);
        Ok(profiles)
    }

    async fn mark_invalid(&self, character_id: i64) -> Result<(), SsoError> {
        let mut profile = self
            .profiles
            .get_mut(&character_id)
            .ok_or(SsoError::NotFound(character_id))?;
        profile.valid = false;
        profile.updated_at = Utc::now();
        Ok(())
    }

    async fn count_users(&self) -> Result<i64, SsoError> {
        let users: HashSet<String> = self.profiles.iter().map(|p| p.user_id.clone()).collect();
        Ok(users.len() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn profile(character_id: i64, user_id: &str, expires: Option<DateTime<Utc>>) -> UserProfile {
        let now = Utc::now();
        UserProfile {
            character_id,
            character_name: format!("Pilot {character_id}"),
            user_id: user_id.to_string(),
            owner_hash: "owner".into(),
            scopes: vec!["publicData".into()],
            valid: true,
            access_token: format!("at-{character_id}"),
            refresh_token: Some(format!("rt-{character_id}")),
            token_expires_at: expires,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn upsert_keeps_existing_user_binding() {
        let store = MemoryProfileStore::new();
        let first = store.upsert_profile(&profile(1, "u1", None)).await.unwrap();
        let mut again = profile(1, "u2", None);
        again.access_token = "newer".into();
        let second = store.upsert_profile(&again).await.unwrap();
        assert_eq!(second.user_id, "u1");
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.access_token, "newer");
    }

    #[tokio::test]
    async fn expiring_selection_skips_fresh_invalid_and_tokenless() {
        let store = MemoryProfileStore::new();
        let now = Utc::now();
        store.upsert_profile(&profile(1, "u", Some(now + Duration::minutes(10)))).await.unwrap();
        store.upsert_profile(&profile(2, "u", Some(now + Duration::hours(5)))).await.unwrap();
        store.upsert_profile(&profile(3, "u", None)).await.unwrap();
        let mut invalid = profile(4, "u", None);
        invalid.valid = false;
        store.upsert_profile(&invalid).await.unwrap();
        let mut tokenless = profile(5, "u", None);
        tokenless.refresh_token = None;
        store.upsert_profile(&tokenless).await.unwrap();

        let due = store
            .list_profiles_expiring_before(now + Duration::hours(1), 10)
            .await
            .unwrap();
        let ids: Vec<i64> = due.iter().map(|p| p.character_id).collect();
        assert_eq!(ids, vec![3, 1]);

        let limited = store
            .list_profiles_expiring_before(now + Duration::hours(1), 1)
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn mark_invalid_requires_existing_profile() {
        let store = MemoryProfileStore::new();
        assert!(matches!(
            store.mark_invalid(42).await,
            Err(SsoError::NotFound(42))
        ));
        store.upsert_profile(&profile(42, "u", None)).await.unwrap();
        store.mark_invalid(42).await.unwrap();
        let stored = store.get_profile(42).await.unwrap().unwrap();
        assert!(!stored.valid);
        assert_eq!(stored.refresh_token.as_deref(), Some("rt-42"));
    }

    #[tokio::test]
    async fn users_are_counted_by_distinct_id() {
        let store = MemoryProfileStore::new();
        assert_eq!(store.count_users().await.unwrap(), 0);
        store.upsert_profile(&profile(1, "u1", None)).await.unwrap();
        store.upsert_profile(&profile(2, "u1", None)).await.unwrap();
        store.upsert_profile(&profile(3, "u2", None)).await.unwrap();
        assert_eq!(store.count_users().await.unwrap(), 2);
        assert_eq!(store.list_profiles_for_user("u1").await.unwrap().len(), 2);
    }
}
