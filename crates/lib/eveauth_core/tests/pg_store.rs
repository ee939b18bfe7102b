//! PostgreSQL store tests.
//!
//! Skipped unless `EVEAUTH_TEST_DATABASE_URL` points at a scratch database.

use chrono::Utc;
use eveauth_core::migrate::migrate;
use eveauth_core::models::profile::UserProfile;
use eveauth_core::profiles::{PgProfileStore, ProfileStore};
use eveauth_core::sso::SsoError;
use sqlx::PgPool;

async fn store() -> Option<(PgProfileStore, PgPool)> {
    let url = std::env::var("EVEAUTH_TEST_DATABASE_URL").ok()?;
    let pool = PgPool::connect(&url).await.expect("connect test database");
    migrate(&pool).await.expect("migrate");
    Some((PgProfileStore::new(pool.clone(), "pg-test-key"), pool))
}

/// Character ids unique to one test run.
fn character_id(offset: i64) -> i64 {
    Utc::now().timestamp_micros() * 10 + offset
}

fn profile(character_id: i64, user_id: &str) -> UserProfile {
    let now = Utc::now();
    UserProfile {
        character_id,
        character_name: format!("Pilot {character_id}"),
        user_id: user_id.to_string(),
        owner_hash: "owner".into(),
        scopes: vec!["publicData".into()],
        valid: true,
        access_token: "at".into(),
        refresh_token: Some("rt-secret".into()),
        token_expires_at: Some(now),
        created_at: now,
        updated_at: now,
    }
}

#[tokio::test]
async fn upsert_preserves_user_and_seals_refresh_token() {
    let Some((store, pool)) = store().await else {
        return;
    };
    let id = character_id(1);
    let first = store.upsert_profile(&profile(id, "pg-user-a")).await.unwrap();

    let mut second = profile(id, "pg-user-b");
    second.access_token = "at-2".into();
    let stored = store.upsert_profile(&second).await.unwrap();
    assert_eq!(stored.user_id, "pg-user-a");
    assert_eq!(stored.created_at, first.created_at);
    assert_eq!(stored.access_token, "at-2");
    assert_eq!(stored.refresh_token.as_deref(), Some("rt-secret"));

    let raw: Option<String> =
        sqlx::query_scalar("SELECT refresh_token_enc FROM user_profiles WHERE character_id = $1")
            .bind(id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert!(raw.is_some_and(|sealed| !sealed.contains("rt-secret")));
}

#[tokio::test]
async fn mark_invalid_and_listing() {
    let Some((store, _pool)) = store().await else {
        return;
    };
    let user = format!("pg-user-{}", character_id(0));
    let a = character_id(2);
    let b = character_id(3);
    store.upsert_profile(&profile(a, &user)).await.unwrap();
    store.upsert_profile(&profile(b, &user)).await.unwrap();
    assert_eq!(store.list_profiles_for_user(&user).await.unwrap().len(), 2);

    store.mark_invalid(a).await.unwrap();
    let due = store
        .list_profiles_expiring_before(Utc::now() + chrono::Duration::hours(1), 10_000)
        .await
        .unwrap();
    assert!(due.iter().all(|p| p.character_id != a));
    assert!(due.iter().any(|p| p.character_id == b));

    assert!(matches!(
        store.mark_invalid(-1).await,
        Err(SsoError::NotFound(-1))
    ));
    assert!(store.count_users().await.unwrap() >= 1);
}

#[tokio::test]
async fn refresh_token_sealed_under_old_key_reads_as_absent() {
    let Some((store, pool)) = store().await else {
        return;
    };
    let id = character_id(4);
    store.upsert_profile(&profile(id, "pg-user-rotated")).await.unwrap();

    let rotated = PgProfileStore::new(pool, "pg-test-key-rotated");
    let read = rotated.get_profile(id).await.unwrap().unwrap();
    assert_eq!(read.user_id, "pg-user-rotated");
    assert_eq!(read.refresh_token, None);

    let due = rotated
        .list_profiles_expiring_before(Utc::now() + chrono::Duration::hours(1), 10_000)
        .await
        .unwrap();
    assert!(due.iter().any(|p| p.character_id == id && p.refresh_token.is_none()));
}
