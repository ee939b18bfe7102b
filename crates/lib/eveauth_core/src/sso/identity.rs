//! Linking verified characters to stable user ids.
//!
//! A character that already has a profile keeps its user id no matter what
//! the caller hints. Hints only decide where a never-seen character lands;
//! with no hint a new user id is minted.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::SsoError;
use crate::ids::new_user_id;
use crate::models::profile::{ExternalCredential, UserProfile, VerifiedIdentity};
use crate::profiles::ProfileStore;

// =============================================================================
// Group membership capability
// =============================================================================

/// Group membership hooks run after a profile is stored.
///
/// Failures are reported back but never fail a login.
#[async_trait]
pub trait GroupSync: Send + Sync {
    /// Put the profile into whatever groups it qualifies for automatically.
    async fn auto_join(&self, profile: &UserProfile) -> Result<(), SsoError>;

    /// Called once, when the first user of a fresh installation is created.
    async fn bootstrap_first_user(&self, user_id: &str) -> Result<(), SsoError>;
}

/// Group sync that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoGroupSync;

#[async_trait]
impl GroupSync for NoGroupSync {
    async fn auto_join(&self, _profile: &UserProfile) -> Result<(), SsoError> {
        Ok(())
    }

    async fn bootstrap_first_user(&self, _user_id: &str) -> Result<(), SsoError> {
        Ok(())
    }
}

// =============================================================================
// Resolution
// =============================================================================

/// Caller-supplied guesses about which user is logging in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionHints {
    /// User id of a session the caller already holds.
    pub session_user_id: Option<String>,
    /// User id bound into the consumed login state.
    pub state_user_id: Option<String>,
}

impl ResolutionHints {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn from_session(user_id: impl Into<String>) -> Self {
        Self {
            session_user_id: Some(user_id.into()),
            state_user_id: None,
        }
    }

    /// First non-empty hint, session before state.
    fn preferred(&self) -> Option<(&str, ResolvedBy)> {
        fn non_empty(v: &Option<String>) -> Option<&str> {
            v.as_deref().filter(|s| !s.is_empty())
        }
        non_empty(&self.session_user_id)
            .map(|u| (u, ResolvedBy::SessionHint))
            .or_else(|| non_empty(&self.state_user_id).map(|u| (u, ResolvedBy::StateHint)))
    }
}

/// Which signal decided the user id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedBy {
    ExistingProfile,
    SessionHint,
    StateHint,
    NewUser,
}

impl ResolvedBy {
    pub fn as_str(self) -> &'static str {
        match self {
            ResolvedBy::ExistingProfile => "existing_profile",
            ResolvedBy::SessionHint => "session_hint",
            ResolvedBy::StateHint => "state_hint",
            ResolvedBy::NewUser => "new_user",
        }
    }
}

/// Decides the owning user of a verified character and stores its profile.
pub struct IdentityResolver {
    store: Arc<dyn ProfileStore>,
    groups: Arc<dyn GroupSync>,
}

impl IdentityResolver {
    pub fn new(store: Arc<dyn ProfileStore>, groups: Arc<dyn GroupSync>) -> Self {
        Self { store, groups }
    }

    pub fn store(&self) -> &Arc<dyn ProfileStore> {
        &self.store
    }

    /// Resolve the user id for `identity` and upsert its profile with the
    /// fresh credential. Returns the profile as stored.
    pub async fn resolve_and_upsert(
        &self,
        identity: &VerifiedIdentity,
        credential: &ExternalCredential,
        hints: &ResolutionHints,
    ) -> Result<UserProfile, SsoError> {
        let existing = self.store.get_profile(identity.character_id).await?;

        let (user_id, resolved_by) = match (&existing, hints.preferred()) {
            (Some(profile), hint) => {
                if let Some((hinted, source)) = hint
                    && hinted != profile.user_id
                {
                    warn!(
                        character_id = identity.character_id,
                        existing_user = %profile.user_id,
                        hinted_user = %hinted,
                        hint = source.as_str(),
                        "hint conflicts with existing profile, keeping existing user"
                    );
                }
                (profile.user_id.clone(), ResolvedBy::ExistingProfile)
            }
            (None, Some((hinted, source))) => (hinted.to_string(), source),
            (None, None) => (new_user_id(), ResolvedBy::NewUser),
        };

        let mut profile = UserProfile::from_identity(identity, &user_id, credential);
        if profile.refresh_token.is_none() {
            profile.refresh_token = existing.as_ref().and_then(|p| p.refresh_token.clone());
        }

        let stored = self.store.upsert_profile(&profile).await?;
        if stored.user_id != user_id {
            // Another login of the same character inserted first.
            debug!(
                character_id = stored.character_id,
                user_id = %stored.user_id,
                "profile already claimed concurrently"
            );
        }
        info!(
            character_id = stored.character_id,
            user_id = %stored.user_id,
            resolved_by = resolved_by.as_str(),
            "character profile stored"
        );

        self.sync_groups(&stored, resolved_by == ResolvedBy::NewUser && stored.user_id == user_id)
            .await;
        Ok(stored)
    }

    async fn sync_groups(&self, profile: &UserProfile, minted: bool) {
        if let Err(e) = self.groups.auto_join(profile).await {
            warn!(character_id = profile.character_id, error = %e, "group auto-join failed");
        }
        if !minted {
            return;
        }
        match self.store.count_users().await {
            Ok(1) => {
                info!(user_id = %profile.user_id, "bootstrapping first user");
                if let Err(e) = self.groups.bootstrap_first_user(&profile.user_id).await {
                    warn!(user_id = %profile.user_id, error = %e, "first-user bootstrap failed");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "could not count users for bootstrap"),
        }
    }
}
