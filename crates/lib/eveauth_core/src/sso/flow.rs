//! The login flow: authorize redirect, callback, code exchange, session.
//!
//! A callback runs its stages strictly in order and stops at the first
//! failure. Nothing is persisted and no session is minted for a rejected
//! login; only the consumed state stays consumed.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::SsoError;
use super::client::ProviderClient;
use super::identity::{GroupSync, IdentityResolver, ResolutionHints};
use super::jwks::JwksVerifier;
use super::refresh::TokenRefreshWorker;
use super::state::StateStore;
use crate::auth::AuthError;
use crate::auth::jwt::SessionIssuer;
use crate::config::SsoConfig;
use crate::models::auth::{IssuedSession, SessionClaims};
use crate::models::profile::{ExternalCredential, UserProfile, VerifiedIdentity};
use crate::profiles::ProfileStore;

// =============================================================================
// Errors
// =============================================================================

/// Stages of one login attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStage {
    Initiated,
    StateIssued,
    CallbackReceived,
    CodeExchanged,
    IdentityVerified,
    SessionIssued,
}

impl LoginStage {
    pub fn as_str(self) -> &'static str {
        match self {
            LoginStage::Initiated => "initiated",
            LoginStage::StateIssued => "state_issued",
            LoginStage::CallbackReceived => "callback_received",
            LoginStage::CodeExchanged => "code_exchanged",
            LoginStage::IdentityVerified => "identity_verified",
            LoginStage::SessionIssued => "session_issued",
        }
    }
}

/// Why a login was rejected.
#[derive(Debug, Error)]
pub enum LoginError {
    #[error("Invalid or expired login state")]
    InvalidState,

    #[error("Missing parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Code exchange failed: {0}")]
    ExchangeFailed(SsoError),

    #[error("Token verification failed: {0}")]
    VerificationFailed(SsoError),

    #[error("Profile update failed: {0}")]
    Persistence(SsoError),

    #[error("Session error: {0}")]
    Session(#[from] AuthError),

    /// Login could not be started (state store full, bad authorize URL).
    #[error("Login unavailable: {0}")]
    Unavailable(SsoError),
}

impl LoginError {
    /// Last stage the attempt completed before it was rejected.
    pub fn stage(&self) -> LoginStage {
        match self {
            LoginError::Unavailable(_) => LoginStage::Initiated,
            LoginError::InvalidState
            | LoginError::MissingParameter(_)
            | LoginError::ExchangeFailed(_) => LoginStage::CallbackReceived,
            LoginError::VerificationFailed(_) => LoginStage::CodeExchanged,
            LoginError::Persistence(_) | LoginError::Session(_) => LoginStage::IdentityVerified,
        }
    }
}

// =============================================================================
// Results
// =============================================================================

/// Where to send the browser to start a login.
#[derive(Debug, Clone)]
pub struct LoginRedirect {
    pub authorization_url: String,
    pub state: String,
}

/// A completed login, from the callback or a mobile token exchange.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub session: IssuedSession,
    pub identity: VerifiedIdentity,
    pub profile: UserProfile,
}

// =============================================================================
// Flow
// =============================================================================

/// Entry points of the identity subsystem.
pub struct SsoFlow {
    config: Arc<SsoConfig>,
    client: ProviderClient,
    states: Arc<StateStore>,
    verifier: Arc<JwksVerifier>,
    resolver: Arc<IdentityResolver>,
    sessions: Arc<SessionIssuer>,
}

impl SsoFlow {
    /// Wire up the flow around a profile store and a group capability.
    pub fn new(
        config: SsoConfig,
        store: Arc<dyn ProfileStore>,
        groups: Arc<dyn GroupSync>,
        sessions: SessionIssuer,
    ) -> Result<Self, SsoError> {
        let config = Arc::new(config);
        let client = ProviderClient::new(config.clone())?;
        let verifier = Arc::new(JwksVerifier::new(client.http().clone(), &config));
        let states = Arc::new(StateStore::with_limits(
            config.state_ttl,
            config.max_pending_logins,
        ));
        Ok(Self {
            client,
            states,
            verifier,
            resolver: Arc::new(IdentityResolver::new(store, groups)),
            sessions: Arc::new(sessions),
            config,
        })
    }

    pub fn config(&self) -> &SsoConfig {
        &self.config
    }

    pub fn state_store(&self) -> &Arc<StateStore> {
        &self.states
    }

    pub fn verifier(&self) -> &Arc<JwksVerifier> {
        &self.verifier
    }

    /// A refresh worker sharing this flow's client, key cache and store.
    pub fn refresh_worker(&self) -> TokenRefreshWorker {
        TokenRefreshWorker::new(
            self.client.clone(),
            self.verifier.clone(),
            self.resolver.clone(),
            &self.config,
        )
    }

    /// Issue a state and build the provider authorize URL.
    ///
    /// `hint_user_id` is bound into the state so the callback can link the
    /// character to that user even if the session cookie is gone by then.
    pub fn initiate_login(
        &self,
        with_full_scopes: bool,
        hint_user_id: Option<String>,
    ) -> Result<LoginRedirect, LoginError> {
        let state = self
            .states
            .issue(hint_user_id)
            .map_err(LoginError::Unavailable)?;
        let authorization_url = self
            .client
            .authorization_url(&state, with_full_scopes)
            .map_err(LoginError::Unavailable)?;
        debug!(
            stage = LoginStage::StateIssued.as_str(),
            with_full_scopes, "login initiated"
        );
        Ok(LoginRedirect {
            authorization_url,
            state,
        })
    }

    /// Complete a login from the provider's redirect.
    pub async fn handle_callback(
        &self,
        code: &str,
        state: &str,
        hint_user_id: Option<String>,
    ) -> Result<LoginOutcome, LoginError> {
        if code.is_empty() {
            return Err(LoginError::MissingParameter("code"));
        }
        if state.is_empty() {
            return Err(LoginError::MissingParameter("state"));
        }

        // State is consumed before any network call.
        let bound_user_id = self.states.validate_and_consume(state).map_err(|e| {
            warn!(error = %e, "login callback rejected: state");
            LoginError::InvalidState
        })?;

        let credential = self.client.exchange_code(code).await.map_err(|e| {
            warn!(kind = e.kind(), error = %e, "login callback rejected: code exchange");
            LoginError::ExchangeFailed(e)
        })?;

        let identity = self.verify_credential(&credential).await?;

        // A session hint only counts when it is the user bound at login start.
        let session_user_id = hint_user_id.filter(|hinted| {
            let matches = bound_user_id.as_deref() == Some(hinted.as_str());
            if !matches {
                warn!(hinted_user = %hinted, "session hint does not match login state, ignoring");
            }
            matches
        });
        let hints = ResolutionHints {
            session_user_id,
            state_user_id: bound_user_id,
        };
        let (profile, session) = self.link_and_issue(&identity, &credential, &hints).await?;

        info!(
            stage = LoginStage::SessionIssued.as_str(),
            character_id = identity.character_id,
            user_id = %profile.user_id,
            "login completed"
        );
        Ok(LoginOutcome {
            session,
            identity,
            profile,
        })
    }

    /// Trade a provider token obtained natively by a mobile client for a session.
    pub async fn exchange_mobile_token(
        &self,
        access_token: &str,
        refresh_token: Option<String>,
    ) -> Result<LoginOutcome, LoginError> {
        if access_token.is_empty() {
            return Err(LoginError::MissingParameter("access_token"));
        }
        let mut credential = ExternalCredential {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.filter(|rt| !rt.is_empty()),
            expires_in: 0,
        };
        let identity = self.verify_credential(&credential).await?;
        credential.expires_in = (identity.expires_on - chrono::Utc::now()).num_seconds().max(0);

        let (profile, session) = self
            .link_and_issue(&identity, &credential, &ResolutionHints::none())
            .await?;
        info!(
            character_id = identity.character_id,
            user_id = %profile.user_id,
            "mobile token exchanged"
        );
        Ok(LoginOutcome {
            session,
            identity,
            profile,
        })
    }

    /// Check one of our own session tokens. No network access.
    pub fn verify_session(&self, token: &str) -> Result<SessionClaims, AuthError> {
        self.sessions.verify(token)
    }

    /// All characters linked to a user.
    pub async fn characters_for_user(&self, user_id: &str) -> Result<Vec<UserProfile>, SsoError> {
        self.resolver.store().list_profiles_for_user(user_id).await
    }

    async fn verify_credential(
        &self,
        credential: &ExternalCredential,
    ) -> Result<VerifiedIdentity, LoginError> {
        self.verifier
            .verify(&credential.access_token)
            .await
            .map_err(|e| {
                warn!(kind = e.kind(), error = %e, "login rejected: token verification");
                LoginError::VerificationFailed(e)
            })
    }

    async fn link_and_issue(
        &self,
        identity: &VerifiedIdentity,
        credential: &ExternalCredential,
        hints: &ResolutionHints,
    ) -> Result<(UserProfile, IssuedSession), LoginError> {
        let profile = self
            .resolver
            .resolve_and_upsert(identity, credential, hints)
            .await
            .map_err(|e| {
                warn!(
                    character_id = identity.character_id,
                    kind = e.kind(),
                    error = %e,
                    "login rejected: profile update"
                );
                LoginError::Persistence(e)
            })?;
        let session = self.sessions.issue(
            &profile.user_id,
            identity.character_id,
            &identity.character_name,
            &profile.scopes,
        )?;
        Ok((profile, session))
    }
}
