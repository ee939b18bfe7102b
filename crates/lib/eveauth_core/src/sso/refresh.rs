//! Background refresh of stored provider tokens.
//!
//! Each pass selects profiles whose access token expires soon and runs the
//! refresh grant for them one at a time. A failing candidate is logged and
//! counted; it never stops the batch and its stored tokens stay as they were.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::SsoError;
use super::client::ProviderClient;
use super::identity::{IdentityResolver, ResolutionHints};
use super::jwks::JwksVerifier;
use crate::config::SsoConfig;
use crate::models::profile::UserProfile;

/// Outcome counts of one refresh pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshReport {
    pub success_count: usize,
    pub failure_count: usize,
}

pub struct TokenRefreshWorker {
    client: ProviderClient,
    verifier: Arc<JwksVerifier>,
    resolver: Arc<IdentityResolver>,
    interval: Duration,
    lookahead: Duration,
    batch_size: usize,
}

impl TokenRefreshWorker {
    pub fn new(
        client: ProviderClient,
        verifier: Arc<JwksVerifier>,
        resolver: Arc<IdentityResolver>,
        config: &SsoConfig,
    ) -> Self {
        Self {
            client,
            verifier,
            resolver,
            interval: config.refresh_interval,
            lookahead: config.refresh_lookahead,
            batch_size: config.refresh_batch_size,
        }
    }

    /// Refresh up to `batch_size` profiles that are due.
    ///
    /// Only the candidate query can fail the whole pass.
    pub async fn refresh_batch(&self, batch_size: usize) -> Result<RefreshReport, SsoError> {
        let lookahead = chrono::Duration::from_std(self.lookahead)
            .map_err(|e| SsoError::Protocol(format!("refresh lookahead: {e}")))?;
        let candidates = self
            .resolver
            .store()
            .list_profiles_expiring_before(Utc::now() + lookahead, batch_size)
            .await?;

        let mut report = RefreshReport::default();
        for candidate in &candidates {
            match self.refresh_one(candidate).await {
                Ok(()) => report.success_count += 1,
                Err(e) => {
                    report.failure_count += 1;
                    warn!(
                        character_id = candidate.character_id,
                        kind = e.kind(),
                        error = %e,
                        "token refresh failed"
                    );
                    if matches!(e, SsoError::InvalidGrant(_)) {
                        self.deactivate(candidate.character_id).await;
                    }
                }
            }
        }

        if !candidates.is_empty() {
            info!(
                success = report.success_count,
                failure = report.failure_count,
                "token refresh pass finished"
            );
        }
        Ok(report)
    }

    async fn refresh_one(&self, candidate: &UserProfile) -> Result<(), SsoError> {
        // An unreadable stored token can never be refreshed; deactivate like a revoked one.
        let refresh_token = candidate.refresh_token.as_deref().ok_or_else(|| {
            SsoError::InvalidGrant(format!(
                "no usable refresh token for character {}",
                candidate.character_id
            ))
        })?;

        let credential = self.client.refresh(refresh_token).await?;
        let identity = self.verifier.verify(&credential.access_token).await?;
        if identity.character_id != candidate.character_id {
            return Err(SsoError::Security(format!(
                "refresh for character {} returned character {}",
                candidate.character_id, identity.character_id
            )));
        }

        let hints = ResolutionHints::from_session(candidate.user_id.clone());
        self.resolver
            .resolve_and_upsert(&identity, &credential, &hints)
            .await?;
        debug!(character_id = candidate.character_id, "token refreshed");
        Ok(())
    }

    async fn deactivate(&self, character_id: i64) {
        match self.resolver.store().mark_invalid(character_id).await {
            Ok(()) => info!(character_id, "refresh token revoked, profile deactivated"),
            Err(e) => warn!(character_id, error = %e, "could not deactivate profile"),
        }
    }

    /// Run passes on the configured interval until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("token refresh worker stopped");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.refresh_batch(self.batch_size).await {
                        warn!(kind = e.kind(), error = %e, "token refresh pass aborted");
                    }
                }
            }
        }
    }

    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }
}
