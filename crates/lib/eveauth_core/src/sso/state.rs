//! CSRF state tokens for in-flight logins.
//!
//! Each login attempt gets an unguessable state token that must come back on
//! the callback exactly once, within the TTL.

use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine;
use dashmap::DashMap;
use rand::RngCore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::SsoError;

/// TTL for pending login states (15 minutes).
pub const STATE_TTL: Duration = Duration::from_secs(15 * 60);

/// Upper bound on concurrently pending logins.
pub const DEFAULT_MAX_PENDING: usize = 10_000;

/// Interval of the background sweep.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Generate a state token: 256 random bits, URL-safe base64 without padding.
pub fn generate_state() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// A login attempt waiting for its callback.
#[derive(Debug, Clone)]
struct PendingLogin {
    /// User the login was started by, when it was started from a valid session.
    bound_user_id: Option<String>,
    created_at: Instant,
}

/// Bounded in-memory store of pending login states.
pub struct StateStore {
    states: DashMap<String, PendingLogin>,
    ttl: Duration,
    max_pending: usize,
}

impl StateStore {
    pub fn new() -> Self {
        Self::with_limits(STATE_TTL, DEFAULT_MAX_PENDING)
    }

    pub fn with_limits(ttl: Duration, max_pending: usize) -> Self {
        Self {
            states: DashMap::new(),
            ttl,
            max_pending,
        }
    }

    /// Issue a new state token, optionally bound to an already-authenticated user.
    pub fn issue(&self, bound_user_id: Option<String>) -> Result<String, SsoError> {
        if self.states.len() >= self.max_pending {
            let evicted = self.cleanup();
            if self.states.len() >= self.max_pending {
                warn!(
                    pending = self.states.len(),
                    evicted, "state store full, refusing new login"
                );
                return Err(SsoError::Transient("too many pending logins".into()));
            }
        }

        let token = generate_state();
        self.states.insert(
            token.clone(),
            PendingLogin {
                bound_user_id,
                created_at: Instant::now(),
            },
        );
        Ok(token)
    }

    /// Atomically remove the state and check its age.
    ///
    /// Returns the bound user ID (if any). Unknown, replayed and expired
    /// tokens are all rejected; the token is gone afterwards in every case.
    pub fn validate_and_consume(&self, token: &str) -> Result<Option<String>, SsoError> {
        let (_, pending) = self
            .states
            .remove(token)
            .ok_or_else(|| SsoError::Security("unknown or already used state".into()))?;
        if pending.created_at.elapsed() > self.ttl {
            return Err(SsoError::Security("expired state".into()));
        }
        Ok(pending.bound_user_id)
    }

    /// Evict expired entries, returning how many were removed.
    pub fn cleanup(&self) -> usize {
        let before = self.states.len();
        self.states.retain(|_, v| v.created_at.elapsed() <= self.ttl);
        before.saturating_sub(self.states.len())
    }

    /// Number of pending logins.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Spawn the periodic sweep. Stops when `cancel` fires.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        every: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("state sweeper stopped");
                        break;
                    }
                    _ = interval.tick() => {
                        let evicted = store.cleanup();
                        if evicted > 0 {
                            debug!(evicted, "evicted expired login states");
                        }
                    }
                }
            }
        })
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}
