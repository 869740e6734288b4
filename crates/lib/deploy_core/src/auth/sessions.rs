//! In-memory session registry.
//!
//! Maps refresh-token fingerprints to [`Session`] records behind a
//! reader/writer lock: lookups share the lock, every mutation (including the
//! periodic sweep) takes it exclusively. The registry never sees a raw token.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::AuthError;
use crate::clock::Clock;
use crate::models::auth::{ClientMeta, Identity, Session, SessionKey};

/// Thread-safe table of live sessions.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionKey, Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // Poisoning is recovered: a panicking pass leaves a usable map.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<SessionKey, Session>> {
        self.sessions.read().unwrap_or_else(|poisoned| {
            warn!("session registry lock was poisoned, recovering");
            self.sessions.clear_poison();
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<SessionKey, Session>> {
        self.sessions.write().unwrap_or_else(|poisoned| {
            warn!("session registry lock was poisoned, recovering");
            self.sessions.clear_poison();
            poisoned.into_inner()
        })
    }

    /// Register a new session keyed by `key`.
    pub fn create(
        &self,
        identity: Identity,
        key: SessionKey,
        client: ClientMeta,
        now: DateTime<Utc>,
    ) -> Result<Session, AuthError> {
        let session = Session {
            identity,
            key: key.clone(),
            created_at: now,
            last_used_at: now,
            session_started_at: now,
            client,
        };
        self.write().insert(key, session.clone());
        Ok(session)
    }

    pub fn lookup(&self, key: &SessionKey) -> Result<Session, AuthError> {
        self.read()
            .get(key)
            .cloned()
            .ok_or(AuthError::SessionNotFound)
    }

    /// Remove one session. Returns whether it existed.
    pub fn revoke(&self, key: &SessionKey) -> Result<bool, AuthError> {
        Ok(self.write().remove(key).is_some())
    }

    /// Remove every session owned by `identity`. Returns how many were removed.
    pub fn revoke_all_for(&self, identity: &Identity) -> Result<usize, AuthError> {
        let mut sessions = self.write();
        let before = sessions.len();
        sessions.retain(|_, s| &s.identity != identity);
        Ok(before - sessions.len())
    }

    /// Replace `old` with `next` under a single exclusive lock.
    ///
    /// Fails with `SessionNotFound` if `old` is already gone, so of two
    /// concurrent rotations of the same session exactly one succeeds.
    pub fn rotate(&self, old: &SessionKey, next: Session) -> Result<Session, AuthError> {
        let mut sessions = self.write();
        if sessions.remove(old).is_none() {
            return Err(AuthError::SessionNotFound);
        }
        sessions.insert(next.key.clone(), next.clone());
        Ok(next)
    }

    /// Evict sessions older than `max_age` at `now`. Returns how many were removed.
    pub fn sweep(&self, now: DateTime<Utc>, max_age: Duration) -> Result<usize, AuthError> {
        let mut sessions = self.write();
        let before = sessions.len();
        sessions.retain(|_, s| s.age(now) <= max_age);
        Ok(before - sessions.len())
    }

    pub fn count(&self) -> Result<usize, AuthError> {
        Ok(self.read().len())
    }

    /// Spawn the periodic sweep task.
    ///
    /// Each pass runs on the blocking pool; a panicking pass is logged and the
    /// loop carries on at the next tick. The task exits when `cancel` fires.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        clock: Arc<dyn Clock>,
        interval: StdDuration,
        max_age: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately; skip it.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("session sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {}
                }

                let registry = Arc::clone(&registry);
                let clock = Arc::clone(&clock);
                let pass =
                    tokio::task::spawn_blocking(move || registry.sweep(clock.now(), max_age));
                match pass.await {
                    Ok(Ok(0)) => {}
                    Ok(Ok(removed)) => info!(removed, "swept expired sessions"),
                    Ok(Err(e)) => error!(error = %e, "session sweep failed"),
                    Err(e) => error!(error = %e, "session sweep panicked"),
                }
            }
            debug!("session sweeper exited");
        })
    }
}
