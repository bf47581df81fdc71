//! Session lock lifecycle
//!
//! Acquisition is two-phase: create a session bound to the lock node and
//! confirm it by reading it back, then attach the lock key to it with an
//! `acquire` write. Release mirrors it: detach the key with a `release`
//! write carrying the unlocked sentinel, then destroy the session.

use crate::config::LockConfig;
use crate::error::{ContextError, ContextResult};
use crate::keys;
use crate::kv::{LockMode, RemoteKv, SessionRequest};
use crate::lock::state::{LockSession, LockState};
use serde_json::Value;
use tracing::{debug, info, warn};

/// Value left at the lock key once released
pub const UNLOCKED_SENTINEL: &str = "unlocked";

/// Owns the store's lock session; one per store, not reentrant
pub struct LockManager {
    remote: RemoteKv,
    config: LockConfig,
    prefix: String,
    state: LockState,
    session: Option<LockSession>,
}

impl LockManager {
    pub fn new(remote: RemoteKv, config: LockConfig, prefix: &str) -> Self {
        Self {
            remote,
            config,
            prefix: prefix.to_string(),
            state: LockState::Unlocked,
            session: None,
        }
    }

    pub fn state(&self) -> LockState {
        self.state
    }

    pub fn session(&self) -> Option<&LockSession> {
        self.session.as_ref()
    }

    pub fn lock_key(&self) -> String {
        keys::lock_path(&self.prefix)
    }

    /// Create a session and attach the lock key to it
    pub async fn acquire(&mut self) -> ContextResult<LockSession> {
        if !self.state.can_acquire() {
            return Err(ContextError::LockUnavailable(format!(
                "lock manager is {:?}",
                self.state
            )));
        }

        let client = self.remote.client().clone();
        let lock_key = self.lock_key();
        let node = self.config.node.clone();

        self.state = LockState::SessionPending;
        let request = SessionRequest {
            name: format!("consul-context:{}", self.prefix),
            node: node.clone(),
            ttl: self.config.ttl,
            lock_delay: self.config.delay,
        };
        let session_id = match client.session_create(&request).await {
            Ok(id) => id,
            Err(e) => {
                self.state = LockState::LockFailed;
                return Err(ContextError::LockUnavailable(format!(
                    "creating session on node {}: {}",
                    node, e
                )));
            }
        };
        debug!("Created session {} on node {}", session_id, node);

        let confirmed = match client.session_info(&session_id).await {
            Ok(Some(entry)) if entry.id == session_id => Ok(()),
            Ok(Some(entry)) => Err(format!(
                "session {} read back as {}",
                session_id, entry.id
            )),
            Ok(None) => Err(format!("session {} not found after creation", session_id)),
            Err(e) => Err(format!("confirming session {}: {}", session_id, e)),
        };
        if let Err(reason) = confirmed {
            self.abandon(&session_id).await;
            return Err(ContextError::LockUnavailable(reason));
        }
        self.state = LockState::SessionActive;

        let session = LockSession::new(session_id.clone(), lock_key.clone(), node);
        let payload = session.payload().to_string().into_bytes();
        let attached = self
            .remote
            .put_with(&lock_key, payload, &LockMode::Acquire(session_id.clone()))
            .await;

        match attached {
            Ok(()) => {
                info!("Acquired lock {} with session {}", lock_key, session_id);
                self.state = LockState::LockHeld;
                self.session = Some(session.clone());
                Ok(session)
            }
            Err(ContextError::WriteRejected { .. }) => {
                self.abandon(&session_id).await;
                Err(ContextError::LockContested { key: lock_key })
            }
            Err(e) => {
                self.abandon(&session_id).await;
                Err(ContextError::LockUnavailable(format!(
                    "attaching lock {}: {}",
                    lock_key, e
                )))
            }
        }
    }

    /// Detach the lock key and destroy the session; both steps always run
    pub async fn release(&mut self) -> ContextResult<()> {
        let Some(session) = self.session.take() else {
            self.state = LockState::Unlocked;
            return Ok(());
        };
        self.state = LockState::Releasing;

        let mut failures = Vec::new();
        let sentinel = Value::from(UNLOCKED_SENTINEL).to_string().into_bytes();
        if let Err(e) = self
            .remote
            .put_with(
                &session.lock_key,
                sentinel,
                &LockMode::Release(session.session_id.clone()),
            )
            .await
        {
            failures.push(format!("releasing {}: {}", session.lock_key, e));
        }

        match self.remote.client().session_destroy(&session.session_id).await {
            Ok(true) => {}
            Ok(false) => failures.push(format!(
                "destroying session {}: not acknowledged",
                session.session_id
            )),
            Err(e) => failures.push(format!(
                "destroying session {}: {}",
                session.session_id, e
            )),
        }

        self.state = LockState::Unlocked;
        if failures.is_empty() {
            info!("Released lock {}", session.lock_key);
            Ok(())
        } else {
            for failure in &failures {
                warn!("Lock release: {}", failure);
            }
            Err(ContextError::Shutdown(failures))
        }
    }

    /// Best-effort teardown of a session that never became a held lock
    async fn abandon(&mut self, session_id: &str) {
        self.state = LockState::LockFailed;
        if let Err(e) = self.remote.client().session_destroy(session_id).await {
            warn!("Failed to destroy abandoned session {}: {}", session_id, e);
        }
    }
}
