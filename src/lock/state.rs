//! Lock lifecycle state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where the lock manager is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    Unlocked,
    SessionPending,
    SessionActive,
    LockHeld,
    Releasing,
    LockFailed,
}

impl LockState {
    /// Whether `acquire` may start from this state
    pub fn can_acquire(&self) -> bool {
        matches!(self, Self::Unlocked | Self::LockFailed)
    }
}

/// A held lock: the session and the key it is attached to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockSession {
    pub session_id: String,
    pub lock_key: String,
    pub node: String,
    pub acquired_at: DateTime<Utc>,
}

impl LockSession {
    pub fn new(session_id: String, lock_key: String, node: String) -> Self {
        Self {
            session_id,
            lock_key,
            node,
            acquired_at: Utc::now(),
        }
    }

    /// Value stored at the lock key while held
    pub fn payload(&self) -> serde_json::Value {
        serde_json::json!({
            "node": self.node,
            "session": self.session_id,
            "acquired_at": self.acquired_at.to_rfc3339(),
        })
    }
}
