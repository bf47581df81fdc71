//! Distributed lock on the store prefix

pub mod manager;
pub mod state;

pub use manager::{LockManager, UNLOCKED_SENTINEL};
pub use state::{LockSession, LockState};
