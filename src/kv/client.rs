//! Backing store abstraction
//!
//! The store talks to its KV service only through this trait, so the same
//! logic runs against Consul (`ConsulClient`) or in-process (`MemoryKv`).
//! Implementations report "not found" as `Ok(None)` and keep `Err` for
//! transport and protocol failures.

use crate::error::ContextResult;
use async_trait::async_trait;
use std::time::Duration;

/// Lock qualifier attached to a write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockMode {
    /// Plain write
    None,
    /// Write and take the key's lock for the session
    Acquire(String),
    /// Write and drop the key's lock held by the session
    Release(String),
}

/// A stored key as returned by the backing service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvEntry {
    pub key: String,
    pub value: Option<Vec<u8>>,
    /// Session holding the key's lock, if any
    pub session: Option<String>,
}

/// Parameters for creating a lock session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    pub name: String,
    pub node: String,
    pub ttl: Option<Duration>,
    pub lock_delay: Option<Duration>,
}

/// A live session as reported by the backing service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEntry {
    pub id: String,
    pub node: String,
    pub name: String,
}

/// Async interface to a Consul-style KV service
#[async_trait]
pub trait KvClient: Send + Sync {
    /// Read one key
    async fn get(&self, key: &str) -> ContextResult<Option<KvEntry>>;

    /// Write one key, returning the service's raw acknowledgement
    async fn set(&self, key: &str, value: Vec<u8>, mode: &LockMode)
        -> ContextResult<serde_json::Value>;

    /// List every key starting with `prefix`, returning the raw payload
    async fn list_keys(&self, prefix: &str) -> ContextResult<Option<serde_json::Value>>;

    /// Delete one key, or every key starting with `key` when `recursive`
    async fn delete(&self, key: &str, recursive: bool) -> ContextResult<()>;

    /// Create a session and return its ID
    async fn session_create(&self, request: &SessionRequest) -> ContextResult<String>;

    /// Look up a session by ID
    async fn session_info(&self, id: &str) -> ContextResult<Option<SessionEntry>>;

    /// Destroy a session, returning the service's acknowledgement
    async fn session_destroy(&self, id: &str) -> ContextResult<bool>;

    /// Human-readable backend name for diagnostics
    fn backend_name(&self) -> &'static str;
}
