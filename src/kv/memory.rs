//! In-process KV backend with Consul semantics
//!
//! Used by tests and for dry runs. Mirrors the parts of Consul the store
//! relies on: string-prefix listing and recursive delete, sessions bound to a
//! node, `acquire`/`release` lock qualifiers and release-on-destroy. Faults
//! can be injected per operation and path prefix.

use crate::error::{ContextError, ContextResult};
use crate::kv::client::{KvClient, KvEntry, LockMode, SessionEntry, SessionRequest};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KvOp {
    Get,
    Set,
    ListKeys,
    Delete,
    SessionCreate,
    SessionInfo,
    SessionDestroy,
}

impl KvOp {
    fn name(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Set => "set",
            Self::ListKeys => "list_keys",
            Self::Delete => "delete",
            Self::SessionCreate => "session_create",
            Self::SessionInfo => "session_info",
            Self::SessionDestroy => "session_destroy",
        }
    }
}

#[derive(Debug, Clone)]
struct StoredValue {
    value: Vec<u8>,
    session: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    entries: BTreeMap<String, StoredValue>,
    sessions: HashMap<String, SessionEntry>,
    faults: Vec<(KvOp, String)>,
    forced_ack: Option<Value>,
    misreport_sessions: bool,
    writes: usize,
}

impl State {
    fn check(&self, op: KvOp, path: &str) -> ContextResult<()> {
        let injected = self
            .faults
            .iter()
            .any(|(fault_op, prefix)| *fault_op == op && path.starts_with(prefix.as_str()));
        if injected {
            Err(ContextError::transport(op.name(), path, "injected fault"))
        } else {
            Ok(())
        }
    }
}

/// Shared in-memory KV service; clone the `Arc` to share it between stores
#[derive(Debug, Default)]
pub struct MemoryKv {
    state: Mutex<State>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every `op` on paths starting with `path_prefix`
    pub async fn fail(&self, op: KvOp, path_prefix: impl Into<String>) {
        self.state.lock().await.faults.push((op, path_prefix.into()));
    }

    /// Remove all injected faults
    pub async fn heal(&self) {
        let mut state = self.state.lock().await;
        state.faults.clear();
        state.forced_ack = None;
        state.misreport_sessions = false;
    }

    /// Answer every write with `ack` instead of applying it
    pub async fn force_ack(&self, ack: Value) {
        self.state.lock().await.forced_ack = Some(ack);
    }

    /// Make session lookups report a different session than asked for
    pub async fn misreport_sessions(&self) {
        self.state.lock().await.misreport_sessions = true;
    }

    /// Insert a value directly, bypassing the client interface
    pub async fn insert_raw(&self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.state.lock().await.entries.insert(
            key.into(),
            StoredValue {
                value: value.into(),
                session: None,
            },
        );
    }

    /// Raw value stored at `key`
    pub async fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.state.lock().await.entries.get(key).map(|e| e.value.clone())
    }

    /// Every stored key, sorted
    pub async fn keys(&self) -> Vec<String> {
        self.state.lock().await.entries.keys().cloned().collect()
    }

    /// Session currently holding the lock on `key`
    pub async fn lock_holder(&self, key: &str) -> Option<String> {
        self.state
            .lock()
            .await
            .entries
            .get(key)
            .and_then(|e| e.session.clone())
    }

    /// Number of live sessions
    pub async fn session_count(&self) -> usize {
        self.state.lock().await.sessions.len()
    }

    /// Number of write calls received, applied or not
    pub async fn write_count(&self) -> usize {
        self.state.lock().await.writes
    }
}

#[async_trait]
impl KvClient for MemoryKv {
    async fn get(&self, key: &str) -> ContextResult<Option<KvEntry>> {
        let state = self.state.lock().await;
        state.check(KvOp::Get, key)?;
        Ok(state.entries.get(key).map(|stored| KvEntry {
            key: key.to_string(),
            value: Some(stored.value.clone()),
            session: stored.session.clone(),
        }))
    }

    async fn set(&self, key: &str, value: Vec<u8>, mode: &LockMode) -> ContextResult<Value> {
        let mut state = self.state.lock().await;
        state.writes += 1;
        state.check(KvOp::Set, key)?;
        if let Some(ack) = state.forced_ack.clone() {
            return Ok(ack);
        }

        let holder = state.entries.get(key).and_then(|e| e.session.clone());
        let session = match mode {
            LockMode::None => holder,
            LockMode::Acquire(id) => {
                if !state.sessions.contains_key(id) {
                    return Err(ContextError::protocol(
                        "set",
                        key,
                        format!("invalid session \"{}\"", id),
                    ));
                }
                match holder {
                    Some(other) if other != *id => return Ok(Value::Bool(false)),
                    _ => Some(id.clone()),
                }
            }
            LockMode::Release(id) => match holder {
                Some(current) if current == *id => None,
                _ => return Ok(Value::Bool(false)),
            },
        };

        state
            .entries
            .insert(key.to_string(), StoredValue { value, session });
        Ok(Value::Bool(true))
    }

    async fn list_keys(&self, prefix: &str) -> ContextResult<Option<Value>> {
        let state = self.state.lock().await;
        state.check(KvOp::ListKeys, prefix)?;
        let keys: Vec<Value> = state
            .entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .map(|k| Value::String(k.clone()))
            .collect();
        if keys.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Value::Array(keys)))
        }
    }

    async fn delete(&self, key: &str, recursive: bool) -> ContextResult<()> {
        let mut state = self.state.lock().await;
        state.check(KvOp::Delete, key)?;
        if recursive {
            state.entries.retain(|k, _| !k.starts_with(key));
        } else {
            state.entries.remove(key);
        }
        Ok(())
    }

    async fn session_create(&self, request: &SessionRequest) -> ContextResult<String> {
        let mut state = self.state.lock().await;
        state.check(KvOp::SessionCreate, &request.node)?;
        let id = Uuid::new_v4().to_string();
        state.sessions.insert(
            id.clone(),
            SessionEntry {
                id: id.clone(),
                node: request.node.clone(),
                name: request.name.clone(),
            },
        );
        Ok(id)
    }

    async fn session_info(&self, id: &str) -> ContextResult<Option<SessionEntry>> {
        let state = self.state.lock().await;
        state.check(KvOp::SessionInfo, id)?;
        let entry = state.sessions.get(id).cloned();
        if state.misreport_sessions {
            return Ok(entry.map(|e| SessionEntry {
                id: Uuid::new_v4().to_string(),
                ..e
            }));
        }
        Ok(entry)
    }

    async fn session_destroy(&self, id: &str) -> ContextResult<bool> {
        let mut state = self.state.lock().await;
        state.check(KvOp::SessionDestroy, id)?;
        state.sessions.remove(id);
        // Destroying a session releases every lock it holds
        for stored in state.entries.values_mut() {
            if stored.session.as_deref() == Some(id) {
                stored.session = None;
            }
        }
        Ok(true)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
