//! Local read cache
//!
//! Mirrors raw serialized values by storage path. Writes go through
//! (`record`), reads fill in (`fill`), deletes and sweeps prune.
//!
//! Every mutation bumps a generation counter. A read that misses gets a
//! `ReadTicket` holding the generation it saw; filling with that ticket is a
//! no-op if anything mutated the cache while the remote read was in flight,
//! so a slow read can never reinstate a value that was overwritten or
//! deleted after it started.

use crate::error::{ContextError, ContextResult};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::trace;

/// Generation observed by a read that missed the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadTicket(u64);

/// Outcome of a cache lookup
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Hit(Value),
    Miss(ReadTicket),
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Vec<u8>>,
    generation: u64,
}

impl Inner {
    fn bump(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }
}

/// Path -> raw bytes mirror; all lookups miss when disabled
#[derive(Debug)]
pub struct LocalCache {
    enabled: bool,
    inner: RwLock<Inner>,
}

impl LocalCache {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            inner: RwLock::new(Inner::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Parsed value for `path`, or a ticket to fill it after a remote read
    pub async fn lookup(&self, path: &str) -> ContextResult<Lookup> {
        let inner = self.inner.read().await;
        let ticket = ReadTicket(inner.generation);
        if !self.enabled {
            return Ok(Lookup::Miss(ticket));
        }

        match inner.entries.get(path) {
            Some(bytes) => {
                let value = serde_json::from_slice(bytes).map_err(|e| ContextError::CacheCorrupt {
                    path: path.to_string(),
                    source: e,
                })?;
                trace!("cache hit {}", path);
                Ok(Lookup::Hit(value))
            }
            None => Ok(Lookup::Miss(ticket)),
        }
    }

    /// Current generation, for reads that bypass `lookup`
    pub async fn ticket(&self) -> ReadTicket {
        ReadTicket(self.inner.read().await.generation)
    }

    /// Write-through: `bytes` were just stored at `path`
    pub async fn record(&self, path: &str, bytes: Vec<u8>) {
        if !self.enabled {
            return;
        }
        let mut inner = self.inner.write().await;
        inner.bump();
        inner.entries.insert(path.to_string(), bytes);
    }

    /// Read-through: `bytes` were just read from `path`. Returns whether the
    /// entry was stored.
    pub async fn fill(&self, path: &str, bytes: Vec<u8>, ticket: ReadTicket) -> bool {
        if !self.enabled {
            return false;
        }
        let mut inner = self.inner.write().await;
        if inner.generation != ticket.0 || inner.entries.contains_key(path) {
            trace!("cache fill skipped for {}", path);
            return false;
        }
        inner.entries.insert(path.to_string(), bytes);
        true
    }

    /// Drop the entry for `path`
    pub async fn forget(&self, path: &str) {
        let mut inner = self.inner.write().await;
        inner.bump();
        inner.entries.remove(path);
    }

    /// Drop every entry whose path starts with `prefix`
    pub async fn forget_subtree(&self, prefix: &str) -> usize {
        let mut inner = self.inner.write().await;
        inner.bump();
        let before = inner.entries.len();
        inner.entries.retain(|path, _| !path.starts_with(prefix));
        before - inner.entries.len()
    }

    /// Keep only entries whose path satisfies `keep`; returns how many went
    pub async fn retain<F>(&self, mut keep: F) -> usize
    where
        F: FnMut(&str) -> bool,
    {
        let mut inner = self.inner.write().await;
        inner.bump();
        let before = inner.entries.len();
        inner.entries.retain(|path, _| keep(path));
        before - inner.entries.len()
    }

    /// Drop everything
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.bump();
        inner.entries.clear();
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Raw bytes cached for `path`
    pub async fn raw(&self, path: &str) -> Option<Vec<u8>> {
        self.inner.read().await.entries.get(path).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn record_then_lookup() {
        let cache = LocalCache::new(true);
        cache.record("ctx/f1/a", b"{\"n\":1}".to_vec()).await;

        assert_eq!(cache.lookup("ctx/f1/a").await.unwrap(), Lookup::Hit(json!({"n": 1})));
        assert!(matches!(cache.lookup("ctx/f1/b").await.unwrap(), Lookup::Miss(_)));
    }

    #[tokio::test]
    async fn disabled_cache_always_misses() {
        let cache = LocalCache::new(false);
        cache.record("ctx/f1/a", b"1".to_vec()).await;

        assert!(matches!(cache.lookup("ctx/f1/a").await.unwrap(), Lookup::Miss(_)));
        let ticket = cache.ticket().await;
        assert!(!cache.fill("ctx/f1/a", b"1".to_vec(), ticket).await);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn corrupt_bytes_are_reported() {
        let cache = LocalCache::new(true);
        cache.record("ctx/f1/a", b"{not json".to_vec()).await;

        let err = cache.lookup("ctx/f1/a").await.unwrap_err();
        assert!(matches!(err, ContextError::CacheCorrupt { ref path, .. } if path == "ctx/f1/a"));
    }

    #[tokio::test]
    async fn fill_is_dropped_after_concurrent_mutation() {
        let cache = LocalCache::new(true);
        let Lookup::Miss(ticket) = cache.lookup("ctx/f1/a").await.unwrap() else {
            panic!("expected miss");
        };

        // A delete lands while the read is in flight
        cache.forget("ctx/f1/a").await;
        assert!(!cache.fill("ctx/f1/a", b"1".to_vec(), ticket).await);
        assert_eq!(cache.raw("ctx/f1/a").await, None);
    }

    #[tokio::test]
    async fn fill_never_overwrites_a_write() {
        let cache = LocalCache::new(true);
        let ticket = cache.ticket().await;
        cache.record("ctx/f1/a", b"2".to_vec()).await;

        assert!(!cache.fill("ctx/f1/a", b"1".to_vec(), ticket).await);
        assert_eq!(cache.raw("ctx/f1/a").await, Some(b"2".to_vec()));
    }

    #[tokio::test]
    async fn fill_with_fresh_ticket() {
        let cache = LocalCache::new(true);
        let ticket = cache.ticket().await;
        assert!(cache.fill("ctx/f1/a", b"1".to_vec(), ticket).await);
        assert_eq!(cache.lookup("ctx/f1/a").await.unwrap(), Lookup::Hit(json!(1)));
    }

    #[tokio::test]
    async fn forget_subtree_and_retain() {
        let cache = LocalCache::new(true);
        for path in ["ctx/f1/a", "ctx/f1/b", "ctx/f10/a", "ctx/global/a"] {
            cache.record(path, b"1".to_vec()).await;
        }

        assert_eq!(cache.forget_subtree("ctx/f1/").await, 2);
        assert_eq!(cache.len().await, 2);

        assert_eq!(cache.retain(|p| p.starts_with("ctx/global/")).await, 1);
        assert_eq!(cache.raw("ctx/global/a").await, Some(b"1".to_vec()));

        cache.clear().await;
        assert!(cache.is_empty().await);
    }
}
