//! Scoped context store
//!
//! `ContextStore` ties the key codec, the remote facade, the read cache and
//! the optional session lock together behind the host-facing operations:
//! `open`, `close`, `get`, `set`, `keys`, `delete` and `clean`.

pub mod shape;
pub mod sweep;

pub use shape::{Fetched, KeySpec, PlannedWrite, ValueSpec, MAX_VALUE_BYTES};
pub use sweep::{SweepPolicy, SweepReport};

use crate::cache::{LocalCache, Lookup, ReadTicket};
use crate::config::StoreConfig;
use crate::error::{ContextError, ContextResult};
use crate::keys;
use crate::kv::{KvClient, RemoteKv};
use crate::lock::{LockManager, LockSession};
use futures_util::future::{join_all, try_join, try_join_all};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Value written to the probe key during `open`
const PROBE_VALUE: &str = "world";

/// Outcome of resolving one path, before it is committed to the cache
enum Resolved {
    Cached(Value),
    Missing,
    Fetched {
        path: String,
        ticket: ReadTicket,
        bytes: Vec<u8>,
        value: Value,
    },
}

/// Durable hierarchical context store over a Consul-style KV service
pub struct ContextStore {
    config: StoreConfig,
    remote: RemoteKv,
    cache: LocalCache,
    lock: Option<Mutex<LockManager>>,
    open: AtomicBool,
    /// Serializes `open` and `close`
    lifecycle: Mutex<()>,
}

impl ContextStore {
    pub fn new(config: StoreConfig, client: Arc<dyn KvClient>) -> Self {
        let remote = RemoteKv::new(client);
        let lock = config
            .lock
            .clone()
            .map(|lock| Mutex::new(LockManager::new(remote.clone(), lock, &config.prefix)));
        Self {
            cache: LocalCache::new(config.cache_enabled),
            remote,
            lock,
            open: AtomicBool::new(false),
            lifecycle: Mutex::new(()),
            config,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// The held lock session, if locking is enabled and the store is open
    pub async fn lock_session(&self) -> Option<LockSession> {
        let lock = self.lock.as_ref()?;
        lock.lock().await.session().cloned()
    }

    /// Acquire the lock (if enabled) and run the connectivity self-tests
    pub async fn open(&self) -> ContextResult<()> {
        let _guard = self.lifecycle.lock().await;
        if self.is_open() {
            return Err(ContextError::InvalidArguments(format!(
                "store for prefix {} is already open",
                self.config.prefix
            )));
        }

        info!(
            "Opening context store at {} via {}",
            self.config.prefix,
            self.remote.client().backend_name()
        );

        if let Some(lock) = &self.lock {
            lock.lock().await.acquire().await?;
        }

        if let Err(e) = try_join(self.probe_test(), self.scratch_test()).await {
            warn!("Self-test failed: {}", e);
            if let Some(lock) = &self.lock {
                if let Err(release) = lock.lock().await.release().await {
                    warn!("Failed to release lock after aborted open: {}", release);
                }
            }
            self.cache.clear().await;
            return Err(e);
        }

        self.open.store(true, Ordering::Release);
        debug!("Context store {} is open", self.config.prefix);
        Ok(())
    }

    /// Remove the probe key, release the lock and drop the cache.
    ///
    /// Every step runs even if an earlier one fails; failures come back
    /// together as `Shutdown`.
    pub async fn close(&self) -> ContextResult<()> {
        let _guard = self.lifecycle.lock().await;
        if !self.open.swap(false, Ordering::AcqRel) {
            self.cache.clear().await;
            return Ok(());
        }

        let mut failures = Vec::new();
        let probe = keys::probe_path(&self.config.prefix);
        if let Err(e) = self.remote.delete(&probe, false).await {
            failures.push(format!("deleting {}: {}", probe, e));
        }

        if let Some(lock) = &self.lock {
            match lock.lock().await.release().await {
                Ok(()) => {}
                Err(ContextError::Shutdown(inner)) => failures.extend(inner),
                Err(e) => failures.push(e.to_string()),
            }
        }

        self.cache.clear().await;

        if failures.is_empty() {
            info!("Closed context store {}", self.config.prefix);
            Ok(())
        } else {
            for failure in &failures {
                warn!("Close: {}", failure);
            }
            Err(ContextError::Shutdown(failures))
        }
    }

    /// Read one key or a batch of keys from `scope`
    pub async fn get(&self, scope: &str, key: impl Into<KeySpec>) -> ContextResult<Fetched> {
        self.ensure_open()?;
        keys::validate_scope(scope)?;

        match key.into() {
            KeySpec::One(key) => {
                keys::validate_key(&key)?;
                let path = keys::encode(&self.config.prefix, scope, &key);
                let resolved = self.resolve(path).await?;
                Ok(Fetched::One(self.settle(resolved).await))
            }
            KeySpec::Many(names) => {
                if names.is_empty() {
                    return Err(ContextError::InvalidKey("key list is empty".to_string()));
                }
                let paths = names
                    .iter()
                    .map(|key| {
                        keys::validate_key(key)?;
                        Ok(keys::encode(&self.config.prefix, scope, key))
                    })
                    .collect::<ContextResult<Vec<_>>>()?;

                // Nothing from the batch reaches the cache unless every read succeeded
                let resolved = try_join_all(paths.into_iter().map(|path| self.resolve(path))).await?;
                let mut values = Vec::with_capacity(resolved.len());
                for item in resolved {
                    values.push(self.settle(item).await);
                }
                Ok(Fetched::Many(values))
            }
        }
    }

    /// Single-key read
    pub async fn get_one(&self, scope: &str, key: &str) -> ContextResult<Option<Value>> {
        Ok(self.get(scope, key).await?.into_one())
    }

    /// Write one or more keys in `scope`; a `None` value deletes its key
    pub async fn set(
        &self,
        scope: &str,
        key: impl Into<KeySpec>,
        value: impl Into<ValueSpec>,
    ) -> ContextResult<()> {
        self.ensure_open()?;
        keys::validate_scope(scope)?;
        let writes = shape::plan_writes(key.into(), value.into())?;
        debug!("set {} key(s) in scope {}", writes.len(), scope);

        try_join_all(writes.into_iter().map(|write| self.apply(scope, write))).await?;
        Ok(())
    }

    /// Single-key write
    pub async fn set_one(&self, scope: &str, key: &str, value: Value) -> ContextResult<()> {
        self.set(scope, key, value).await
    }

    /// Every key stored in `scope`, relative to the scope
    pub async fn keys(&self, scope: &str) -> ContextResult<Vec<String>> {
        self.ensure_open()?;
        keys::validate_scope(scope)?;

        let prefix = &self.config.prefix;
        let root = keys::scope_root(prefix, scope);
        let paths = self.remote.list_keys(&root).await?;

        let mut found = Vec::with_capacity(paths.len());
        for path in &paths {
            let key = keys::decode(prefix, scope, path)?;
            if !key.is_empty() {
                found.push(key.to_string());
            }
        }
        Ok(found)
    }

    /// Drop the whole subtree of `scope`, remotely and from the cache
    pub async fn delete(&self, scope: &str) -> ContextResult<()> {
        self.ensure_open()?;
        keys::validate_scope(scope)?;

        let root = keys::scope_root(&self.config.prefix, scope);
        let result = self.remote.delete(&root, true).await;
        let pruned = self.cache.forget_subtree(&root).await;
        debug!("Deleted scope {} ({} cached entries dropped)", scope, pruned);
        result
    }

    /// Delete every scope that belongs to none of `active_nodes`.
    ///
    /// `global`, the bookkeeping keys and any `<node>` or `<node>:<flow>`
    /// scope of an active node survive. Deletes run concurrently; the first
    /// failure is returned once all of them have settled.
    pub async fn clean<I, S>(&self, active_nodes: I) -> ContextResult<SweepReport>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.ensure_open()?;
        let prefix = &self.config.prefix;
        let policy = SweepPolicy::new(prefix, active_nodes);

        let cache_pruned = self.cache.retain(|path| policy.retains(path)).await;
        let paths = self.remote.list_keys(&format!("{}/", prefix)).await?;
        let (retained, doomed) = policy.partition(paths);

        let outcomes = join_all(doomed.iter().map(|path| self.remote.delete(path, false))).await;

        let mut first_failure = None;
        for (path, outcome) in doomed.iter().zip(outcomes) {
            if let Err(e) = outcome {
                warn!("Sweep could not delete {}: {}", path, e);
                first_failure.get_or_insert((path.clone(), e));
            }
        }
        if let Some((path, source)) = first_failure {
            return Err(ContextError::SweepFailed {
                path,
                source: Box::new(source),
            });
        }

        info!(
            "Swept {}: {} deleted, {} retained",
            prefix,
            doomed.len(),
            retained.len()
        );
        Ok(SweepReport {
            retained,
            deleted: doomed,
            cache_pruned,
        })
    }

    fn ensure_open(&self) -> ContextResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(ContextError::NotOpen)
        }
    }

    /// Look `path` up in the cache, falling back to the backing store
    async fn resolve(&self, path: String) -> ContextResult<Resolved> {
        let ticket = match self.cache.lookup(&path).await {
            Ok(Lookup::Hit(value)) => return Ok(Resolved::Cached(value)),
            Ok(Lookup::Miss(ticket)) => ticket,
            Err(e) => {
                warn!("{}; re-fetching", e);
                self.cache.forget(&path).await;
                self.cache.ticket().await
            }
        };

        let Some(bytes) = self.remote.get(&path).await? else {
            return Ok(Resolved::Missing);
        };
        let value = serde_json::from_slice(&bytes).map_err(|e| {
            ContextError::protocol("get", path.clone(), format!("stored value is not JSON: {}", e))
        })?;
        Ok(Resolved::Fetched {
            path,
            ticket,
            bytes,
            value,
        })
    }

    /// Commit a resolved read to the cache and hand back its value
    async fn settle(&self, resolved: Resolved) -> Option<Value> {
        match resolved {
            Resolved::Cached(value) => Some(value),
            Resolved::Missing => None,
            Resolved::Fetched {
                path,
                ticket,
                bytes,
                value,
            } => {
                self.cache.fill(&path, bytes, ticket).await;
                Some(value)
            }
        }
    }

    /// Apply one planned write, keeping the cache in step with the remote
    async fn apply(&self, scope: &str, write: PlannedWrite) -> ContextResult<()> {
        let path = keys::encode(&self.config.prefix, scope, &write.key);
        match write.bytes {
            Some(bytes) => match self.remote.put(&path, bytes.clone()).await {
                Ok(()) => {
                    self.cache.record(&path, bytes).await;
                    Ok(())
                }
                Err(e) => {
                    // The remote may or may not hold the new value now
                    self.cache.forget(&path).await;
                    Err(e)
                }
            },
            None => {
                let result = self.remote.delete(&path, false).await;
                self.cache.forget(&path).await;
                result
            }
        }
    }

    async fn probe_test(&self) -> ContextResult<()> {
        let path = keys::probe_path(&self.config.prefix);
        let expected = Value::from(PROBE_VALUE);

        self.remote
            .put(&path, expected.to_string().into_bytes())
            .await
            .map_err(failed("probe write"))?;
        let read = self.remote.get(&path).await.map_err(failed("probe read"))?;
        let value = read.and_then(|bytes| serde_json::from_slice::<Value>(&bytes).ok());
        if value.as_ref() != Some(&expected) {
            return Err(ContextError::SelfTest {
                step: "probe read",
                reason: format!("expected {}, read {:?}", expected, value),
            });
        }
        Ok(())
    }

    async fn scratch_test(&self) -> ContextResult<()> {
        let prefix = &self.config.prefix;
        let path = keys::scratch_path(prefix);
        let root = format!("{}/", prefix);

        self.remote
            .put(&path, b"true".to_vec())
            .await
            .map_err(failed("scratch write"))?;
        let read = self.remote.get(&path).await.map_err(failed("scratch read"))?;
        if read.as_deref() != Some(b"true".as_slice()) {
            return Err(ContextError::SelfTest {
                step: "scratch read",
                reason: format!("{} did not read back as true", path),
            });
        }

        let listed = self.remote.list_keys(&root).await.map_err(failed("scratch list"))?;
        if !listed.contains(&path) {
            return Err(ContextError::SelfTest {
                step: "scratch list",
                reason: format!("{} missing from listing of {}", path, root),
            });
        }

        self.remote
            .delete(&path, false)
            .await
            .map_err(failed("scratch delete"))?;
        let listed = self.remote.list_keys(&root).await.map_err(failed("scratch relist"))?;
        if listed.contains(&path) {
            return Err(ContextError::SelfTest {
                step: "scratch relist",
                reason: format!("{} still listed after delete", path),
            });
        }
        Ok(())
    }
}

fn failed(step: &'static str) -> impl FnOnce(ContextError) -> ContextError {
    move |e| ContextError::SelfTest {
        step,
        reason: e.to_string(),
    }
}
