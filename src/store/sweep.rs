//! Cleanup sweep
//!
//! Decides which stored paths survive a `clean` pass. The same predicate
//! prunes the local cache and selects remote deletes, so the two cannot
//! disagree about what an orphaned scope is.

use crate::keys;
use serde::Serialize;
use std::collections::HashSet;

/// Retention rule for one sweep: the store prefix and the live node ids
#[derive(Debug, Clone)]
pub struct SweepPolicy {
    prefix: String,
    active: HashSet<String>,
}

impl SweepPolicy {
    pub fn new<I, S>(prefix: &str, active: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            prefix: prefix.to_string(),
            active: active
                .into_iter()
                .map(|id| id.as_ref().to_string())
                .filter(|id| !id.is_empty())
                .collect(),
        }
    }

    /// Whether `path` must survive the sweep
    pub fn retains(&self, path: &str) -> bool {
        if keys::is_reserved(&self.prefix, path) {
            return true;
        }
        let Some(scope) = keys::scope_of(&self.prefix, path) else {
            // Not under our prefix at all; never ours to delete
            return true;
        };
        scope == keys::GLOBAL_SCOPE || self.is_active_scope(scope)
    }

    /// A scope is live if it is a node id, or a `node:flow` scope of one
    fn is_active_scope(&self, scope: &str) -> bool {
        if self.active.contains(scope) {
            return true;
        }
        scope
            .split_once(':')
            .is_some_and(|(node, _)| self.active.contains(node))
    }

    /// Split listed paths into (retained, doomed), preserving order
    pub fn partition(&self, paths: Vec<String>) -> (Vec<String>, Vec<String>) {
        paths.into_iter().partition(|path| self.retains(path))
    }
}

/// Outcome of a completed sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Paths left in place
    pub retained: Vec<String>,
    /// Paths deleted from the backing store
    pub deleted: Vec<String>,
    /// Cache entries dropped before the remote pass
    pub cache_pruned: usize,
}
