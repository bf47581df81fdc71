//! Key path codec
//!
//! Maps `(prefix, scope, key)` triples onto flat storage paths and back.
//!
//! ```text
//! <prefix>/
//! ├── _hello                 # connectivity probe
//! ├── _consulContextLock     # session lock key
//! ├── global/<key>
//! └── <scope>/<key>          # flow or node scope
//! ```

use crate::error::{ContextError, ContextResult};

/// Leaf name of the connectivity probe
pub const PROBE_LEAF: &str = "_hello";

/// Leaf name of the session lock key
pub const LOCK_LEAF: &str = "_consulContextLock";

/// Leaf name of the throwaway key written during the open self-test
pub const SCRATCH_LEAF: &str = "_deleteme";

/// Scope shared by every flow and node
pub const GLOBAL_SCOPE: &str = "global";

/// Flatten a scoped key into its storage path
pub fn encode(prefix: &str, scope: &str, key: &str) -> String {
    format!("{}/{}/{}", prefix, scope, key)
}

/// Recover the key from a storage path under `prefix/scope/`
pub fn decode<'a>(prefix: &str, scope: &str, path: &'a str) -> ContextResult<&'a str> {
    let root = scope_root(prefix, scope);
    path.strip_prefix(root.as_str())
        .ok_or_else(|| ContextError::MalformedPath {
            path: path.to_string(),
            expected: root,
        })
}

/// Directory-style root of a scope, with trailing slash
pub fn scope_root(prefix: &str, scope: &str) -> String {
    format!("{}/{}/", prefix, scope)
}

/// Path of the connectivity probe
pub fn probe_path(prefix: &str) -> String {
    format!("{}/{}", prefix, PROBE_LEAF)
}

/// Path of the session lock key
pub fn lock_path(prefix: &str) -> String {
    format!("{}/{}", prefix, LOCK_LEAF)
}

/// Path of the self-test throwaway key
pub fn scratch_path(prefix: &str) -> String {
    format!("{}/{}", prefix, SCRATCH_LEAF)
}

/// Whether a path is store bookkeeping rather than user data
///
/// Only the probe and lock keys directly under the prefix count; a user key
/// that happens to end in the same leaf name is ordinary data.
pub fn is_reserved(prefix: &str, path: &str) -> bool {
    if path == prefix || path.strip_suffix('/') == Some(prefix) {
        return true;
    }
    path == probe_path(prefix) || path == lock_path(prefix)
}

/// The scope segment of a path under `prefix/`, if any
pub fn scope_of<'a>(prefix: &str, path: &'a str) -> Option<&'a str> {
    let rest = path.strip_prefix(prefix)?.strip_prefix('/')?;
    rest.split('/').next().filter(|s| !s.is_empty())
}

/// Reject scopes that cannot be stored under their own subtree
pub fn validate_scope(scope: &str) -> ContextResult<()> {
    if scope.is_empty() {
        return Err(ContextError::InvalidKey("scope is empty".to_string()));
    }
    if scope.contains('/') {
        return Err(ContextError::InvalidKey(format!(
            "scope '{}' must not contain '/'",
            scope
        )));
    }
    if matches!(scope, PROBE_LEAF | LOCK_LEAF | SCRATCH_LEAF) {
        return Err(ContextError::InvalidKey(format!(
            "scope '{}' is reserved",
            scope
        )));
    }
    Ok(())
}

/// Reject keys that would escape or alias their scope
pub fn validate_key(key: &str) -> ContextResult<()> {
    if key.is_empty() {
        return Err(ContextError::InvalidKey("key is empty".to_string()));
    }
    if key.starts_with('/') {
        return Err(ContextError::InvalidKey(format!(
            "key '{}' must not start with '/'",
            key
        )));
    }
    Ok(())
}
