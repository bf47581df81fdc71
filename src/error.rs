//! Error types for consul-context
//!
//! All modules use `ContextResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for context store operations
pub type ContextResult<T> = Result<T, ContextError>;

/// All errors that can occur in the context store
#[derive(Error, Debug)]
pub enum ContextError {
    // Configuration errors
    #[error("Invalid configuration: {reason}")]
    ConfigInvalid { reason: String },

    #[error("Configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    // Backing store errors
    #[error("Transport error during {op} on {path}: {reason}")]
    Transport {
        op: &'static str,
        path: String,
        reason: String,
    },

    #[error("Protocol error during {op} on {path}: {reason}")]
    Protocol {
        op: &'static str,
        path: String,
        reason: String,
    },

    #[error("Write rejected for {path}: acknowledgement was {ack}")]
    WriteRejected { path: String, ack: String },

    // Caller errors
    #[error("Value for key {key} is {size} bytes, exceeds limit of {limit} bytes")]
    ValueTooLarge {
        key: String,
        size: usize,
        limit: usize,
    },

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Malformed path {path}: expected prefix {expected}")]
    MalformedPath { path: String, expected: String },

    #[error("Context store is not open")]
    NotOpen,

    // Lock errors
    #[error("Lock session unavailable: {0}")]
    LockUnavailable(String),

    #[error("Lock {key} is held by another session")]
    LockContested { key: String },

    // Cache errors
    #[error("Cached value for {path} is corrupt: {source}")]
    CacheCorrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    // Lifecycle errors
    #[error("Connectivity self-test failed at {step}: {reason}")]
    SelfTest { step: &'static str, reason: String },

    #[error("Sweep failed deleting {path}: {source}")]
    SweepFailed {
        path: String,
        #[source]
        source: Box<ContextError>,
    },

    #[error("Shutdown incomplete: {}", .0.join("; "))]
    Shutdown(Vec<String>),

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ContextError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a configuration error
    pub fn config(reason: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            reason: reason.into(),
        }
    }

    /// Create a transport error for a remote operation
    pub fn transport(op: &'static str, path: impl Into<String>, reason: impl ToString) -> Self {
        Self::Transport {
            op,
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a protocol error for a remote operation
    pub fn protocol(op: &'static str, path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Protocol {
            op,
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Check if the failure came from the network rather than from the data
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::SweepFailed { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::ConfigNotFound(_) => Some("Pass --config or create the default config file"),
            Self::ConfigInvalid { .. } => Some("Run: consul-context config show"),
            Self::Transport { .. } => Some("Check that the Consul agent is reachable"),
            Self::WriteRejected { .. } => Some("Check the ACL token has write access to the prefix"),
            Self::LockContested { .. } => {
                Some("Another instance owns this prefix; stop it or use a different prefix")
            }
            Self::LockUnavailable(_) => Some("Check that locknode names a registered Consul node"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ContextError::transport("get", "ctx/flow/a", "connection refused");
        assert_eq!(
            err.to_string(),
            "Transport error during get on ctx/flow/a: connection refused"
        );
    }

    #[test]
    fn error_hint() {
        let err = ContextError::LockContested {
            key: "ctx/_consulContextLock".to_string(),
        };
        assert!(err.hint().unwrap().contains("Another instance"));
        assert_eq!(ContextError::NotOpen.hint(), None);
    }

    #[test]
    fn error_transient() {
        assert!(ContextError::transport("put", "p", "timeout").is_transient());
        assert!(!ContextError::NotOpen.is_transient());

        let sweep = ContextError::SweepFailed {
            path: "ctx/old/a".to_string(),
            source: Box::new(ContextError::transport("delete", "ctx/old/a", "reset")),
        };
        assert!(sweep.is_transient());
    }

    #[test]
    fn shutdown_joins_failures() {
        let err = ContextError::Shutdown(vec!["probe: down".to_string(), "lock: gone".to_string()]);
        assert_eq!(err.to_string(), "Shutdown incomplete: probe: down; lock: gone");
    }
}
