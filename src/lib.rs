//! consul-context - scoped context storage on Consul KV
//!
//! Stores JSON context values for flows and nodes under a single key
//! prefix, with an optional local read cache, an optional session lock that
//! makes one process the owner of the prefix, and a sweep that reclaims
//! scopes of nodes that are gone.
//!
//! ```text
//! <prefix>/
//! ├── _hello                 # connectivity probe, present while open
//! ├── _consulContextLock     # session lock key
//! ├── global/<key>           # shared by everyone
//! └── <scope>/<key>          # a node, or a node:flow pair
//! ```

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod keys;
pub mod kv;
pub mod lock;
pub mod store;

pub use config::StoreConfig;
pub use error::{ContextError, ContextResult};
pub use store::{ContextStore, Fetched, KeySpec, SweepReport, ValueSpec, MAX_VALUE_BYTES};
