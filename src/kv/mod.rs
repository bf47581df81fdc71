//! Backing KV service access
//!
//! - `client`: the `KvClient` trait every backend implements
//! - `consul`: Consul HTTP API backend
//! - `memory`: in-process backend with Consul semantics
//! - `remote`: facade that separates absence from failure

pub mod client;
pub mod consul;
pub mod memory;
mod remote;

pub use client::{KvClient, KvEntry, LockMode, SessionEntry, SessionRequest};
pub use consul::ConsulClient;
pub use memory::{KvOp, MemoryKv};
pub use remote::RemoteKv;
