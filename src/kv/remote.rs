//! Normalizing facade over a `KvClient`
//!
//! Absence is an ordinary outcome here: reads of missing keys yield `None`
//! and listings of empty prefixes yield an empty list. Only transport and
//! protocol failures, and writes the service did not affirm, become errors.

use crate::error::{ContextError, ContextResult};
use crate::kv::client::{KvClient, LockMode};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, trace};

/// Thin async wrapper that enforces acknowledgement and payload rules
#[derive(Clone)]
pub struct RemoteKv {
    client: Arc<dyn KvClient>,
}

impl RemoteKv {
    pub fn new(client: Arc<dyn KvClient>) -> Self {
        Self { client }
    }

    /// The wrapped client
    pub fn client(&self) -> &Arc<dyn KvClient> {
        &self.client
    }

    /// Read the raw bytes stored at `path`
    pub async fn get(&self, path: &str) -> ContextResult<Option<Vec<u8>>> {
        let entry = self.client.get(path).await?;
        let value = entry.and_then(|e| e.value);
        trace!(
            "get {} -> {}",
            path,
            value.as_ref().map_or("absent".to_string(), |v| format!("{} bytes", v.len()))
        );
        Ok(value)
    }

    /// Write `bytes` at `path`
    pub async fn put(&self, path: &str, bytes: Vec<u8>) -> ContextResult<()> {
        self.put_with(path, bytes, &LockMode::None).await
    }

    /// Write `bytes` at `path` with a lock qualifier
    pub async fn put_with(&self, path: &str, bytes: Vec<u8>, mode: &LockMode) -> ContextResult<()> {
        trace!("put {} ({} bytes, {:?})", path, bytes.len(), mode);
        let ack = self.client.set(path, bytes, mode).await?;
        match ack {
            Value::Bool(true) => Ok(()),
            other => {
                debug!("put {} not acknowledged: {}", path, other);
                Err(ContextError::WriteRejected {
                    path: path.to_string(),
                    ack: describe_ack(&other),
                })
            }
        }
    }

    /// List every stored path starting with `prefix`
    pub async fn list_keys(&self, prefix: &str) -> ContextResult<Vec<String>> {
        let payload = match self.client.list_keys(prefix).await? {
            None | Some(Value::Null) => {
                trace!("list {} -> none", prefix);
                return Ok(vec![]);
            }
            Some(payload) => payload,
        };

        let Value::Array(items) = payload else {
            return Err(ContextError::protocol(
                "list_keys",
                prefix,
                format!("expected an array of keys, got {}", payload),
            ));
        };

        items
            .into_iter()
            .map(|item| match item {
                Value::String(key) => Ok(key),
                other => Err(ContextError::protocol(
                    "list_keys",
                    prefix,
                    format!("expected a string key, got {}", other),
                )),
            })
            .collect()
    }

    /// Delete `path`, or the whole subtree when `recursive`
    pub async fn delete(&self, path: &str, recursive: bool) -> ContextResult<()> {
        trace!("delete {} (recursive: {})", path, recursive);
        self.client.delete(path, recursive).await
    }
}

fn describe_ack(ack: &Value) -> String {
    match ack {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        other => format!("non-boolean {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::client::{KvEntry, SessionEntry, SessionRequest};
    use async_trait::async_trait;
    use serde_json::json;

    /// Client that answers every call with canned payloads
    struct Canned {
        ack: Value,
        keys: Option<Value>,
    }

    #[async_trait]
    impl KvClient for Canned {
        async fn get(&self, key: &str) -> ContextResult<Option<KvEntry>> {
            Ok(match key {
                "ctx/present" => Some(KvEntry {
                    key: key.to_string(),
                    value: Some(b"1".to_vec()),
                    session: None,
                }),
                "ctx/valueless" => Some(KvEntry {
                    key: key.to_string(),
                    value: None,
                    session: None,
                }),
                "ctx/broken" => return Err(ContextError::transport("get", key, "reset")),
                _ => None,
            })
        }

        async fn set(&self, _key: &str, _value: Vec<u8>, _mode: &LockMode) -> ContextResult<Value> {
            Ok(self.ack.clone())
        }

        async fn list_keys(&self, _prefix: &str) -> ContextResult<Option<Value>> {
            Ok(self.keys.clone())
        }

        async fn delete(&self, _key: &str, _recursive: bool) -> ContextResult<()> {
            Ok(())
        }

        async fn session_create(&self, _request: &SessionRequest) -> ContextResult<String> {
            Ok("s".to_string())
        }

        async fn session_info(&self, _id: &str) -> ContextResult<Option<SessionEntry>> {
            Ok(None)
        }

        async fn session_destroy(&self, _id: &str) -> ContextResult<bool> {
            Ok(true)
        }

        fn backend_name(&self) -> &'static str {
            "canned"
        }
    }

    fn remote(ack: Value, keys: Option<Value>) -> RemoteKv {
        RemoteKv::new(Arc::new(Canned { ack, keys }))
    }

    #[tokio::test]
    async fn get_distinguishes_absence_from_failure() {
        let kv = remote(json!(true), None);
        assert_eq!(kv.get("ctx/present").await.unwrap(), Some(b"1".to_vec()));
        assert_eq!(kv.get("ctx/missing").await.unwrap(), None);
        assert_eq!(kv.get("ctx/valueless").await.unwrap(), None);
        assert!(kv.get("ctx/broken").await.unwrap_err().is_transient());
    }

    #[tokio::test]
    async fn put_accepts_only_true() {
        assert!(remote(json!(true), None).put("ctx/a", vec![]).await.is_ok());

        for ack in [json!(null), json!("true"), json!(1), json!(false)] {
            let err = remote(ack.clone(), None).put("ctx/a", vec![]).await.unwrap_err();
            assert!(
                matches!(err, ContextError::WriteRejected { ref path, .. } if path == "ctx/a"),
                "ack {} was not rejected",
                ack
            );
        }
    }

    #[tokio::test]
    async fn list_keys_normalizes_absence() {
        assert!(remote(json!(true), None).list_keys("ctx/").await.unwrap().is_empty());
        assert!(remote(json!(true), Some(Value::Null)).list_keys("ctx/").await.unwrap().is_empty());

        let keys = remote(json!(true), Some(json!(["ctx/a", "ctx/b"])))
            .list_keys("ctx/")
            .await
            .unwrap();
        assert_eq!(keys, vec!["ctx/a", "ctx/b"]);
    }

    #[tokio::test]
    async fn list_keys_rejects_non_sequence() {
        let err = remote(json!(true), Some(json!({"ctx/a": 1})))
            .list_keys("ctx/")
            .await
            .unwrap_err();
        assert!(matches!(err, ContextError::Protocol { op: "list_keys", .. }));

        let err = remote(json!(true), Some(json!(["ctx/a", 2])))
            .list_keys("ctx/")
            .await
            .unwrap_err();
        assert!(matches!(err, ContextError::Protocol { .. }));
    }
}
