//! Integration tests for consul-context

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn consul_context() -> Command {
        let mut cmd = cargo_bin_cmd!("consul-context");
        cmd.env_remove("CONSUL_CONTEXT_CONFIG");
        cmd
    }

    fn config_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn help_displays() {
        consul_context()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("scoped context storage on Consul KV"));
    }

    #[test]
    fn version_displays() {
        consul_context()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("consul-context"));
    }

    #[test]
    fn config_path() {
        consul_context()
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show_masks_token() {
        let file = config_file("prefix = \"ctx\"\ntoken = \"very-secret\"\n");
        consul_context()
            .arg("--config")
            .arg(file.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("prefix = \"ctx\""))
            .stdout(predicate::str::contains("very-secret").not());
    }

    #[test]
    fn missing_config_file_is_reported() {
        consul_context()
            .args(["--config", "/nonexistent/consul-context.toml", "check"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Configuration file not found"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn missing_prefix_is_invalid() {
        let file = config_file("host = \"127.0.0.1\"\n");
        consul_context()
            .arg("--config")
            .arg(file.path())
            .arg("check")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"))
            .stderr(predicate::str::contains("prefix is required"));
    }

    #[test]
    fn unknown_option_is_rejected() {
        let file = config_file("prefix = \"ctx\"\nprefx = \"typo\"\n");
        consul_context()
            .arg("--config")
            .arg(file.path())
            .arg("check")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn lock_without_node_is_invalid() {
        let file = config_file("prefix = \"ctx\"\nlock = true\n");
        consul_context()
            .arg("--config")
            .arg(file.path())
            .args(["keys", "global"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("locknode is required"));
    }

    #[test]
    fn unreachable_agent_fails_self_test() {
        let file = config_file("prefix = \"ctx\"\nport = 1\ntimeout = 2000\n");
        consul_context()
            .arg("--config")
            .arg(file.path())
            .arg("check")
            .assert()
            .failure()
            .stderr(predicate::str::contains("self-test failed"));
    }

    #[test]
    fn set_rejects_invalid_json() {
        consul_context()
            .args(["set", "global", "count", "not-json"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("invalid JSON value"));
    }
}

mod store_tests {
    use consul_context::kv::{KvOp, MemoryKv};
    use consul_context::{ContextError, ContextStore, Fetched, StoreConfig, MAX_VALUE_BYTES};
    use serde_json::{json, Value};
    use std::sync::Arc;

    async fn open(kv: &Arc<MemoryKv>, config: StoreConfig) -> ContextStore {
        let store = ContextStore::new(config, kv.clone());
        store.open().await.unwrap();
        store
    }

    fn config() -> StoreConfig {
        StoreConfig::new("nodered/context").unwrap()
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let kv = Arc::new(MemoryKv::new());
        let store = open(&kv, config()).await;

        let value = json!({"list": [1, 2, 3], "nested": {"flag": true}});
        store.set("global", "state", value.clone()).await.unwrap();
        assert_eq!(store.get_one("global", "state").await.unwrap(), Some(value));

        store.set("global", "state", None::<Value>).await.unwrap();
        assert_eq!(store.get_one("global", "state").await.unwrap(), None);
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn extra_keys_become_deletes() {
        let kv = Arc::new(MemoryKv::new());
        let store = open(&kv, config()).await;

        store
            .set("flow1", ["x", "y", "z"], vec![json!(1), json!(2)])
            .await
            .unwrap();
        assert_eq!(
            store.get("flow1", ["x", "y", "z"]).await.unwrap(),
            Fetched::Many(vec![Some(json!(1)), Some(json!(2)), None])
        );
    }

    #[tokio::test]
    async fn value_list_for_one_key_uses_first() {
        let kv = Arc::new(MemoryKv::new());
        let store = open(&kv, config()).await;

        store
            .set("flow1", "x", vec![json!(10), json!(20), json!(30)])
            .await
            .unwrap();
        assert_eq!(store.get_one("flow1", "x").await.unwrap(), Some(json!(10)));
    }

    #[tokio::test]
    async fn keys_include_scoped_keys_named_like_bookkeeping() {
        let kv = Arc::new(MemoryKv::new());
        let store = open(&kv, config()).await;

        store.set("n1", ["a", "b"], vec![json!(1), json!(2)]).await.unwrap();
        kv.insert_raw("nodered/context/n1/_hello", "\"world\"").await;

        let mut keys = store.keys("n1").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["_hello", "a", "b"]);
        assert_eq!(store.get_one("n1", "_hello").await.unwrap(), Some(json!("world")));
    }

    #[tokio::test]
    async fn clean_removes_only_stale_scopes() {
        let kv = Arc::new(MemoryKv::new());
        let store = open(&kv, config().with_lock("agent-1")).await;

        store.set("activeA", "k", json!(1)).await.unwrap();
        store.set("staleB", "k", json!(2)).await.unwrap();
        store.set("global", "k", json!(3)).await.unwrap();

        let report = store.clean(["activeA"]).await.unwrap();
        assert_eq!(report.deleted, vec!["nodered/context/staleB/k"]);

        let remaining = kv.keys().await;
        assert!(remaining.contains(&"nodered/context/activeA/k".to_string()));
        assert!(remaining.contains(&"nodered/context/global/k".to_string()));
        assert!(remaining.contains(&"nodered/context/_hello".to_string()));
        assert!(remaining.contains(&"nodered/context/_consulContextLock".to_string()));
        assert!(!remaining.contains(&"nodered/context/staleB/k".to_string()));
    }

    #[tokio::test]
    async fn clean_removes_stale_keys_named_like_bookkeeping() {
        let kv = Arc::new(MemoryKv::new());
        let store = open(&kv, config().with_lock("agent-1")).await;

        store.set("staleB", "_consulContextLock", json!(1)).await.unwrap();
        store.set("staleB", "_hello", json!(2)).await.unwrap();

        let report = store.clean(["activeA"]).await.unwrap();
        assert_eq!(report.deleted.len(), 2);
        assert_eq!(
            kv.keys().await,
            vec!["nodered/context/_consulContextLock", "nodered/context/_hello"]
        );
    }

    #[tokio::test]
    async fn oversized_value_is_rejected_without_a_write() {
        let kv = Arc::new(MemoryKv::new());
        let store = open(&kv, config()).await;
        let before = kv.write_count().await;

        let value = Value::String("x".repeat(MAX_VALUE_BYTES - 1));
        let err = store.set("flow1", "big", value).await.unwrap_err();

        assert!(matches!(err, ContextError::ValueTooLarge { size: 512_001, .. }));
        assert_eq!(kv.write_count().await, before);
    }

    #[tokio::test]
    async fn value_at_the_limit_is_stored() {
        let kv = Arc::new(MemoryKv::new());
        let store = open(&kv, config()).await;

        let value = Value::String("x".repeat(MAX_VALUE_BYTES - 2));
        store.set("flow1", "big", value.clone()).await.unwrap();
        assert_eq!(store.get_one("flow1", "big").await.unwrap(), Some(value));
    }

    #[tokio::test]
    async fn two_locked_stores_cannot_both_open() {
        let kv = Arc::new(MemoryKv::new());
        let first = open(&kv, config().with_lock("agent-1")).await;
        let second = ContextStore::new(config().with_lock("agent-2"), kv.clone());

        assert!(matches!(
            second.open().await,
            Err(ContextError::LockContested { .. })
        ));
        assert!(matches!(
            second.get("global", "k").await,
            Err(ContextError::NotOpen)
        ));

        first.close().await.unwrap();
        second.open().await.unwrap();
        second.close().await.unwrap();
        assert_eq!(kv.session_count().await, 0);
    }

    #[tokio::test]
    async fn transport_failures_carry_context() {
        let kv = Arc::new(MemoryKv::new());
        let store = open(&kv, config()).await;
        kv.fail(KvOp::Get, "nodered/context/flow1/").await;

        let err = store.get_one("flow1", "a").await.unwrap_err();
        assert!(err.is_transient());
        assert!(err.to_string().contains("nodered/context/flow1/a"));
    }

    #[tokio::test]
    async fn shared_store_serves_concurrent_callers() {
        let kv = Arc::new(MemoryKv::new());
        let store = Arc::new(open(&kv, config()).await);

        let writers = (0..16).map(|i| {
            let store = store.clone();
            tokio::spawn(async move { store.set("flow1", format!("k{}", i), json!(i)).await })
        });
        for handle in writers {
            handle.await.unwrap().unwrap();
        }

        let keys: Vec<String> = (0..16).map(|i| format!("k{}", i)).collect();
        let values = store.get("flow1", keys).await.unwrap().into_many();
        assert_eq!(values, (0..16).map(|i| Some(json!(i))).collect::<Vec<_>>());
    }
}
