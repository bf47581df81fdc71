//! Configuration schema for consul-context
//!
//! Configuration is stored at `~/.config/consul-context/config.toml`.
//! Option names match the context-storage settings block of the host:
//!
//! ```toml
//! host = "consul"
//! port = 8500
//! prefix = "dev"
//! consistent = true
//! lock = true
//! locknode = "worker-1"
//! lockttl = "30s"
//! ```

use crate::error::{ContextError, ContextResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Consul rejects session TTLs outside this range
const MIN_LOCK_TTL: Duration = Duration::from_secs(10);
const MAX_LOCK_TTL: Duration = Duration::from_secs(86_400);

/// Raw configuration as written by the operator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Consul agent host
    pub host: String,

    /// Consul HTTP port
    pub port: u16,

    /// Use HTTPS
    pub secure: bool,

    /// Extra trusted CA certificates (PEM files)
    pub ca: Vec<PathBuf>,

    /// ACL token sent with every call
    pub token: Option<String>,

    /// API timeout in milliseconds
    pub timeout: Option<u64>,

    /// Datacenter sent with every call
    pub datacenter: Option<String>,

    /// Root of every stored key (required)
    pub prefix: Option<String>,

    /// Strong (true) or default (false) read consistency
    pub consistent: bool,

    /// Keep a local read cache
    pub cache: bool,

    /// Hold a session lock on the prefix while open
    pub lock: bool,

    /// Session TTL, e.g. "30s"
    pub lockttl: Option<String>,

    /// Session lock-delay, e.g. "15s"
    pub lockdelay: Option<String>,

    /// Consul node the lock session is bound to
    pub locknode: Option<String>,

    /// Debug logging
    pub debug: bool,

    /// Trace logging
    pub debugmore: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8500,
            secure: false,
            ca: vec![],
            token: None,
            timeout: None,
            datacenter: None,
            prefix: None,
            consistent: true,
            cache: true,
            lock: false,
            lockttl: None,
            lockdelay: None,
            locknode: None,
            debug: false,
            debugmore: false,
        }
    }
}

/// Read consistency requested from the backing store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consistency {
    Eventual,
    Strong,
}

/// Distributed lock settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockConfig {
    pub node: String,
    pub ttl: Option<Duration>,
    pub delay: Option<Duration>,
}

/// Validated store settings; immutable once built
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub prefix: String,
    pub datacenter: Option<String>,
    pub token: Option<String>,
    pub consistency: Consistency,
    pub timeout: Option<Duration>,
    pub lock: Option<LockConfig>,
    pub cache_enabled: bool,
}

impl StoreConfig {
    /// Minimal settings for a prefix: strong reads, cache on, no lock
    pub fn new(prefix: impl Into<String>) -> ContextResult<Self> {
        let prefix = prefix.into();
        validate_prefix(&prefix)?;
        Ok(Self {
            prefix,
            datacenter: None,
            token: None,
            consistency: Consistency::Strong,
            timeout: None,
            lock: None,
            cache_enabled: true,
        })
    }

    /// Enable the session lock bound to `node`
    pub fn with_lock(mut self, node: impl Into<String>) -> Self {
        self.lock = Some(LockConfig {
            node: node.into(),
            ttl: None,
            delay: None,
        });
        self
    }

    /// Turn the local cache on or off
    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }
}

/// Where the Consul agent lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub secure: bool,
    pub ca: Vec<PathBuf>,
}

impl Endpoint {
    /// Base URL of the HTTP API
    pub fn base_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}

/// Log verbosity requested by the config file
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Default,
    Debug,
    Trace,
}

/// Everything the validating parse step produces
#[derive(Debug, Clone)]
pub struct Settings {
    pub store: StoreConfig,
    pub endpoint: Endpoint,
    pub log: LogLevel,
}

impl Config {
    /// Validate the raw options into immutable settings
    pub fn validate(&self) -> ContextResult<Settings> {
        let prefix = self
            .prefix
            .clone()
            .ok_or_else(|| ContextError::config("prefix is required"))?;
        validate_prefix(&prefix)?;

        if self.host.trim().is_empty() {
            return Err(ContextError::config("host must not be empty"));
        }
        if self.port == 0 {
            return Err(ContextError::config("port must be 1-65535"));
        }
        if self.timeout == Some(0) {
            return Err(ContextError::config("timeout must be greater than 0 ms"));
        }

        let lock = if self.lock {
            let node = self
                .locknode
                .clone()
                .filter(|n| !n.trim().is_empty())
                .ok_or_else(|| ContextError::config("locknode is required when lock = true"))?;

            let ttl = self
                .lockttl
                .as_deref()
                .map(|s| parse_duration(s).map_err(|e| ContextError::config(format!("lockttl: {}", e))))
                .transpose()?;
            if let Some(ttl) = ttl {
                if !(MIN_LOCK_TTL..=MAX_LOCK_TTL).contains(&ttl) {
                    return Err(ContextError::config(format!(
                        "lockttl must be between 10s and 86400s, got {:?}",
                        ttl
                    )));
                }
            }

            let delay = self
                .lockdelay
                .as_deref()
                .map(|s| parse_duration(s).map_err(|e| ContextError::config(format!("lockdelay: {}", e))))
                .transpose()?;

            Some(LockConfig { node, ttl, delay })
        } else {
            None
        };

        Ok(Settings {
            store: StoreConfig {
                prefix,
                datacenter: self.datacenter.clone(),
                token: self.token.clone(),
                consistency: if self.consistent {
                    Consistency::Strong
                } else {
                    Consistency::Eventual
                },
                timeout: self.timeout.map(Duration::from_millis),
                lock,
                cache_enabled: self.cache,
            },
            endpoint: Endpoint {
                host: self.host.clone(),
                port: self.port,
                secure: self.secure,
                ca: self.ca.clone(),
            },
            log: self.log_level(),
        })
    }

    /// Verbosity floor set by `debug` / `debugmore`
    pub fn log_level(&self) -> LogLevel {
        if self.debugmore {
            LogLevel::Trace
        } else if self.debug {
            LogLevel::Debug
        } else {
            LogLevel::Default
        }
    }
}

fn validate_prefix(prefix: &str) -> ContextResult<()> {
    if prefix.trim().is_empty() {
        return Err(ContextError::config("prefix must not be empty"));
    }
    if prefix.starts_with('/') || prefix.ends_with('/') {
        return Err(ContextError::config(format!(
            "prefix '{}' must not start or end with '/'",
            prefix
        )));
    }
    if prefix.split('/').any(str::is_empty) {
        return Err(ContextError::config(format!(
            "prefix '{}' contains an empty segment",
            prefix
        )));
    }
    Ok(())
}

/// Parse a Consul duration string such as `"15s"`, `"500ms"` or `"1h30m"`.
///
/// Go-style fractional values with a single unit (`"1.5s"`) are accepted too;
/// everything else goes through `humantime`.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.contains('.') {
        return parse_fractional(s);
    }
    humantime::parse_duration(s).map_err(|e| format!("'{}': {}", input, e))
}

fn parse_fractional(s: &str) -> Result<Duration, String> {
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .ok_or_else(|| format!("missing unit in '{}'", s))?;
    let (number, unit) = s.split_at(split);
    let value: f64 = number
        .parse()
        .map_err(|_| format!("invalid number in '{}'", s))?;
    let secs_per_unit = match unit {
        "ms" => 1e-3,
        "s" => 1.0,
        "m" => 60.0,
        "h" => 3600.0,
        other => return Err(format!("unknown unit '{}' in '{}'", other, s)),
    };
    Duration::try_from_secs_f64(value * secs_per_unit).map_err(|e| format!("'{}': {}", s, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_prefix() -> Config {
        Config {
            prefix: Some("dev".to_string()),
            ..Config::default()
        }
    }

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("host = \"127.0.0.1\""));
        assert!(toml.contains("port = 8500"));
    }

    #[test]
    fn config_deserializes_partial() {
        let toml = r#"
            prefix = "dev"
            consistent = false
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.prefix.as_deref(), Some("dev"));
        assert!(!config.consistent);
        assert!(config.cache); // default preserved
    }

    #[test]
    fn config_rejects_unknown_option() {
        let result: Result<Config, _> = toml::from_str("prefix = \"dev\"\nprefx = \"typo\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn validate_defaults() {
        let settings = with_prefix().validate().unwrap();
        assert_eq!(settings.store.prefix, "dev");
        assert_eq!(settings.store.consistency, Consistency::Strong);
        assert!(settings.store.cache_enabled);
        assert!(settings.store.lock.is_none());
        assert_eq!(settings.endpoint.base_url(), "http://127.0.0.1:8500");
        assert_eq!(settings.log, LogLevel::Default);
    }

    #[test]
    fn validate_requires_prefix() {
        let err = Config::default().validate().unwrap_err();
        assert!(err.to_string().contains("prefix is required"));
    }

    #[test]
    fn validate_rejects_bad_prefix() {
        for bad in ["", "/dev", "dev/", "a//b"] {
            let config = Config {
                prefix: Some(bad.to_string()),
                ..Config::default()
            };
            assert!(config.validate().is_err(), "prefix {:?} accepted", bad);
        }
    }

    #[test]
    fn validate_lock_requires_node() {
        let config = Config {
            lock: true,
            ..with_prefix()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("locknode"));
    }

    #[test]
    fn validate_lock_durations() {
        let config = Config {
            lock: true,
            locknode: Some("worker-1".to_string()),
            lockttl: Some("30s".to_string()),
            lockdelay: Some("1m30s".to_string()),
            ..with_prefix()
        };
        let lock = config.validate().unwrap().store.lock.unwrap();
        assert_eq!(lock.node, "worker-1");
        assert_eq!(lock.ttl, Some(Duration::from_secs(30)));
        assert_eq!(lock.delay, Some(Duration::from_secs(90)));
    }

    #[test]
    fn validate_lock_ttl_range() {
        let config = Config {
            lock: true,
            locknode: Some("worker-1".to_string()),
            lockttl: Some("5s".to_string()),
            ..with_prefix()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_log_level() {
        let config = Config {
            debug: true,
            debugmore: true,
            ..with_prefix()
        };
        assert_eq!(config.validate().unwrap().log, LogLevel::Trace);
    }

    #[test]
    fn parse_durations() {
        assert_eq!(parse_duration("15s").unwrap(), Duration::from_secs(15));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration("2h 5m").unwrap(), Duration::from_secs(7500));
        assert!(parse_duration("15").is_err());
        assert!(parse_duration("s").is_err());
        assert!(parse_duration("").is_err());
        assert!(parse_duration("1.5x").is_err());
        assert!(parse_duration("1.5s2m").is_err());
    }

    #[test]
    fn store_config_builder() {
        let config = StoreConfig::new("ctx").unwrap().with_lock("n1").with_cache(false);
        assert!(!config.cache_enabled);
        assert_eq!(config.lock.unwrap().node, "n1");
        assert!(StoreConfig::new("").is_err());
    }
}
