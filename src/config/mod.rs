//! Configuration management for consul-context

pub mod schema;

pub use schema::{Config, Consistency, Endpoint, LockConfig, LogLevel, Settings, StoreConfig};

use crate::error::{ContextError, ContextResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("consul-context")
            .join("config.toml")
    }

    /// Load raw configuration; a missing file yields defaults
    pub async fn load(&self) -> ContextResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file {} not found, using defaults", self.config_path.display());
            return Ok(Config::default());
        }

        Self::load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(path: &Path) -> ContextResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| ContextError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| ContextError::ConfigInvalid {
            reason: format!("{}: {}", path.display(), e),
        })
    }

    /// Require the config file to exist
    pub fn ensure_exists(&self) -> ContextResult<()> {
        if self.config_path.exists() {
            Ok(())
        } else {
            Err(ContextError::ConfigNotFound(self.config_path.clone()))
        }
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
