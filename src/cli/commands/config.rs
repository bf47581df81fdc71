//! Config command - show configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager};
use crate::error::{ContextError, ContextResult};

/// Execute the config command
pub fn execute(args: ConfigArgs, manager: &ConfigManager, config: &Config) -> ContextResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => show_config(config)?,
        Some(ConfigAction::Path) => show_path(manager),
    }
    Ok(())
}

fn show_config(config: &Config) -> ContextResult<()> {
    println!("{}", render(config)?);
    Ok(())
}

fn show_path(manager: &ConfigManager) {
    println!("{}", manager.path().display());
}

/// TOML rendering with the ACL token masked
fn render(config: &Config) -> ContextResult<String> {
    let mut shown = config.clone();
    if shown.token.is_some() {
        shown.token = Some("********".to_string());
    }
    toml::to_string_pretty(&shown)
        .map_err(|e| ContextError::Internal(format!("serializing config: {}", e)))
}
