//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// consul-context - scoped context storage on Consul KV
///
/// Reads, writes and sweeps flow and node context stored under a
/// Consul key prefix.
#[derive(Parser, Debug)]
#[command(name = "consul-context")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "CONSUL_CONTEXT_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Open and close the store, running the connectivity self-tests
    Check,

    /// Read one or more keys from a scope
    Get(GetArgs),

    /// Write a JSON value to a key
    Set(SetArgs),

    /// List keys stored in a scope
    Keys(KeysArgs),

    /// Delete every key in a scope
    Delete(DeleteArgs),

    /// Delete scopes that belong to no active node
    Clean(CleanArgs),

    /// Show configuration
    Config(ConfigArgs),
}

/// Arguments for the get command
#[derive(Parser, Debug)]
pub struct GetArgs {
    /// Scope to read from (global, a node id, or node:flow)
    pub scope: String,

    /// Keys to read
    #[arg(required = true)]
    pub keys: Vec<String>,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the set command
#[derive(Parser, Debug)]
pub struct SetArgs {
    /// Scope to write to
    pub scope: String,

    /// Key to write
    pub key: String,

    /// JSON value; omit with --unset to delete the key
    #[arg(required_unless_present = "unset", value_parser = parse_json)]
    pub value: Option<serde_json::Value>,

    /// Delete the key instead of writing it
    #[arg(long, conflicts_with = "value")]
    pub unset: bool,
}

/// Arguments for the keys command
#[derive(Parser, Debug)]
pub struct KeysArgs {
    /// Scope to list
    pub scope: String,

    /// Output format
    #[arg(short, long, default_value = "plain")]
    pub format: OutputFormat,
}

/// Arguments for the delete command
#[derive(Parser, Debug)]
pub struct DeleteArgs {
    /// Scope to delete
    pub scope: String,
}

/// Arguments for the clean command
#[derive(Parser, Debug)]
pub struct CleanArgs {
    /// Active node ids (comma-separated or repeated)
    #[arg(short, long, value_delimiter = ',')]
    pub active: Vec<String>,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,
}

/// Output format for commands that print data
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}

/// Parse a JSON value argument
fn parse_json(s: &str) -> Result<serde_json::Value, String> {
    serde_json::from_str(s).map_err(|e| format!("invalid JSON value '{s}': {e}"))
}
