//! consul-context - scoped context storage on Consul KV
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use consul_context::cli::{commands, Cli, Commands};
use consul_context::config::{Config, ConfigManager, LogLevel};
use consul_context::error::ContextResult;
use consul_context::kv::ConsulClient;
use consul_context::store::ContextStore;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> ContextResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => {
            let manager = ConfigManager::with_path(path.clone());
            manager.ensure_exists()?;
            manager
        }
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await?;

    init_logging(cli.verbose, &config);
    debug!("Using config {}", config_manager.path().display());

    let command = match cli.command {
        Commands::Config(args) => return commands::config(args, &config_manager, &config),
        other => other,
    };

    let settings = config.validate()?;
    let client = ConsulClient::new(&settings.endpoint, &settings.store)?;
    let store = ContextStore::new(settings.store, Arc::new(client));

    store.open().await?;
    let result = match command {
        Commands::Check => commands::check(&store).await,
        Commands::Get(args) => commands::get(args, &store).await,
        Commands::Set(args) => commands::set(args, &store).await,
        Commands::Keys(args) => commands::keys(args, &store).await,
        Commands::Delete(args) => commands::delete(args, &store).await,
        Commands::Clean(args) => commands::clean(args, &store).await,
        Commands::Config(_) => unreachable!("Config handled above"),
    };
    let closed = store.close().await;

    match (result, closed) {
        (Err(e), Err(close)) => {
            warn!("Close after failed command: {}", close);
            Err(e)
        }
        (Err(e), Ok(())) => Err(e),
        (Ok(()), closed) => closed,
    }
}

/// Initialize logging: 0 = warn, 1 = info, 2+ = debug; config flags raise the floor
fn init_logging(verbose: u8, config: &Config) {
    let directive = match (verbose, config.log_level()) {
        (_, LogLevel::Trace) => "consul_context=trace",
        (2.., _) | (_, LogLevel::Debug) => "consul_context=debug",
        (1, _) => "consul_context=info",
        _ => "consul_context=warn",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(directive))
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}
