//! Keys command - list keys in a scope

use crate::cli::args::{KeysArgs, OutputFormat};
use crate::error::ContextResult;
use crate::store::ContextStore;
use console::style;

/// Execute the keys command
pub async fn execute(args: KeysArgs, store: &ContextStore) -> ContextResult<()> {
    let keys = store.keys(&args.scope).await?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&keys)?),
        OutputFormat::Plain => {
            for key in &keys {
                println!("{}", key);
            }
        }
        OutputFormat::Table => {
            println!("{}", style(format!("Scope {}", args.scope)).bold().cyan());
            if keys.is_empty() {
                println!("  {}", style("no keys").dim());
            }
            for key in &keys {
                println!("  {}", key);
            }
        }
    }

    Ok(())
}
