//! Clean command - sweep scopes of inactive nodes

use crate::cli::args::{CleanArgs, OutputFormat};
use crate::error::ContextResult;
use crate::store::ContextStore;
use console::{style, Emoji};

static CHECK: Emoji<'_, '_> = Emoji("✓ ", "[OK] ");

/// Execute the clean command
pub async fn execute(args: CleanArgs, store: &ContextStore) -> ContextResult<()> {
    let report = store.clean(&args.active).await?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Plain => {
            for path in &report.deleted {
                println!("{}", path);
            }
        }
        OutputFormat::Table => {
            for path in &report.deleted {
                println!("  {} {}", style("-").red(), path);
            }
            println!(
                "{}Removed {} key(s), kept {}",
                CHECK,
                style(report.deleted.len()).bold(),
                report.retained.len()
            );
        }
    }

    Ok(())
}
