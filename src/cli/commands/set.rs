//! Set command - write or unset a key

use crate::cli::args::SetArgs;
use crate::error::ContextResult;
use crate::store::ContextStore;
use console::{style, Emoji};

static CHECK: Emoji<'_, '_> = Emoji("✓ ", "[OK] ");

/// Execute the set command
pub async fn execute(args: SetArgs, store: &ContextStore) -> ContextResult<()> {
    let value = if args.unset { None } else { args.value };
    let action = if value.is_some() { "Set" } else { "Unset" };

    store.set(&args.scope, args.key.as_str(), value).await?;
    println!(
        "{}{} {}",
        CHECK,
        action,
        style(format!("{}/{}", args.scope, args.key)).bold()
    );
    Ok(())
}
