//! Delete command - drop a whole scope

use crate::cli::args::DeleteArgs;
use crate::error::ContextResult;
use crate::store::ContextStore;
use console::{style, Emoji};

static CHECK: Emoji<'_, '_> = Emoji("✓ ", "[OK] ");

/// Execute the delete command
pub async fn execute(args: DeleteArgs, store: &ContextStore) -> ContextResult<()> {
    store.delete(&args.scope).await?;
    println!("{}Deleted scope {}", CHECK, style(&args.scope).bold());
    Ok(())
}
