//! Check command - run the connectivity self-tests

use crate::error::ContextResult;
use crate::store::ContextStore;
use console::{style, Emoji};

static CHECK: Emoji<'_, '_> = Emoji("✓ ", "[OK] ");

/// Execute the check command; the store has already been opened
pub async fn execute(store: &ContextStore) -> ContextResult<()> {
    let config = store.config();
    println!("{}", style("Consul Context Status").bold().cyan());
    println!();
    println!("  {} Prefix: {}", CHECK, config.prefix);
    println!("  {} Self-tests passed", CHECK);

    match store.lock_session().await {
        Some(session) => println!(
            "  {} Lock held on node {} (session {})",
            CHECK,
            session.node,
            style(&session.session_id).dim()
        ),
        None => println!("  {} Locking disabled", style("-").dim()),
    }

    let cache = if config.cache_enabled { "enabled" } else { "disabled" };
    println!("  {} Cache {}", style("-").dim(), cache);
    Ok(())
}
