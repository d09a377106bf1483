//! `clean` command: prune registry rows with no live consumer and store
//! entries with no remaining reference.

use owo_colors::OwoColorize;

use crate::cli::Cli;
use crate::error::Result;
use crate::store::Store;
use crate::tracker;

use super::CommandContext;

pub async fn run(cli: &Cli) -> Result<()> {
    let ctx = CommandContext::new(cli);
    let registry_path = ctx.config.consumers_registry_path();
    let lock_path = ctx.config.consumers_registry_lock_path();

    let (removed_consumers, _) = tracker::clean_stale_consumers(&registry_path, &lock_path).await?;

    let store = Store::new(ctx.config.store_dir());
    let entries = store.list_store_entries().await?;
    let mut removed_entries = 0usize;

    for entry in entries {
        let consumers = tracker::get_consumers(&registry_path, &entry.name).await;
        if consumers.is_empty() {
            store.remove_store_entry(&entry.name, &entry.version).await?;
            removed_entries += 1;
        }
    }

    if ctx.config.json_output {
        println!(
            "{}",
            serde_json::json!({ "removedConsumers": removed_consumers, "removedEntries": removed_entries })
        );
    } else if !ctx.config.quiet {
        println!(
            "{} removed {} stale consumer reference(s) and {} unreferenced store entry(ies)",
            "~".yellow(),
            removed_consumers,
            removed_entries
        );
    }

    Ok(())
}
