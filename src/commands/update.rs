//! `update` command: refresh a linked package (or all of them) from whatever
//! is currently in the store, without republishing.

use owo_colors::OwoColorize;

use crate::cli::{Cli, UpdateArgs};
use crate::error::{PlunkError, Result};
use crate::injector::{self, InjectOptions};
use crate::store::Store;
use crate::tracker::{self, LinkEntry};

use super::CommandContext;

pub async fn run(args: &UpdateArgs, cli: &Cli) -> Result<()> {
    let ctx = CommandContext::new(cli);
    let consumer_path = std::env::current_dir()?;
    let store = Store::new(ctx.config.store_dir());

    let state = tracker::read_consumer_state(&consumer_path).await;
    let names: Vec<String> = match &args.name {
        Some(name) => vec![name.clone()],
        None => state.links.keys().cloned().collect(),
    };

    if names.is_empty() && !ctx.config.quiet {
        println!("{}", "no linked packages to update".yellow());
        return Ok(());
    }

    for name in names {
        let link = state
            .links
            .get(&name)
            .cloned()
            .ok_or_else(|| PlunkError::not_found(format!("no link for '{name}' in {}", consumer_path.display())))?;

        let entry = store
            .find_store_entry(&name)
            .await
            .ok_or_else(|| PlunkError::not_found(format!("no store entry for '{name}'")))?;

        let result = injector::inject(
            &entry,
            &consumer_path,
            link.package_manager,
            ctx.config.concurrency,
            InjectOptions::default(),
        )
        .await?;

        tracker::add_link(
            &consumer_path,
            &name,
            LinkEntry {
                version: entry.version.clone(),
                content_hash: entry.meta.content_hash.clone(),
                linked_at: chrono::Utc::now().to_rfc3339(),
                ..link
            },
        )
        .await?;

        if !ctx.config.quiet {
            println!(
                "{} updated {} to {} (copied={}, removed={}, skipped={})",
                "~".yellow(),
                name.cyan(),
                entry.version,
                result.copied,
                result.removed,
                result.skipped
            );
        }
    }

    Ok(())
}
