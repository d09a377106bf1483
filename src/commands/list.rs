//! `list` command: show this project's links, or every store entry.

use owo_colors::OwoColorize;

use crate::cli::{Cli, ListArgs};
use crate::error::Result;
use crate::store::Store;
use crate::tracker;

use super::CommandContext;

pub async fn run(args: &ListArgs, cli: &Cli) -> Result<()> {
    let ctx = CommandContext::new(cli);
    let store = Store::new(ctx.config.store_dir());

    if args.store {
        let entries = store.list_store_entries().await?;
        if ctx.config.json_output {
            let rows: Vec<_> = entries
                .iter()
                .map(|e| serde_json::json!({ "name": e.name, "version": e.version, "publishedAt": e.meta.published_at }))
                .collect();
            println!("{}", serde_json::Value::Array(rows));
            return Ok(());
        }
        if entries.is_empty() {
            println!("{}", "store is empty".yellow());
            return Ok(());
        }
        for entry in entries {
            println!("{}@{}  {}", entry.name.cyan(), entry.version, entry.meta.published_at.dimmed());
        }
        return Ok(());
    }

    let consumer_path = std::env::current_dir()?;
    let state = tracker::read_consumer_state(&consumer_path).await;

    if ctx.config.json_output {
        let mut rows = serde_json::Map::new();
        for (name, link) in &state.links {
            let current = store.find_store_entry(name).await;
            let stale = current.as_ref().is_none_or(|e| e.meta.content_hash != link.content_hash);
            rows.insert(
                name.clone(),
                serde_json::json!({ "version": link.version, "stale": stale }),
            );
        }
        println!("{}", serde_json::Value::Object(rows));
        return Ok(());
    }

    if state.links.is_empty() {
        println!("{}", "no linked packages in this project".yellow());
        return Ok(());
    }

    for (name, link) in &state.links {
        let current = store.find_store_entry(name).await;
        let stale = current.as_ref().is_none_or(|e| e.meta.content_hash != link.content_hash);
        let marker = if stale { "stale".yellow().to_string() } else { "up to date".green().to_string() };
        println!("{}@{}  {}", name.cyan(), link.version, marker);
    }

    Ok(())
}
