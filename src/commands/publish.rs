//! `publish` command: push a package's current files into the store.

use std::path::{Path, PathBuf};

use owo_colors::OwoColorize;
use walkdir::WalkDir;

use crate::cli::{Cli, PublishArgs};
use crate::error::Result;
use crate::publisher::{self, PublishOptions, PublishOutcome};
use crate::store::Store;

use super::{resolve_dir, CommandContext};

pub async fn run(args: &PublishArgs, cli: &Cli) -> Result<()> {
    let ctx = CommandContext::new(cli);
    let package_dir = resolve_dir(args.package_dir.clone())?;
    let store = Store::new(ctx.config.store_dir());

    let options = PublishOptions {
        allow_private: args.private,
        run_scripts: !args.no_scripts,
        force: args.force,
    };

    let targets = if args.recursive {
        find_nested_packages(&package_dir)
    } else {
        vec![package_dir.clone()]
    };

    if ctx.config.dry_run {
        if !ctx.config.quiet {
            for target in &targets {
                println!("(dry run) would publish {}", target.display());
            }
        }
        return Ok(());
    }

    let mut outcomes = Vec::with_capacity(targets.len());
    for target in &targets {
        let outcome = publisher::publish(&store, target, ctx.config.concurrency, options).await?;
        if !ctx.config.json_output {
            report(&ctx, &outcome);
        }
        outcomes.push(outcome);
    }

    if ctx.config.json_output {
        if args.recursive {
            println!("{}", serde_json::json!(outcomes.iter().map(outcome_json).collect::<Vec<_>>()));
        } else if let Some(outcome) = outcomes.first() {
            println!("{}", outcome_json(outcome));
        }
    }

    Ok(())
}

fn outcome_json(outcome: &PublishOutcome) -> serde_json::Value {
    serde_json::json!({
        "name": outcome.name,
        "version": outcome.version,
        "contentHash": outcome.content_hash,
        "skipped": outcome.skipped,
    })
}

fn report(ctx: &CommandContext, outcome: &PublishOutcome) {
    if ctx.config.quiet {
        return;
    }
    if outcome.skipped {
        println!("{} {}@{} unchanged, nothing to publish", "=".dimmed(), outcome.name, outcome.version);
    } else {
        println!("{} published {}@{}", "+".green(), outcome.name.cyan(), outcome.version);
    }
}

/// Every directory under `root` (root included) containing a `package.json`,
/// never descending into `node_modules` or `.git`.
fn find_nested_packages(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0 || !matches!(entry.file_name().to_str(), Some("node_modules" | ".git"))
        })
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_dir())
        .map(|entry| entry.into_path())
        .filter(|dir| dir.join("package.json").is_file())
        .collect()
}
