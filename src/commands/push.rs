//! `push` command: republish and fan out to every registered consumer,
//! optionally looping under a debounced watcher.

use std::time::Duration;

use owo_colors::OwoColorize;

use crate::cli::{Cli, PushArgs};
use crate::error::Result;
use crate::publisher::PublishOptions;
use crate::push::{self as push_engine, ConsumerPushResult, PushOutcome};
use crate::watch::{self, PushCycle, WatchOptions};

use super::{resolve_dir, CommandContext};

pub async fn run(args: &PushArgs, cli: &Cli) -> Result<()> {
    let ctx = CommandContext::new(cli);
    let package_dir = resolve_dir(args.package_dir.clone())?;
    let publish_options = PublishOptions::default();

    let outcome = run_once(&ctx, &package_dir, publish_options).await?;
    report(&ctx, &outcome);

    if !args.watch {
        return Ok(());
    }

    let config = ctx.config.clone();
    let package_dir_for_cycle = package_dir.clone();
    let on_cycle: PushCycle = Box::new(move || {
        let config = config.clone();
        let package_dir = package_dir_for_cycle.clone();
        Box::pin(async move {
            let outcome = push_engine::push(&config, &package_dir, publish_options).await?;
            tracing::info!(
                "push: {}@{} ({} consumer(s))",
                outcome.publish.name,
                outcome.publish.version,
                outcome.consumers.len()
            );
            Ok(())
        })
    });

    let watch_options = WatchOptions {
        build_command: args.build.clone(),
        debounce: args.debounce.map(Duration::from_millis).unwrap_or(Duration::from_millis(400)),
        ..WatchOptions::default()
    };

    watch::watch(&package_dir, watch_options, on_cycle).await
}

async fn run_once(
    ctx: &CommandContext,
    package_dir: &std::path::Path,
    options: PublishOptions,
) -> Result<PushOutcome> {
    push_engine::push(&ctx.config, package_dir, options).await
}

fn report(ctx: &CommandContext, outcome: &PushOutcome) {
    if ctx.config.json_output {
        println!(
            "{}",
            serde_json::json!({
                "name": outcome.publish.name,
                "version": outcome.publish.version,
                "skipped": outcome.publish.skipped,
                "consumers": outcome.consumers.len(),
            })
        );
        return;
    }

    if ctx.config.quiet {
        return;
    }

    if outcome.publish.skipped {
        println!("{} no changes to push", "=".dimmed());
        return;
    }

    println!(
        "{} pushed {}@{} to {} consumer(s)",
        "+".green(),
        outcome.publish.name.cyan(),
        outcome.publish.version,
        outcome.consumers.len()
    );
    for consumer in &outcome.consumers {
        match consumer {
            ConsumerPushResult::Injected { consumer_path, result } => {
                println!(
                    "  {} {} (copied={}, removed={}, skipped={})",
                    "✓".green(),
                    consumer_path.display(),
                    result.copied,
                    result.removed,
                    result.skipped
                );
            }
            ConsumerPushResult::Failed { consumer_path, error } => {
                println!("  {} {} — {}", "!".red(), consumer_path.display(), error);
            }
            ConsumerPushResult::Skipped { consumer_path } => {
                println!("  {} {} (no live link)", "·".dimmed(), consumer_path.display());
            }
        }
    }
}
