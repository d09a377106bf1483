//! `add` command: publish a source package and link it into the current
//! project, backing up whatever is currently installed first.

use owo_colors::OwoColorize;

use crate::cli::{AddArgs, Cli};
use crate::error::{PlunkError, Result};
use crate::injector::{self, InjectOptions};
use crate::publisher::{self, PublishOptions};
use crate::store::Store;
use crate::tracker::{self, LinkEntry};

use super::{detect_package_manager, CommandContext};

pub async fn run(args: &AddArgs, cli: &Cli) -> Result<()> {
    let ctx = CommandContext::new(cli);
    let consumer_path = std::env::current_dir()?;
    let store = Store::new(ctx.config.store_dir());

    let publish_options = PublishOptions {
        allow_private: true,
        run_scripts: !args.no_scripts,
        force: false,
    };
    let outcome = publisher::publish(&store, &args.from, ctx.config.concurrency, publish_options).await?;

    if outcome.name != args.name {
        return Err(PlunkError::Other(format!(
            "package at {} publishes as '{}', not '{}'",
            args.from.display(),
            outcome.name,
            args.name
        )));
    }

    let entry = store
        .get_store_entry(&outcome.name, &outcome.version)
        .await
        .ok_or_else(|| PlunkError::not_found(format!("{}@{} missing from store after publish", outcome.name, outcome.version)))?;

    let pm = detect_package_manager(&consumer_path);
    let result = injector::inject(
        &entry,
        &consumer_path,
        pm,
        ctx.config.concurrency,
        InjectOptions { backup_existing: true },
    )
    .await?;

    tracker::add_link(
        &consumer_path,
        &outcome.name,
        LinkEntry {
            version: outcome.version.clone(),
            content_hash: outcome.content_hash.clone(),
            linked_at: chrono::Utc::now().to_rfc3339(),
            source_path: args.from.to_string_lossy().into_owned(),
            backup_exists: result.backed_up,
            package_manager: pm,
            build_id: None,
        },
    )
    .await?;

    tracker::register_consumer(
        &ctx.config.consumers_registry_path(),
        &ctx.config.consumers_registry_lock_path(),
        &outcome.name,
        &consumer_path,
    )
    .await?;

    if ctx.config.json_output {
        println!(
            "{}",
            serde_json::json!({
                "name": outcome.name,
                "version": outcome.version,
                "copied": result.copied,
                "removed": result.removed,
                "skipped": result.skipped,
                "binLinks": result.bin_links,
            })
        );
    } else if !ctx.config.quiet {
        println!(
            "{} linked {}@{} into {}",
            "+".green(),
            outcome.name.cyan(),
            outcome.version,
            consumer_path.display()
        );
    }

    Ok(())
}
