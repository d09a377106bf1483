//! `remove` command: unlink a package from the current project.

use owo_colors::OwoColorize;

use crate::cli::{Cli, RemoveArgs};
use crate::error::{PlunkError, Result};
use crate::injector;
use crate::tracker;

use super::CommandContext;

pub async fn run(args: &RemoveArgs, cli: &Cli) -> Result<()> {
    let ctx = CommandContext::new(cli);
    let consumer_path = std::env::current_dir()?;

    let link = tracker::get_link(&consumer_path, &args.name)
        .await
        .ok_or_else(|| PlunkError::not_found(format!("no link for '{}' in {}", args.name, consumer_path.display())))?;

    injector::remove_injected(&consumer_path, &args.name, link.package_manager).await?;
    tracker::remove_link(&consumer_path, &args.name).await?;
    tracker::unregister_consumer(
        &ctx.config.consumers_registry_path(),
        &ctx.config.consumers_registry_lock_path(),
        &args.name,
        &consumer_path,
    )
    .await?;

    if ctx.config.json_output {
        println!("{}", serde_json::json!({ "name": args.name, "removed": true }));
    } else if !ctx.config.quiet {
        println!("{} unlinked {}", "-".red(), args.name.cyan());
    }

    Ok(())
}
