//! `dev` command: publish, inject, then watch the source tree for changes.

use crate::cli::{Cli, DevArgs};
use crate::error::Result;
use crate::publisher::PublishOptions;
use crate::push;
use crate::scripts;
use crate::watch::{self, PushCycle, WatchOptions};

use super::{resolve_dir, CommandContext};

pub async fn run(args: &DevArgs, cli: &Cli) -> Result<()> {
    let ctx = CommandContext::new(cli);
    let package_dir = resolve_dir(args.package_dir.clone())?;

    if !args.skip_build {
        if let Some(cmd) = &args.build {
            scripts::run_script(&package_dir, "build", cmd).await?;
        }
    }

    let publish_options = PublishOptions {
        run_scripts: !args.no_scripts,
        ..PublishOptions::default()
    };

    let initial = push::push(&ctx.config, &package_dir, publish_options).await?;
    if !ctx.config.quiet {
        tracing::info!(
            "dev: initial push of {}@{} to {} consumer(s)",
            initial.publish.name,
            initial.publish.version,
            initial.consumers.len()
        );
    }

    let config = ctx.config.clone();
    let package_dir_for_cycle = package_dir.clone();
    let on_cycle: PushCycle = Box::new(move || {
        let config = config.clone();
        let package_dir = package_dir_for_cycle.clone();
        Box::pin(async move {
            let outcome = push::push(&config, &package_dir, publish_options).await?;
            tracing::info!(
                "dev: pushed {}@{} to {} consumer(s)",
                outcome.publish.name,
                outcome.publish.version,
                outcome.consumers.len()
            );
            Ok(())
        })
    });

    let watch_options = WatchOptions { build_command: args.build.clone(), ..WatchOptions::default() };
    watch::watch(&package_dir, watch_options, on_cycle).await
}
