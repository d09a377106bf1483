//! `restore` command: undo the backup taken by the most recent `add`.

use owo_colors::OwoColorize;

use crate::cli::{Cli, RestoreArgs};
use crate::error::Result;
use crate::injector;
use crate::tracker;

use super::{detect_package_manager, CommandContext};

pub async fn run(args: &RestoreArgs, cli: &Cli) -> Result<()> {
    let ctx = CommandContext::new(cli);
    let consumer_path = std::env::current_dir()?;

    let pm = match tracker::get_link(&consumer_path, &args.name).await {
        Some(link) => link.package_manager,
        None => detect_package_manager(&consumer_path),
    };

    injector::restore_backup(&consumer_path, &args.name, pm).await?;

    if ctx.config.json_output {
        println!("{}", serde_json::json!({ "name": args.name, "restored": true }));
    } else if !ctx.config.quiet {
        println!("{} restored pre-link backup for {}", "~".yellow(), args.name.cyan());
    }

    Ok(())
}
