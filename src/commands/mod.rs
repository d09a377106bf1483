//! Command implementations for plunk.

pub mod add;
pub mod clean;
pub mod dev;
pub mod list;
pub mod publish;
pub mod push;
pub mod remove;
pub mod restore;
pub mod update;

use std::path::{Path, PathBuf};

use crate::cli::Cli;
use crate::config::Config;
use crate::error::Result;
use crate::tracker::PackageManager;

/// Common context threaded through every command.
pub struct CommandContext {
    pub config: Config,
}

impl CommandContext {
    pub fn new(cli: &Cli) -> Self {
        let mut config = Config::load();
        config.verbose = config.verbose || cli.verbose;
        config.quiet = cli.quiet;
        config.json_output = cli.json;
        config.dry_run = cli.dry_run;
        if let Some(concurrency) = cli.concurrency {
            config.concurrency = concurrency;
        }
        Self { config }
    }
}

/// Resolve an optional CLI path argument against the current directory.
pub fn resolve_dir(path: Option<PathBuf>) -> Result<PathBuf> {
    match path {
        Some(p) => Ok(p),
        None => Ok(std::env::current_dir()?),
    }
}

/// Guess the consumer's package manager from lockfiles present at its root.
/// Falls back to npm when nothing recognizable is found.
pub fn detect_package_manager(consumer_path: &Path) -> PackageManager {
    if consumer_path.join("pnpm-lock.yaml").is_file() {
        PackageManager::Pnpm
    } else if consumer_path.join("yarn.lock").is_file() {
        PackageManager::Yarn
    } else if consumer_path.join("bun.lockb").is_file() {
        PackageManager::Bun
    } else {
        PackageManager::Npm
    }
}
