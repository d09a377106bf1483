//! CLI argument parsing for plunk.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// plunk - a local, content-addressed package linker
#[derive(Parser, Debug)]
#[command(name = "plunk")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress human-readable narration
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit machine-readable JSON instead of prose
    #[arg(long, global = true)]
    pub json: bool,

    /// Report intended actions without performing them
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Bounded fan-out limit for concurrent file operations
    #[arg(long, global = true)]
    pub concurrency: Option<usize>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Publish a package into the local store
    Publish(PublishArgs),

    /// Link a published package into the current project
    Add(AddArgs),

    /// Unlink a package from the current project
    #[command(alias = "rm")]
    Remove(RemoveArgs),

    /// Republish a package and inject it into every registered consumer
    Push(PushArgs),

    /// Publish, inject, then watch the source tree for changes
    Dev(DevArgs),

    /// Refresh a linked package (or all of them) from the store
    Update(UpdateArgs),

    /// List linked packages, or every entry in the store
    #[command(alias = "ls")]
    List(ListArgs),

    /// Prune store entries and registry rows with no live consumer
    Clean,

    /// Undo the backup taken by the most recent `add`
    Restore(RestoreArgs),
}

#[derive(Args, Debug, Clone)]
pub struct PublishArgs {
    /// Directory of the package to publish (defaults to the current directory)
    #[arg(value_name = "PACKAGE_DIR")]
    pub package_dir: Option<PathBuf>,

    /// Always rewrite store files, even if the content hash is unchanged
    #[arg(short, long)]
    pub force: bool,

    /// Skip running prepack/postpack scripts
    #[arg(long)]
    pub no_scripts: bool,

    /// Publish a `private: true` package anyway
    #[arg(long)]
    pub private: bool,

    /// Publish every package under the directory, not just its root
    #[arg(short, long)]
    pub recursive: bool,
}

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    /// Package name to link
    pub name: String,

    /// Source package directory to publish and link from
    #[arg(long)]
    pub from: PathBuf,

    /// Skip prepack/postpack scripts during the implied publish
    #[arg(long)]
    pub no_scripts: bool,
}

#[derive(Args, Debug, Clone)]
pub struct RemoveArgs {
    /// Package name to unlink
    pub name: String,
}

#[derive(Args, Debug, Clone)]
pub struct PushArgs {
    /// Directory of the package to push (defaults to the current directory)
    #[arg(value_name = "PACKAGE_DIR")]
    pub package_dir: Option<PathBuf>,

    /// Keep running, re-pushing on every source change
    #[arg(short, long)]
    pub watch: bool,

    /// Shell command to run before each push while watching
    #[arg(long)]
    pub build: Option<String>,

    /// Debounce window in milliseconds while watching
    #[arg(long)]
    pub debounce: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct DevArgs {
    /// Directory of the package (defaults to the current directory)
    #[arg(value_name = "PACKAGE_DIR")]
    pub package_dir: Option<PathBuf>,

    /// Shell command to run before each push
    #[arg(long)]
    pub build: Option<String>,

    /// Skip prepack/postpack scripts
    #[arg(long)]
    pub no_scripts: bool,

    /// Don't run the build command before the initial push
    #[arg(long)]
    pub skip_build: bool,
}

#[derive(Args, Debug, Clone)]
pub struct UpdateArgs {
    /// Package to refresh from the store (all linked packages if omitted)
    pub name: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    /// List every entry in the store instead of this project's links
    #[arg(long)]
    pub store: bool,
}

#[derive(Args, Debug, Clone)]
pub struct RestoreArgs {
    /// Package whose pre-`add` backup should be restored
    pub name: String,
}
