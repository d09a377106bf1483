//! plunk - a local, content-addressed package linker for JS-style package
//! ecosystems.
//!
//! This is the main entry point for the plunk binary.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use plunk::cli::{Cli, Commands};
use plunk::commands;
use plunk::error::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = cli.verbose || std::env::var("VERBOSE").is_ok_and(|v| v == "1" || v == "true");

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(if verbose { "plunk=debug" } else { "plunk=info" })
    });

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();

    let result = match &cli.command {
        Commands::Publish(args) => commands::publish::run(args, &cli).await,
        Commands::Add(args) => commands::add::run(args, &cli).await,
        Commands::Remove(args) => commands::remove::run(args, &cli).await,
        Commands::Push(args) => commands::push::run(args, &cli).await,
        Commands::Dev(args) => commands::dev::run(args, &cli).await,
        Commands::Update(args) => commands::update::run(args, &cli).await,
        Commands::List(args) => commands::list::run(args, &cli).await,
        Commands::Clean => commands::clean::run(&cli).await,
        Commands::Restore(args) => commands::restore::run(args, &cli).await,
    };

    if let Err(e) = &result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }

    Ok(())
}
