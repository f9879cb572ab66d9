//! Startup check for the icon repository core.
//!
//! # Responsibility
//! - Load configuration and start logging the way a server process would.
//! - Initialize the content store, optionally (re)create the metadata
//!   schema, and print a short summary of what is stored.

use clap::Parser;
use iconrepo_core::{
    bootstrap_schema, core_version, init_logging, GitContentStore, RepoConfig, RetryPolicy,
    WriteCoordinator,
};
use log::warn;
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "iconrepo", version, about = "Icon repository startup check")]
struct Args {
    /// TOML config file; environment variables override its values.
    #[arg(short, long, env = "ICONREPO_CONFIG")]
    config: Option<PathBuf>,

    /// Drop and recreate every metadata table before probing.
    /// Deletes all stored metadata.
    #[arg(long)]
    reset_schema: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("iconrepo: {err}");
            let mut source = err.source();
            while let Some(cause) = source {
                eprintln!("  caused by: {cause}");
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), Box<dyn Error>> {
    let config = RepoConfig::load(args.config.as_deref())?;
    config.validate()?;

    if let Some(log_dir) = &config.log_dir {
        init_logging(&config.log_level, log_dir)?;
    }

    if args.reset_schema {
        bootstrap_schema(
            &config.database_path,
            config.busy_timeout(),
            RetryPolicy::default(),
        )?;
        warn!(
            "event=schema_reset module=cli status=ok database={}",
            config.database_path.display()
        );
    }

    let coordinator = WriteCoordinator::from_config(&config)?;
    let icons = coordinator.describe_all_icons()?;
    let head = coordinator.with_content_store(|store: &GitContentStore| store.head_commit())??;

    println!("iconrepo_core version={}", core_version());
    println!("content_store={}", config.content_store_location.display());
    println!("database={}", config.database_path.display());
    println!("icons={}", icons.len());
    println!("head={}", head.as_deref().unwrap_or("none"));
    Ok(())
}
