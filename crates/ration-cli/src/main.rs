//! # ration CLI entry point
//!
//! Parses command-line arguments and dispatches to subcommand handlers.

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ration_cli::check::run_check;
use ration_cli::cycle::{run_cycle, CycleArgs};
use ration_cli::reconcile::{run_reconcile, ReconcileArgs};
use ration_cli::shop::{run_shop, ShopArgs};
use ration_cli::{database_url, run_migrate};

/// Ration verification operator CLI.
///
/// Schema migrations, shop and cycle administration, reconciliation scans
/// and configuration checks against the verification datastore.
#[derive(Parser, Debug)]
#[command(name = "ration", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// PostgreSQL URL; defaults to DATABASE_URL.
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply the embedded schema migrations.
    Migrate,

    /// Ration shop administration.
    Shop(ShopArgs),

    /// Distribution cycle administration.
    Cycle(CycleArgs),

    /// Scan a cycle for duplicate signals that were never persisted.
    Reconcile(ReconcileArgs),

    /// Validate the server's environment settings and print them.
    Check,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> Result<u8> {
    if let Commands::Check = cli.command {
        return run_check();
    }

    let url = database_url(cli.database_url.as_deref())?;
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        match &cli.command {
            Commands::Migrate => run_migrate(&url).await,
            Commands::Shop(args) => run_shop(args, &url).await,
            Commands::Cycle(args) => run_cycle(args, &url).await,
            Commands::Reconcile(args) => run_reconcile(args, &url).await,
            Commands::Check => run_check(),
        }
    })
}
