//! # Cycle Subcommand
//!
//! - `open`: open a new active distribution cycle.
//! - `close`: complete or cancel a cycle.
//! - `active`: print the active cycle.
//! - `list`: print all cycles, newest first.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Subcommand, ValueEnum};
use uuid::Uuid;

use ration_core::{CycleId, CycleStatus};
use ration_state::CycleWindow;

use crate::{connect_engine, print_json};

/// Arguments for the `ration cycle` subcommand.
#[derive(Args, Debug)]
pub struct CycleArgs {
    #[command(subcommand)]
    pub command: CycleCommand,
}

/// How a cycle ends.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseAs {
    Completed,
    Cancelled,
}

impl From<CloseAs> for CycleStatus {
    fn from(c: CloseAs) -> Self {
        match c {
            CloseAs::Completed => CycleStatus::Completed,
            CloseAs::Cancelled => CycleStatus::Cancelled,
        }
    }
}

/// Cycle subcommands.
#[derive(Subcommand, Debug)]
pub enum CycleCommand {
    /// Open a cycle. Fails while another is active.
    Open {
        /// Display name (e.g., "March 2026").
        #[arg(long)]
        name: String,
        /// First day, YYYY-MM-DD.
        #[arg(long)]
        start: NaiveDate,
        /// Last day, YYYY-MM-DD, inclusive.
        #[arg(long)]
        end: NaiveDate,
    },

    /// Close an active cycle.
    Close {
        #[arg(long)]
        id: Uuid,
        #[arg(long, value_enum, default_value = "completed")]
        status: CloseAs,
    },

    /// Show the active cycle.
    Active,

    /// List all cycles.
    List,
}

/// Run a cycle subcommand.
pub async fn run_cycle(args: &CycleArgs, database_url: &str) -> Result<u8> {
    let engine = connect_engine(database_url).await?;
    match &args.command {
        CycleCommand::Open { name, start, end } => {
            let window = CycleWindow::new(*start, *end).context("invalid cycle window")?;
            print_json(&engine.open_cycle(name.clone(), window).await?)?;
        }
        CycleCommand::Close { id, status } => {
            let closed = engine
                .close_cycle(CycleId::from_uuid(*id), (*status).into())
                .await?;
            print_json(&closed)?;
        }
        CycleCommand::Active => print_json(&engine.active_cycle().await?)?,
        CycleCommand::List => print_json(&engine.list_cycles().await?)?,
    }
    Ok(0)
}
