//! # Reconcile Subcommand
//!
//! Runs the reconciliation scan and prints the report. Exits 0 when the
//! cycle is clean and 2 when findings exist, so the command can gate a
//! scheduled job.

use anyhow::Result;
use clap::Args;
use uuid::Uuid;

use ration_core::CycleId;

use crate::{connect_engine, print_json};

/// Exit code when the scan reports findings.
pub const FINDINGS_EXIT_CODE: u8 = 2;

/// Arguments for the `ration reconcile` subcommand.
#[derive(Args, Debug)]
pub struct ReconcileArgs {
    /// Cycle to scan; defaults to the active cycle.
    #[arg(long)]
    pub cycle_id: Option<Uuid>,
}

/// Run the scan.
pub async fn run_reconcile(args: &ReconcileArgs, database_url: &str) -> Result<u8> {
    let engine = connect_engine(database_url).await?;
    let report = engine.reconcile(args.cycle_id.map(CycleId::from_uuid)).await?;
    print_json(&report)?;
    if report.is_clean() {
        Ok(0)
    } else {
        tracing::warn!(
            cycle_id = %report.cycle_id,
            findings = report.findings.len(),
            "reconciliation found missing duplicate signals"
        );
        Ok(FINDINGS_EXIT_CODE)
    }
}
