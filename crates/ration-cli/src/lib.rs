//! # ration-cli — Operator Tooling
//!
//! Subcommands that act on the datastore directly, without the HTTP
//! server: schema migrations, shop and cycle administration, and the
//! reconciliation scan. `check` validates the environment a server would
//! start with.
//!
//! Every database subcommand takes `--database-url` or falls back to
//! `DATABASE_URL`.

pub mod check;
pub mod cycle;
pub mod reconcile;
pub mod shop;

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use ration_api::db::{self, PgStore};
use ration_core::DetectionConfig;
use ration_engine::{Stores, SystemClock, VectorComparator, VerificationEngine};

/// Resolve the database URL from the flag or the environment.
pub fn database_url(flag: Option<&str>) -> Result<String> {
    flag.map(str::to_owned)
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .filter(|url| !url.trim().is_empty())
        .context("no database configured: pass --database-url or set DATABASE_URL")
}

/// Connect and build an engine over Postgres.
///
/// Administrative commands never compare faces, so the vector comparator
/// stands in for the face service.
pub async fn connect_engine(url: &str) -> Result<VerificationEngine> {
    let pool = db::connect(url)
        .await
        .context("connecting to PostgreSQL")?;
    let detection = DetectionConfig::from_env().context("invalid detection settings")?;
    Ok(VerificationEngine::new(
        Stores::shared(Arc::new(PgStore::new(pool))),
        Arc::new(VectorComparator),
        Arc::new(SystemClock),
        detection,
    ))
}

/// Apply the embedded schema migrations.
pub async fn run_migrate(url: &str) -> Result<u8> {
    let pool = db::connect(url)
        .await
        .context("connecting to PostgreSQL")?;
    db::run_migrations(&pool)
        .await
        .context("applying migrations")?;
    println!("migrations applied");
    Ok(0)
}

/// Print a value as pretty JSON on stdout.
pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("serializing output")?
    );
    Ok(())
}
