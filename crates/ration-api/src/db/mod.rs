//! # Database Persistence Layer
//!
//! Postgres implementation of the engine's datastore ports via SQLx.
//!
//! ## Architecture
//!
//! The database layer is **optional**. When `DATABASE_URL` is set, the API
//! keeps beneficiaries, shops, cycles, the transaction ledger and alerts in
//! PostgreSQL. When absent, it runs on `ration_engine::MemoryStore`
//! (development and tests).
//!
//! ## Guarantees delegated to the schema
//!
//! - Card number and shop code uniqueness (named constraints).
//! - At most one active cycle (partial unique index).
//! - Ledger append-only except `success -> flagged` (trigger).
//! - Conditional status writes are single `UPDATE ... WHERE status = $n`
//!   statements, so two racing writers cannot both apply.
//!
//! Queries are runtime-checked (`sqlx::query`), never compile-time checked
//! against a live database.

mod alerts;
mod beneficiaries;
mod ledger;
mod reference;

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};

use ration_engine::store::{StoreError, UniqueKey};

/// Postgres-backed implementation of every datastore port.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap a connected, migrated pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Connect to `url` without running migrations.
pub async fn connect(url: &str) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .connect(url)
        .await?;
    tracing::info!("Connected to PostgreSQL");
    Ok(pool)
}

/// Apply the embedded migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Database migrations applied");
    Ok(())
}

/// Initialize the database connection pool and run migrations.
///
/// Returns `None` if `DATABASE_URL` is not set (in-memory-only mode).
/// Returns `Err` if the URL is set but the connection or migration fails.
pub async fn init_pool() -> Result<Option<PgPool>, sqlx::Error> {
    let url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            tracing::warn!(
                "DATABASE_URL not set, running with the in-memory datastore. \
                 Records will not survive restarts."
            );
            return Ok(None);
        }
    };

    let pool = connect(&url).await?;
    run_migrations(&pool).await?;
    Ok(Some(pool))
}

/// Map a driver error onto the port's error vocabulary.
///
/// Constraint names come from `migrations/0001_init.sql`.
pub(crate) fn store_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            let key = match db.constraint() {
                Some("beneficiaries_card_number_key") => UniqueKey::CardNumber,
                Some("ration_shops_shop_code_key") => UniqueKey::ShopCode,
                Some("distribution_cycles_one_active") => UniqueKey::ActiveCycle,
                _ => UniqueKey::RecordId,
            };
            return StoreError::UniqueViolation(key);
        }
        if db.is_foreign_key_violation() {
            let target = match db.constraint() {
                Some("transactions_shop_fkey") => "shop",
                Some("transactions_cycle_fkey") => "cycle",
                Some("duplicate_alerts_transaction_fkey") => "transaction",
                _ => "record",
            };
            return StoreError::MissingReference(target);
        }
    }
    StoreError::Unavailable(err.to_string())
}

/// A stored value that no longer parses into its domain type.
pub(crate) fn corrupt(
    table: &str,
    id: impl std::fmt::Display,
    err: impl std::fmt::Display,
) -> StoreError {
    StoreError::Corrupt(format!("{table} {id}: {err}"))
}

/// Row limit as bound in SQL.
pub(crate) fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

/// Postgres `COUNT(*)` as an unsigned total.
pub(crate) fn count(n: i64) -> u64 {
    u64::try_from(n).unwrap_or(0)
}
