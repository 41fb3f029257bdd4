//! # Application State
//!
//! Shared state for the Axum application, passed to all route handlers
//! via the `State` extractor.
//!
//! The state owns no domain records. Everything lives behind the engine's
//! datastore ports, so cloning the state is cheap and concurrent handlers
//! share nothing mutable beyond what the datastore guards.

use std::sync::Arc;

use sqlx::PgPool;

use ration_core::{ConfigError, DetectionConfig};
use ration_engine::{MemoryStore, Stores, SystemClock, VectorComparator, VerificationEngine};

/// Request body limit: face samples arrive base64-encoded in JSON.
pub const DEFAULT_BODY_LIMIT: usize = 8 * 1024 * 1024;

/// Process-level settings that are not detection thresholds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// HTTP listen port.
    pub port: u16,
    /// Maximum request body in bytes.
    pub body_limit: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }
}

impl AppConfig {
    /// Read `PORT` from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(raw) = lookup("PORT") {
            config.port = raw.trim().parse().map_err(|e| ConfigError::Invalid {
                key: "PORT",
                value: raw.clone(),
                reason: format!("{e}"),
            })?;
        }
        Ok(config)
    }
}

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Verification engine over the configured datastore and comparator.
    pub engine: Arc<VerificationEngine>,
    /// Postgres pool when `DATABASE_URL` is set; used by readiness probes.
    pub db_pool: Option<PgPool>,
    /// Process settings.
    pub config: AppConfig,
}

impl AppState {
    /// In-memory state with default thresholds and the vector comparator.
    ///
    /// Used for development and tests.
    pub fn new() -> Self {
        Self::in_memory(DetectionConfig::default())
    }

    /// In-memory state with the given thresholds.
    pub fn in_memory(detection: DetectionConfig) -> Self {
        let engine = VerificationEngine::new(
            Stores::shared(Arc::new(MemoryStore::new())),
            Arc::new(VectorComparator),
            Arc::new(SystemClock),
            detection,
        );
        Self::with_engine(engine, None, AppConfig::default())
    }

    /// Wrap an already-assembled engine.
    pub fn with_engine(
        engine: VerificationEngine,
        db_pool: Option<PgPool>,
        config: AppConfig,
    ) -> Self {
        Self {
            engine: Arc::new(engine),
            db_pool,
            config,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
