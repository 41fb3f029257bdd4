//! # ration-api — Binary Entry Point
//!
//! Starts the Axum HTTP server. Binds to `PORT` (default 8080).
//!
//! - `DATABASE_URL` selects Postgres; without it the in-memory datastore is used.
//! - `FACE_SERVICE_URL` selects the HTTP face service; without it the
//!   vector comparator is used.
//! - `RATION_LOG_FORMAT=json` switches to JSON log lines.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use ration_api::db::{self, PgStore};
use ration_api::state::{AppConfig, AppState};
use ration_core::DetectionConfig;
use ration_engine::{
    FaceComparator, FaceServiceConfig, HttpFaceService, MemoryStore, Stores, SystemClock,
    VectorComparator, VerificationEngine,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let detection = DetectionConfig::from_env().context("invalid detection settings")?;
    let config = AppConfig::from_env().context("invalid server settings")?;

    // Datastore (optional Postgres, otherwise in-memory).
    let db_pool = db::init_pool().await.map_err(|e| {
        tracing::error!("Database initialization failed: {e}");
        e
    })?;
    let stores = match &db_pool {
        Some(pool) => Stores::shared(Arc::new(PgStore::new(pool.clone()))),
        None => Stores::shared(Arc::new(MemoryStore::new())),
    };

    let comparator: Arc<dyn FaceComparator> =
        match FaceServiceConfig::from_env().context("invalid face service settings")? {
            Some(face_config) => {
                tracing::info!(url = %face_config.base_url, "Face service configured");
                Arc::new(HttpFaceService::new(face_config)?)
            }
            None => {
                tracing::warn!(
                    "FACE_SERVICE_URL not set, comparing submitted embeddings directly. \
                     Do not use this mode at a live counter."
                );
                Arc::new(VectorComparator)
            }
        };

    let engine = VerificationEngine::new(stores, comparator, Arc::new(SystemClock), detection);
    let port = config.port;
    let app = ration_api::app(AppState::with_engine(engine, db_pool, config));

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Ration verification API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("RATION_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
