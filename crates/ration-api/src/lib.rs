//! # ration-api — Axum API Services
//!
//! HTTP surface for ration-card verification, built on Axum/Tower/Tokio.
//! Every handler delegates to `ration_engine::VerificationEngine`.
//!
//! ## Routes
//!
//! - `/v1/verify`: counter verification
//! - `/v1/beneficiaries/*`: registry, status, reference faces
//! - `/v1/transactions/*`: ledger views
//! - `/v1/alerts/*`: alert listing and review
//! - `/v1/shops`, `/v1/cycles/*`: administration
//! - `/v1/dashboard/stats`, `/v1/reconciliation`: reports
//! - `/openapi.json`: generated OpenAPI spec
//! - `/health/*`, `/metrics`: probes and Prometheus exposition
//!
//! ## Middleware Stack (Tower)
//!
//! TraceLayer → MetricsLayer → body limit
//!
//! ## Crate Policy
//!
//! - No business logic in route handlers.
//! - All errors map to structured HTTP responses via `AppError`.

pub mod db;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;

pub use error::AppError;
pub use state::AppState;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::middleware::from_fn;
use axum::response::IntoResponse;
use axum::{Extension, Router};
use tower_http::trace::TraceLayer;

use crate::middleware::metrics::ApiMetrics;

/// Whether Prometheus metrics are collected and served.
///
/// On unless `RATION_METRICS_ENABLED=false`.
fn metrics_enabled() -> bool {
    std::env::var("RATION_METRICS_ENABLED")
        .map(|v| v.to_lowercase() != "false")
        .unwrap_or(true)
}

/// Build the complete application router.
pub fn app(state: AppState) -> Router {
    let metrics = ApiMetrics::new();
    let metrics_on = metrics_enabled();

    let mut api = Router::new()
        .merge(routes::verify::router())
        .merge(routes::beneficiaries::router())
        .merge(routes::transactions::router())
        .merge(routes::alerts::router())
        .merge(routes::admin::router())
        .merge(routes::reports::router())
        .merge(openapi::router())
        .layer(DefaultBodyLimit::max(state.config.body_limit));

    if metrics_on {
        api = api
            .layer(from_fn(middleware::metrics::metrics_middleware))
            .layer(axum::Extension(metrics.clone()));
    }

    let api = api
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let mut probes = Router::new()
        .route("/health/liveness", axum::routing::get(liveness))
        .route("/health/readiness", axum::routing::get(readiness));

    if metrics_on {
        probes = probes
            .route("/metrics", axum::routing::get(prometheus_metrics))
            .layer(axum::Extension(metrics));
    }

    let probes = probes.with_state(state);

    Router::new().merge(probes).merge(api)
}

/// GET /metrics: Prometheus text exposition.
///
/// Gauges are refreshed from the datastore on every scrape.
async fn prometheus_metrics(
    State(state): State<AppState>,
    Extension(metrics): Extension<ApiMetrics>,
) -> impl IntoResponse {
    match state.engine.dashboard().await {
        Ok(counts) => metrics.set_dashboard(&counts),
        Err(e) => tracing::warn!("Dashboard counts unavailable for metrics scrape: {e}"),
    }

    match metrics.gather_and_encode() {
        Ok(body) => (
            StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4; charset=utf-8",
            )],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Failed to encode Prometheus metrics: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, e).into_response()
        }
    }
}

/// Liveness probe.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe: the datastore answers.
async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    if let Some(pool) = &state.db_pool {
        if let Err(e) = sqlx::query("SELECT 1").execute(pool).await {
            tracing::warn!("Database health check failed: {e}");
            return (StatusCode::SERVICE_UNAVAILABLE, "database unreachable").into_response();
        }
    }
    (StatusCode::OK, "ready").into_response()
}
