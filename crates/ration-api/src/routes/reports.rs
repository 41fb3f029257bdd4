//! # Reports
//!
//! Dashboard aggregates and the reconciliation scan. Both are read-only.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use ration_core::CycleId;
use ration_engine::reconcile::{ConflictFinding, ReconciliationReport};
use ration_engine::DashboardCounts;

use crate::error::AppError;
use crate::extractors::extract_query;
use crate::state::AppState;

/// Assemble the reports router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/dashboard/stats", get(dashboard_stats))
        .route("/v1/reconciliation", get(reconciliation))
}

/// Aggregate counts across the whole datastore.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DashboardView {
    pub total_beneficiaries: u64,
    pub active_beneficiaries: u64,
    pub suspended_beneficiaries: u64,
    pub blocked_beneficiaries: u64,
    pub total_transactions: u64,
    pub successful_transactions: u64,
    pub flagged_transactions: u64,
    pub failed_transactions: u64,
    pub pending_alerts: u64,
    pub critical_alerts: u64,
    pub high_alerts: u64,
    pub medium_alerts: u64,
}

impl From<DashboardCounts> for DashboardView {
    fn from(c: DashboardCounts) -> Self {
        Self {
            total_beneficiaries: c.total_beneficiaries,
            active_beneficiaries: c.active_beneficiaries,
            suspended_beneficiaries: c.suspended_beneficiaries,
            blocked_beneficiaries: c.blocked_beneficiaries,
            total_transactions: c.total_transactions,
            successful_transactions: c.successful_transactions,
            flagged_transactions: c.flagged_transactions,
            failed_transactions: c.failed_transactions,
            pending_alerts: c.pending_alerts,
            critical_alerts: c.critical_alerts,
            high_alerts: c.high_alerts,
            medium_alerts: c.medium_alerts,
        }
    }
}

/// Query parameters for reconciliation.
#[derive(Debug, Deserialize)]
pub struct ReconciliationParams {
    /// Defaults to the active cycle.
    pub cycle_id: Option<Uuid>,
}

/// A duplicate signal that was never persisted.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FindingView {
    pub transaction_id: Uuid,
    pub card_number: String,
    pub beneficiary_id: Uuid,
    pub alert_type: String,
    pub previous_transaction_id: Option<Uuid>,
    pub description: String,
}

impl From<ConflictFinding> for FindingView {
    fn from(f: ConflictFinding) -> Self {
        Self {
            transaction_id: *f.transaction_id.as_uuid(),
            card_number: f.card_number.to_string(),
            beneficiary_id: *f.beneficiary_id.as_uuid(),
            alert_type: f.alert_type.to_string(),
            previous_transaction_id: f.previous_transaction_id.map(|t| *t.as_uuid()),
            description: f.description,
        }
    }
}

/// Result of a reconciliation scan.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReconciliationView {
    pub cycle_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub transactions_scanned: usize,
    pub clean: bool,
    pub findings: Vec<FindingView>,
}

impl From<ReconciliationReport> for ReconciliationView {
    fn from(r: ReconciliationReport) -> Self {
        Self {
            clean: r.is_clean(),
            cycle_id: *r.cycle_id.as_uuid(),
            generated_at: r.generated_at,
            transactions_scanned: r.transactions_scanned,
            findings: r.findings.into_iter().map(FindingView::from).collect(),
        }
    }
}

/// GET /v1/dashboard/stats: Aggregate counts.
#[utoipa::path(
    get,
    path = "/v1/dashboard/stats",
    responses((status = 200, description = "Counts", body = DashboardView)),
    tag = "reports"
)]
async fn dashboard_stats(State(state): State<AppState>) -> Result<Json<DashboardView>, AppError> {
    Ok(Json(state.engine.dashboard().await?.into()))
}

/// GET /v1/reconciliation: Scan a cycle for missed duplicate signals.
#[utoipa::path(
    get,
    path = "/v1/reconciliation",
    params(("cycle_id" = Option<Uuid>, Query, description = "Cycle to scan; defaults to the active cycle")),
    responses(
        (status = 200, description = "Report", body = ReconciliationView),
        (status = 404, description = "Cycle not found", body = crate::error::ErrorBody),
        (status = 503, description = "No cycle given and no single active cycle", body = crate::error::ErrorBody),
    ),
    tag = "reports"
)]
async fn reconciliation(
    State(state): State<AppState>,
    params: Result<Query<ReconciliationParams>, QueryRejection>,
) -> Result<Json<ReconciliationView>, AppError> {
    let params = extract_query(params)?;
    let report = state
        .engine
        .reconcile(params.cycle_id.map(CycleId::from_uuid))
        .await?;
    Ok(Json(report.into()))
}
