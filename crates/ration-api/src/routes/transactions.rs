//! # Transaction Ledger Routes
//!
//! Read-only. Transactions are written by `POST /v1/verify` and are never
//! edited or deleted through the API.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use ration_core::{CycleId, ShopId, TransactionId, TransactionStatus};
use ration_engine::query::TransactionDetail;
use ration_engine::Transaction;

use super::alerts::AlertView;
use crate::error::AppError;
use crate::extractors::{extract_query, parse_optional};
use crate::state::AppState;

/// Assemble the ledger router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/transactions", get(list_transactions))
        .route("/v1/transactions/:id", get(get_transaction))
}

/// Query parameters for the ledger list.
#[derive(Debug, Deserialize)]
pub struct ListTransactionsParams {
    pub cycle_id: Option<Uuid>,
    pub shop_id: Option<Uuid>,
    pub status: Option<String>,
    pub limit: Option<u32>,
}

/// A ledger entry.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TransactionView {
    pub id: Uuid,
    pub beneficiary_id: Option<Uuid>,
    pub card_number: String,
    pub shop_id: Uuid,
    pub cycle_id: Uuid,
    pub operator_id: String,
    pub face_match_confidence: Option<f64>,
    pub status: String,
    pub rejection_reason: Option<String>,
    #[schema(value_type = Vec<Object>)]
    pub items_collected: Vec<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl From<Transaction> for TransactionView {
    fn from(t: Transaction) -> Self {
        Self {
            id: *t.id.as_uuid(),
            beneficiary_id: t.beneficiary_id.map(|b| *b.as_uuid()),
            card_number: t.card_number.to_string(),
            shop_id: *t.shop_id.as_uuid(),
            cycle_id: *t.cycle_id.as_uuid(),
            operator_id: t.operator_id.to_string(),
            face_match_confidence: t.face_match_confidence.map(|c| c.value()),
            status: t.status.to_string(),
            rejection_reason: t.rejection_reason.map(|r| r.to_string()),
            items_collected: t.items_collected,
            created_at: t.created_at,
        }
    }
}

/// A ledger entry and the alerts it raised.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TransactionDetailView {
    pub transaction: TransactionView,
    pub alerts: Vec<AlertView>,
}

impl From<TransactionDetail> for TransactionDetailView {
    fn from(d: TransactionDetail) -> Self {
        Self {
            transaction: d.transaction.into(),
            alerts: d.alerts.into_iter().map(AlertView::from).collect(),
        }
    }
}

/// GET /v1/transactions: List ledger entries, newest first.
#[utoipa::path(
    get,
    path = "/v1/transactions",
    params(
        ("cycle_id" = Option<Uuid>, Query, description = "Restrict to one cycle"),
        ("shop_id" = Option<Uuid>, Query, description = "Restrict to one shop"),
        ("status" = Option<String>, Query, description = "success, failed or flagged"),
        ("limit" = Option<u32>, Query, description = "Max items to return (default 100, max 1000)"),
    ),
    responses(
        (status = 200, description = "Transactions", body = Vec<TransactionView>),
        (status = 422, description = "Unknown status", body = crate::error::ErrorBody),
    ),
    tag = "transactions"
)]
async fn list_transactions(
    State(state): State<AppState>,
    params: Result<Query<ListTransactionsParams>, QueryRejection>,
) -> Result<Json<Vec<TransactionView>>, AppError> {
    let params = extract_query(params)?;
    let status = parse_optional::<TransactionStatus>(params.status.as_deref())?;
    let rows = state
        .engine
        .list_transactions(
            params.cycle_id.map(CycleId::from_uuid),
            params.shop_id.map(ShopId::from_uuid),
            status,
            params.limit,
        )
        .await?;
    Ok(Json(rows.into_iter().map(TransactionView::from).collect()))
}

/// GET /v1/transactions/:id: One transaction with its alerts.
#[utoipa::path(
    get,
    path = "/v1/transactions/{id}",
    params(("id" = Uuid, Path, description = "Transaction ID")),
    responses(
        (status = 200, description = "Found", body = TransactionDetailView),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "transactions"
)]
async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TransactionDetailView>, AppError> {
    let detail = state
        .engine
        .transaction_detail(TransactionId::from_uuid(id))
        .await?;
    Ok(Json(detail.into()))
}
