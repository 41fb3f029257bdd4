//! # Alert Review Routes
//!
//! Alerts are created only by verification. Review moves a `pending`
//! alert to `resolved` or `dismissed`, once.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::routing::{get, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use ration_core::{AlertId, AlertStatus, Severity, StaffRef};
use ration_engine::DuplicateAlert;

use super::staff;
use crate::error::AppError;
use crate::extractors::{extract_query, extract_validated_json, parse_optional, Validate};
use crate::state::AppState;

/// Assemble the alert router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/alerts", get(list_alerts))
        .route("/v1/alerts/:id", get(get_alert))
        .route("/v1/alerts/:id/review", put(review_alert))
}

/// Query parameters for the alert list.
#[derive(Debug, Deserialize)]
pub struct ListAlertsParams {
    pub status: Option<String>,
    pub severity: Option<String>,
    pub limit: Option<u32>,
}

/// Review decision.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ReviewAlertRequest {
    /// `resolved` or `dismissed`.
    pub status: String,
    pub reviewed_by: String,
}

impl Validate for ReviewAlertRequest {
    type Output = (AlertStatus, StaffRef);

    fn validate(self) -> Result<Self::Output, AppError> {
        Ok((self.status.parse()?, staff(self.reviewed_by)?))
    }
}

/// A persisted duplicate alert.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AlertView {
    pub id: Uuid,
    pub alert_type: String,
    pub severity: String,
    pub status: String,
    pub transaction_id: Uuid,
    pub previous_transaction_id: Option<Uuid>,
    pub beneficiary_id: Option<Uuid>,
    pub card_number: String,
    pub shop_id: Uuid,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl From<DuplicateAlert> for AlertView {
    fn from(a: DuplicateAlert) -> Self {
        Self {
            id: *a.id.as_uuid(),
            alert_type: a.alert_type.to_string(),
            severity: a.severity.to_string(),
            status: a.status.to_string(),
            transaction_id: *a.transaction_id.as_uuid(),
            previous_transaction_id: a.previous_transaction_id.map(|t| *t.as_uuid()),
            beneficiary_id: a.beneficiary_id.map(|b| *b.as_uuid()),
            card_number: a.card_number.to_string(),
            shop_id: *a.shop_id.as_uuid(),
            description: a.description,
            created_at: a.created_at,
            reviewed_by: a.reviewed_by.map(|r| r.to_string()),
            reviewed_at: a.reviewed_at,
        }
    }
}

/// GET /v1/alerts: List alerts, newest first.
#[utoipa::path(
    get,
    path = "/v1/alerts",
    params(
        ("status" = Option<String>, Query, description = "pending, resolved or dismissed"),
        ("severity" = Option<String>, Query, description = "medium, high or critical"),
        ("limit" = Option<u32>, Query, description = "Max items to return (default 100, max 1000)"),
    ),
    responses(
        (status = 200, description = "Alerts", body = Vec<AlertView>),
        (status = 422, description = "Unknown status or severity", body = crate::error::ErrorBody),
    ),
    tag = "alerts"
)]
async fn list_alerts(
    State(state): State<AppState>,
    params: Result<Query<ListAlertsParams>, QueryRejection>,
) -> Result<Json<Vec<AlertView>>, AppError> {
    let params = extract_query(params)?;
    let status = parse_optional::<AlertStatus>(params.status.as_deref())?;
    let severity = parse_optional::<Severity>(params.severity.as_deref())?;
    let rows = state
        .engine
        .list_alerts(status, severity, params.limit)
        .await?;
    Ok(Json(rows.into_iter().map(AlertView::from).collect()))
}

/// GET /v1/alerts/:id: One alert.
#[utoipa::path(
    get,
    path = "/v1/alerts/{id}",
    params(("id" = Uuid, Path, description = "Alert ID")),
    responses(
        (status = 200, description = "Found", body = AlertView),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "alerts"
)]
async fn get_alert(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AlertView>, AppError> {
    Ok(Json(state.engine.alert(AlertId::from_uuid(id)).await?.into()))
}

/// PUT /v1/alerts/:id/review: Resolve or dismiss a pending alert.
#[utoipa::path(
    put,
    path = "/v1/alerts/{id}/review",
    params(("id" = Uuid, Path, description = "Alert ID")),
    request_body = ReviewAlertRequest,
    responses(
        (status = 200, description = "Reviewed", body = AlertView),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Alert already reviewed", body = crate::error::ErrorBody),
        (status = 422, description = "Status other than resolved or dismissed", body = crate::error::ErrorBody),
    ),
    tag = "alerts"
)]
async fn review_alert(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Result<Json<ReviewAlertRequest>, JsonRejection>,
) -> Result<Json<AlertView>, AppError> {
    let (status, reviewer) = extract_validated_json(body)?;
    let reviewed = state
        .engine
        .review_alert(AlertId::from_uuid(id), status, reviewer)
        .await?;
    Ok(Json(reviewed.into()))
}
