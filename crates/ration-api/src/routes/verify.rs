//! # Counter Verification
//!
//! `POST /v1/verify` runs one attempt through the verification engine.
//!
//! A comparator outage is not an HTTP error: the attempt is recorded as a
//! `failed` transaction with `rejection_reason = face_service_unavailable`
//! and returned with 200 so the counter can tell it apart from a mismatch.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::post;
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use ration_core::{CardNumber, FaceSample, ShopId};
use ration_engine::{AlertSummary, VerificationRequest, VerificationResult};

use super::staff;
use crate::error::AppError;
use crate::extractors::{extract_validated_json, Validate};
use crate::middleware::metrics::ApiMetrics;
use crate::state::AppState;

/// Assemble the verification router.
pub fn router() -> Router<AppState> {
    Router::new().route("/v1/verify", post(verify))
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// One counter attempt.
#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyRequest {
    /// Card presented at the counter.
    pub card_number: String,
    /// Shop where the attempt is made.
    pub shop_id: Uuid,
    /// Base64 face capture; a `data:<mime>;base64,` prefix is accepted.
    pub face_image: String,
    /// Operator submitting the attempt.
    pub operator_id: String,
    /// Items handed over if the attempt is accepted.
    #[serde(default)]
    #[schema(value_type = Vec<Object>)]
    pub items_collected: Vec<serde_json::Value>,
}

impl Validate for VerifyRequest {
    type Output = VerificationRequest;

    fn validate(self) -> Result<VerificationRequest, AppError> {
        Ok(VerificationRequest {
            card_number: CardNumber::new(self.card_number)?,
            shop_id: ShopId::from_uuid(self.shop_id),
            face_sample: FaceSample::from_base64(&self.face_image)?,
            operator_id: staff(self.operator_id)?,
            items_collected: self.items_collected,
        })
    }
}

/// Alert raised by this attempt.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AlertSummaryView {
    /// Absent when the alert could not be persisted.
    pub alert_id: Option<Uuid>,
    pub alert_type: String,
    pub severity: String,
    pub description: String,
    pub previous_transaction_id: Option<Uuid>,
}

impl From<AlertSummary> for AlertSummaryView {
    fn from(a: AlertSummary) -> Self {
        Self {
            alert_id: a.alert_id.map(|id| *id.as_uuid()),
            alert_type: a.alert_type.to_string(),
            severity: a.severity.to_string(),
            description: a.description,
            previous_transaction_id: a.previous_transaction_id.map(|id| *id.as_uuid()),
        }
    }
}

/// Outcome of a verification.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VerificationResponse {
    /// Whether rations may be handed over.
    pub accepted: bool,
    pub transaction_id: Uuid,
    pub beneficiary_id: Option<Uuid>,
    /// `success`, `failed` or `flagged`.
    pub transaction_status: String,
    /// Face confidence in `[0, 100]`; null when no comparison took place.
    pub confidence: Option<f64>,
    /// Raised signals, in rule order.
    pub alerts: Vec<AlertSummaryView>,
    /// Message for the operator.
    pub message: String,
    /// Why the attempt failed.
    pub rejection_reason: Option<String>,
}

impl From<VerificationResult> for VerificationResponse {
    fn from(r: VerificationResult) -> Self {
        Self {
            accepted: r.accepted,
            transaction_id: *r.transaction_id.as_uuid(),
            beneficiary_id: r.beneficiary_id.map(|id| *id.as_uuid()),
            transaction_status: r.transaction_status.to_string(),
            confidence: r.confidence.map(|c| c.value()),
            alerts: r.alerts.into_iter().map(AlertSummaryView::from).collect(),
            message: r.message,
            rejection_reason: r.rejection_reason.map(|r| r.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /v1/verify: Verify one counter attempt.
#[utoipa::path(
    post,
    path = "/v1/verify",
    request_body = VerifyRequest,
    responses(
        (status = 200, description = "Attempt recorded; see transaction_status", body = VerificationResponse),
        (status = 422, description = "Malformed card number, sample or unknown shop", body = crate::error::ErrorBody),
        (status = 500, description = "Transaction recorded but alerts incomplete", body = crate::error::ErrorBody),
        (status = 503, description = "No single active distribution cycle", body = crate::error::ErrorBody),
    ),
    tag = "verification"
)]
async fn verify(
    State(state): State<AppState>,
    metrics: Option<Extension<ApiMetrics>>,
    body: Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<Json<VerificationResponse>, AppError> {
    let request = extract_validated_json(body)?;
    let result = state.engine.verify(request).await?;
    if let Some(Extension(metrics)) = metrics {
        metrics.record_verification(result.transaction_status);
    }
    Ok(Json(result.into()))
}
