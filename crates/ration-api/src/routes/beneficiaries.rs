//! # Beneficiary Registry Routes
//!
//! - `POST /v1/beneficiaries`: register, extracting the reference face
//! - `GET  /v1/beneficiaries`: list (filter `status`, `limit`)
//! - `GET  /v1/beneficiaries/:card_number`: lookup
//! - `PUT  /v1/beneficiaries/:card_number/status`: change eligibility
//! - `PUT  /v1/beneficiaries/:card_number/reference-face`: replace the reference face
//! - `GET  /v1/beneficiaries/:card_number/status-history`: status log
//!
//! Responses never carry the reference embedding.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use ration_core::{BeneficiaryStatus, CardNumber, FaceSample, StaffRef};
use ration_engine::{Beneficiary, IdentityFields};
use ration_state::StatusChange;

use super::{card_from_path, staff};
use crate::error::AppError;
use crate::extractors::{extract_query, extract_validated_json, parse_optional, Validate};
use crate::state::AppState;

/// Assemble the beneficiary router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/beneficiaries",
            get(list_beneficiaries).post(register_beneficiary),
        )
        .route("/v1/beneficiaries/:card_number", get(get_beneficiary))
        .route("/v1/beneficiaries/:card_number/status", put(set_status))
        .route(
            "/v1/beneficiaries/:card_number/reference-face",
            put(replace_reference_face),
        )
        .route(
            "/v1/beneficiaries/:card_number/status-history",
            get(status_history),
        )
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Registration request.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterBeneficiaryRequest {
    pub card_number: String,
    pub name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    /// Base64 face capture used to extract the reference embedding.
    pub face_image: String,
}

/// Validated registration.
#[derive(Debug)]
pub struct Registration {
    pub card_number: CardNumber,
    pub identity: IdentityFields,
    pub sample: FaceSample,
}

impl Validate for RegisterBeneficiaryRequest {
    type Output = Registration;

    fn validate(self) -> Result<Registration, AppError> {
        Ok(Registration {
            card_number: CardNumber::new(self.card_number)?,
            identity: IdentityFields::new(self.name, self.phone, self.address)?,
            sample: FaceSample::from_base64(&self.face_image)?,
        })
    }
}

/// Status change request.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SetStatusRequest {
    /// `active`, `suspended` or `blocked`.
    pub status: String,
    pub changed_by: String,
    pub reason: Option<String>,
}

impl Validate for SetStatusRequest {
    type Output = (BeneficiaryStatus, StaffRef, Option<String>);

    fn validate(self) -> Result<Self::Output, AppError> {
        Ok((self.status.parse()?, staff(self.changed_by)?, self.reason))
    }
}

/// Reference face replacement request.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ReplaceFaceRequest {
    pub face_image: String,
}

impl Validate for ReplaceFaceRequest {
    type Output = FaceSample;

    fn validate(self) -> Result<FaceSample, AppError> {
        Ok(FaceSample::from_base64(&self.face_image)?)
    }
}

/// Query parameters for the beneficiary list.
#[derive(Debug, Deserialize)]
pub struct ListBeneficiariesParams {
    pub status: Option<String>,
    pub limit: Option<u32>,
}

/// A beneficiary without its biometric reference.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BeneficiaryView {
    pub id: Uuid,
    pub card_number: String,
    pub name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Beneficiary> for BeneficiaryView {
    fn from(b: Beneficiary) -> Self {
        Self {
            id: *b.id.as_uuid(),
            card_number: b.card_number.to_string(),
            name: b.name,
            phone: b.phone,
            address: b.address,
            status: b.status.to_string(),
            created_at: b.created_at,
            updated_at: b.updated_at,
        }
    }
}

/// One entry of the status log.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StatusChangeView {
    pub from_status: String,
    pub to_status: String,
    pub changed_by: String,
    pub reason: Option<String>,
    pub changed_at: DateTime<Utc>,
}

impl From<StatusChange> for StatusChangeView {
    fn from(c: StatusChange) -> Self {
        Self {
            from_status: c.from_status.to_string(),
            to_status: c.to_status.to_string(),
            changed_by: c.changed_by.to_string(),
            reason: c.reason,
            changed_at: c.changed_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /v1/beneficiaries: Register a beneficiary.
#[utoipa::path(
    post,
    path = "/v1/beneficiaries",
    request_body = RegisterBeneficiaryRequest,
    responses(
        (status = 201, description = "Registered", body = BeneficiaryView),
        (status = 409, description = "Card number already registered", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid fields or no face detected", body = crate::error::ErrorBody),
        (status = 503, description = "Face service unavailable", body = crate::error::ErrorBody),
    ),
    tag = "beneficiaries"
)]
async fn register_beneficiary(
    State(state): State<AppState>,
    body: Result<Json<RegisterBeneficiaryRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<BeneficiaryView>), AppError> {
    let reg = extract_validated_json(body)?;
    let beneficiary = state
        .engine
        .register_beneficiary(reg.card_number, reg.identity, &reg.sample)
        .await?;
    Ok((StatusCode::CREATED, Json(beneficiary.into())))
}

/// GET /v1/beneficiaries: List beneficiaries, newest first.
#[utoipa::path(
    get,
    path = "/v1/beneficiaries",
    params(
        ("status" = Option<String>, Query, description = "active, suspended or blocked"),
        ("limit" = Option<u32>, Query, description = "Max items to return (default 100, max 1000)"),
    ),
    responses(
        (status = 200, description = "Beneficiaries", body = Vec<BeneficiaryView>),
        (status = 422, description = "Unknown status", body = crate::error::ErrorBody),
    ),
    tag = "beneficiaries"
)]
async fn list_beneficiaries(
    State(state): State<AppState>,
    params: Result<Query<ListBeneficiariesParams>, QueryRejection>,
) -> Result<Json<Vec<BeneficiaryView>>, AppError> {
    let params = extract_query(params)?;
    let status = parse_optional::<BeneficiaryStatus>(params.status.as_deref())?;
    let rows = state.engine.list_beneficiaries(status, params.limit).await?;
    Ok(Json(rows.into_iter().map(BeneficiaryView::from).collect()))
}

/// GET /v1/beneficiaries/:card_number: Look up by card number.
#[utoipa::path(
    get,
    path = "/v1/beneficiaries/{card_number}",
    params(("card_number" = String, Path, description = "Ration card number")),
    responses(
        (status = 200, description = "Found", body = BeneficiaryView),
        (status = 404, description = "Card not registered", body = crate::error::ErrorBody),
    ),
    tag = "beneficiaries"
)]
async fn get_beneficiary(
    State(state): State<AppState>,
    Path(card_number): Path<String>,
) -> Result<Json<BeneficiaryView>, AppError> {
    let card = card_from_path(&card_number)?;
    Ok(Json(state.engine.beneficiary(&card).await?.into()))
}

/// PUT /v1/beneficiaries/:card_number/status: Change eligibility.
///
/// Requesting the current status is a no-op and logs nothing.
#[utoipa::path(
    put,
    path = "/v1/beneficiaries/{card_number}/status",
    params(("card_number" = String, Path, description = "Ration card number")),
    request_body = SetStatusRequest,
    responses(
        (status = 200, description = "Updated", body = BeneficiaryView),
        (status = 404, description = "Card not registered", body = crate::error::ErrorBody),
        (status = 409, description = "Status changed concurrently", body = crate::error::ErrorBody),
        (status = 422, description = "Unknown status", body = crate::error::ErrorBody),
    ),
    tag = "beneficiaries"
)]
async fn set_status(
    State(state): State<AppState>,
    Path(card_number): Path<String>,
    body: Result<Json<SetStatusRequest>, JsonRejection>,
) -> Result<Json<BeneficiaryView>, AppError> {
    let card = card_from_path(&card_number)?;
    let (status, changed_by, reason) = extract_validated_json(body)?;
    let updated = state
        .engine
        .set_beneficiary_status(&card, status, changed_by, reason)
        .await?;
    Ok(Json(updated.into()))
}

/// PUT /v1/beneficiaries/:card_number/reference-face: Replace the reference face.
#[utoipa::path(
    put,
    path = "/v1/beneficiaries/{card_number}/reference-face",
    params(("card_number" = String, Path, description = "Ration card number")),
    request_body = ReplaceFaceRequest,
    responses(
        (status = 200, description = "Replaced", body = BeneficiaryView),
        (status = 404, description = "Card not registered", body = crate::error::ErrorBody),
        (status = 422, description = "No face detected", body = crate::error::ErrorBody),
    ),
    tag = "beneficiaries"
)]
async fn replace_reference_face(
    State(state): State<AppState>,
    Path(card_number): Path<String>,
    body: Result<Json<ReplaceFaceRequest>, JsonRejection>,
) -> Result<Json<BeneficiaryView>, AppError> {
    let card = card_from_path(&card_number)?;
    let sample = extract_validated_json(body)?;
    let updated = state.engine.replace_reference_face(&card, &sample).await?;
    Ok(Json(updated.into()))
}

/// GET /v1/beneficiaries/:card_number/status-history: Status log, oldest first.
#[utoipa::path(
    get,
    path = "/v1/beneficiaries/{card_number}/status-history",
    params(("card_number" = String, Path, description = "Ration card number")),
    responses(
        (status = 200, description = "Status changes", body = Vec<StatusChangeView>),
        (status = 404, description = "Card not registered", body = crate::error::ErrorBody),
    ),
    tag = "beneficiaries"
)]
async fn status_history(
    State(state): State<AppState>,
    Path(card_number): Path<String>,
) -> Result<Json<Vec<StatusChangeView>>, AppError> {
    let card = card_from_path(&card_number)?;
    let log = state.engine.status_history(&card).await?;
    Ok(Json(log.into_iter().map(StatusChangeView::from).collect()))
}
