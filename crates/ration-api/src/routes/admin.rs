//! # Shop and Cycle Administration
//!
//! - `GET/POST /v1/shops`
//! - `GET/POST /v1/cycles`
//! - `GET  /v1/cycles/active`
//! - `POST /v1/cycles/:id/close`
//!
//! At most one cycle is active at a time. Verification answers 503 until
//! one is opened.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use ration_core::{CycleId, CycleStatus, ShopCode};
use ration_engine::{DistributionCycle, RationShop};
use ration_state::CycleWindow;

use crate::error::AppError;
use crate::extractors::{extract_validated_json, Validate};
use crate::state::AppState;

/// Assemble the admin router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/shops", get(list_shops).post(create_shop))
        .route("/v1/cycles", get(list_cycles).post(open_cycle))
        .route("/v1/cycles/active", get(active_cycle))
        .route("/v1/cycles/:id/close", post(close_cycle))
}

// ---------------------------------------------------------------------------
// Shops
// ---------------------------------------------------------------------------

/// New shop.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateShopRequest {
    pub shop_code: String,
    pub name: String,
    pub address: Option<String>,
    pub district: Option<String>,
}

impl Validate for CreateShopRequest {
    type Output = (ShopCode, String, Option<String>, Option<String>);

    fn validate(self) -> Result<Self::Output, AppError> {
        Ok((
            ShopCode::new(self.shop_code)?,
            self.name,
            self.address,
            self.district,
        ))
    }
}

/// A distribution point.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ShopView {
    pub id: Uuid,
    pub shop_code: String,
    pub name: String,
    pub address: Option<String>,
    pub district: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<RationShop> for ShopView {
    fn from(s: RationShop) -> Self {
        Self {
            id: *s.id.as_uuid(),
            shop_code: s.shop_code.to_string(),
            name: s.name,
            address: s.address,
            district: s.district,
            created_at: s.created_at,
        }
    }
}

/// POST /v1/shops: Add a shop.
#[utoipa::path(
    post,
    path = "/v1/shops",
    request_body = CreateShopRequest,
    responses(
        (status = 201, description = "Created", body = ShopView),
        (status = 409, description = "Shop code already exists", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid fields", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
async fn create_shop(
    State(state): State<AppState>,
    body: Result<Json<CreateShopRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ShopView>), AppError> {
    let (code, name, address, district) = extract_validated_json(body)?;
    let shop = state
        .engine
        .create_shop(code, name, address, district)
        .await?;
    Ok((StatusCode::CREATED, Json(shop.into())))
}

/// GET /v1/shops: All shops by code.
#[utoipa::path(
    get,
    path = "/v1/shops",
    responses((status = 200, description = "Shops", body = Vec<ShopView>)),
    tag = "admin"
)]
async fn list_shops(State(state): State<AppState>) -> Result<Json<Vec<ShopView>>, AppError> {
    let shops = state.engine.list_shops().await?;
    Ok(Json(shops.into_iter().map(ShopView::from).collect()))
}

// ---------------------------------------------------------------------------
// Cycles
// ---------------------------------------------------------------------------

/// New cycle.
#[derive(Debug, Deserialize, ToSchema)]
pub struct OpenCycleRequest {
    pub name: String,
    /// First day, `YYYY-MM-DD`.
    pub start_date: NaiveDate,
    /// Last day, inclusive.
    pub end_date: NaiveDate,
}

impl Validate for OpenCycleRequest {
    type Output = (String, CycleWindow);

    fn validate(self) -> Result<Self::Output, AppError> {
        Ok((self.name, CycleWindow::new(self.start_date, self.end_date)?))
    }
}

/// Close request.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CloseCycleRequest {
    /// `completed` or `cancelled`.
    pub status: String,
}

impl Validate for CloseCycleRequest {
    type Output = CycleStatus;

    fn validate(self) -> Result<CycleStatus, AppError> {
        Ok(self.status.parse()?)
    }
}

/// A distribution cycle.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CycleView {
    pub id: Uuid,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl From<DistributionCycle> for CycleView {
    fn from(c: DistributionCycle) -> Self {
        Self {
            id: *c.id.as_uuid(),
            name: c.name,
            start_date: c.start_date,
            end_date: c.end_date,
            status: c.status.to_string(),
            created_at: c.created_at,
            closed_at: c.closed_at,
        }
    }
}

/// POST /v1/cycles: Open a cycle.
#[utoipa::path(
    post,
    path = "/v1/cycles",
    request_body = OpenCycleRequest,
    responses(
        (status = 201, description = "Opened", body = CycleView),
        (status = 409, description = "Another cycle is active", body = crate::error::ErrorBody),
        (status = 422, description = "End date before start date", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
async fn open_cycle(
    State(state): State<AppState>,
    body: Result<Json<OpenCycleRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CycleView>), AppError> {
    let (name, window) = extract_validated_json(body)?;
    let cycle = state.engine.open_cycle(name, window).await?;
    Ok((StatusCode::CREATED, Json(cycle.into())))
}

/// GET /v1/cycles: All cycles, newest first.
#[utoipa::path(
    get,
    path = "/v1/cycles",
    responses((status = 200, description = "Cycles", body = Vec<CycleView>)),
    tag = "admin"
)]
async fn list_cycles(State(state): State<AppState>) -> Result<Json<Vec<CycleView>>, AppError> {
    let cycles = state.engine.list_cycles().await?;
    Ok(Json(cycles.into_iter().map(CycleView::from).collect()))
}

/// GET /v1/cycles/active: The single active cycle.
#[utoipa::path(
    get,
    path = "/v1/cycles/active",
    responses(
        (status = 200, description = "Active cycle", body = CycleView),
        (status = 503, description = "No active cycle, or more than one", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
async fn active_cycle(State(state): State<AppState>) -> Result<Json<CycleView>, AppError> {
    Ok(Json(state.engine.active_cycle().await?.into()))
}

/// POST /v1/cycles/:id/close: Complete or cancel the active cycle.
#[utoipa::path(
    post,
    path = "/v1/cycles/{id}/close",
    params(("id" = Uuid, Path, description = "Cycle ID")),
    request_body = CloseCycleRequest,
    responses(
        (status = 200, description = "Closed", body = CycleView),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Cycle already closed", body = crate::error::ErrorBody),
        (status = 422, description = "Status other than completed or cancelled", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
async fn close_cycle(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Result<Json<CloseCycleRequest>, JsonRejection>,
) -> Result<Json<CycleView>, AppError> {
    let target = extract_validated_json(body)?;
    let closed = state
        .engine
        .close_cycle(CycleId::from_uuid(id), target)
        .await?;
    Ok(Json(closed.into()))
}
