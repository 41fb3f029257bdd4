//! # OpenAPI Specification Assembly
//!
//! Assembles all utoipa-documented routes into a single OpenAPI 3.1 spec,
//! served at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::state::AppState;

/// Assembled OpenAPI spec for the entire API surface.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Ration Verification API",
        version = "0.1.0",
        description = "Face verification and duplicate detection for ration-card distribution.\n\nEvery counter attempt is recorded in an append-only ledger. Accepted attempts are checked against the cycle history and suspicious ones are flagged for review.\n\nHealth probes (`/health/*`) and `/metrics` sit outside `/v1`."
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development server"),
    ),
    paths(
        // ── Verification ────────────────────────────────────────────────
        crate::routes::verify::verify,
        // ── Beneficiaries ───────────────────────────────────────────────
        crate::routes::beneficiaries::register_beneficiary,
        crate::routes::beneficiaries::list_beneficiaries,
        crate::routes::beneficiaries::get_beneficiary,
        crate::routes::beneficiaries::set_status,
        crate::routes::beneficiaries::replace_reference_face,
        crate::routes::beneficiaries::status_history,
        // ── Transactions ────────────────────────────────────────────────
        crate::routes::transactions::list_transactions,
        crate::routes::transactions::get_transaction,
        // ── Alerts ──────────────────────────────────────────────────────
        crate::routes::alerts::list_alerts,
        crate::routes::alerts::get_alert,
        crate::routes::alerts::review_alert,
        // ── Admin ───────────────────────────────────────────────────────
        crate::routes::admin::create_shop,
        crate::routes::admin::list_shops,
        crate::routes::admin::open_cycle,
        crate::routes::admin::list_cycles,
        crate::routes::admin::active_cycle,
        crate::routes::admin::close_cycle,
        // ── Reports ─────────────────────────────────────────────────────
        crate::routes::reports::dashboard_stats,
        crate::routes::reports::reconciliation,
    ),
    components(
        schemas(
            crate::error::ErrorBody,
            crate::error::ErrorDetail,
            crate::routes::verify::VerifyRequest,
            crate::routes::verify::VerificationResponse,
            crate::routes::verify::AlertSummaryView,
            crate::routes::beneficiaries::RegisterBeneficiaryRequest,
            crate::routes::beneficiaries::SetStatusRequest,
            crate::routes::beneficiaries::ReplaceFaceRequest,
            crate::routes::beneficiaries::BeneficiaryView,
            crate::routes::beneficiaries::StatusChangeView,
            crate::routes::transactions::TransactionView,
            crate::routes::transactions::TransactionDetailView,
            crate::routes::alerts::ReviewAlertRequest,
            crate::routes::alerts::AlertView,
            crate::routes::admin::CreateShopRequest,
            crate::routes::admin::ShopView,
            crate::routes::admin::OpenCycleRequest,
            crate::routes::admin::CloseCycleRequest,
            crate::routes::admin::CycleView,
            crate::routes::reports::DashboardView,
            crate::routes::reports::FindingView,
            crate::routes::reports::ReconciliationView,
        ),
    ),
    tags(
        (name = "verification", description = "Counter verification: identity, face match and duplicate rules"),
        (name = "beneficiaries", description = "Beneficiary registry, eligibility status and reference faces"),
        (name = "transactions", description = "Append-only distribution ledger"),
        (name = "alerts", description = "Duplicate alerts and their review"),
        (name = "admin", description = "Ration shops and distribution cycles"),
        (name = "reports", description = "Dashboard counts and reconciliation"),
    )
)]
pub struct ApiDoc;

/// Build the OpenAPI router.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

/// GET /openapi.json: Return the generated OpenAPI specification.
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_spec_generates_successfully() {
        let spec = ApiDoc::openapi();
        assert_eq!(spec.info.title, "Ration Verification API");
    }

    #[test]
    fn test_openapi_spec_has_verify_path() {
        let spec = ApiDoc::openapi();
        assert!(spec.paths.paths.contains_key("/v1/verify"));
    }

    #[test]
    fn test_openapi_spec_has_review_paths() {
        let spec = ApiDoc::openapi();
        assert!(spec.paths.paths.contains_key("/v1/alerts/{id}/review"));
        assert!(spec
            .paths
            .paths
            .contains_key("/v1/beneficiaries/{card_number}/status-history"));
        assert!(spec.paths.paths.contains_key("/v1/reconciliation"));
    }

    #[test]
    fn test_openapi_spec_has_error_schema() {
        let spec = ApiDoc::openapi();
        let components = spec.components.expect("components present");
        assert!(components.schemas.contains_key("ErrorBody"));
        assert!(components.schemas.contains_key("VerificationResponse"));
    }
}
