//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Maps [`EngineError`] onto HTTP status codes and a JSON body with an
//! error code, message, and optional details. Internal error details are
//! never returned to clients.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use ration_core::{AlertType, TransactionId};
use ration_engine::{ComparatorError, EngineError};

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "NOT_FOUND", "DUPLICATE_CARD").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Additional context, present only where the code documents it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Request validation failed (422).
    #[error("validation error: {0}")]
    Validation(String),

    /// Request body could not be parsed (422).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Card number already registered (409).
    #[error("{0}")]
    DuplicateCard(String),

    /// Lifecycle rejected the requested status change (409).
    #[error("{0}")]
    InvalidTransition(String),

    /// Conflict with current resource state (409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Deployment misconfigured for the operation, e.g. no active cycle (503).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Transaction recorded but its rule pass, alerts or escalation were not (500).
    #[error("verification recorded with incomplete alerts: transaction {transaction_id}")]
    CompletionInconsistency {
        transaction_id: TransactionId,
        evaluation_failed: bool,
        failed_alert_types: Vec<AlertType>,
        escalation_failed: bool,
    },

    /// Internal server error (500). Message is logged but not returned to client.
    #[error("internal error: {0}")]
    Internal(String),

    /// Face service returned an unusable answer (502).
    #[error("upstream face service error: {0}")]
    UpstreamError(String),

    /// Face service unreachable or timed out (503).
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl AppError {
    /// Return the HTTP status code and machine-readable error code for this error.
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            Self::BadRequest(_) => (StatusCode::UNPROCESSABLE_ENTITY, "BAD_REQUEST"),
            Self::DuplicateCard(_) => (StatusCode::CONFLICT, "DUPLICATE_CARD"),
            Self::InvalidTransition(_) => (StatusCode::CONFLICT, "INVALID_TRANSITION"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::Configuration(_) => (StatusCode::SERVICE_UNAVAILABLE, "CONFIGURATION_ERROR"),
            Self::CompletionInconsistency { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "COMPLETION_INCONSISTENCY")
            }
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            Self::UpstreamError(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
            Self::ServiceUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE"),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::CompletionInconsistency {
                transaction_id,
                evaluation_failed,
                failed_alert_types,
                escalation_failed,
            } => Some(serde_json::json!({
                "transaction_id": transaction_id,
                "evaluation_failed": evaluation_failed,
                "failed_alert_types": failed_alert_types,
                "escalation_failed": escalation_failed,
            })),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            Self::UpstreamError(_) => "The face service returned an invalid response".to_string(),
            other => other.to_string(),
        };

        match &self {
            Self::Internal(_) => tracing::error!(error = %self, "internal server error"),
            Self::UpstreamError(_) => tracing::error!(error = %self, "upstream face service error"),
            Self::CompletionInconsistency {
                transaction_id,
                evaluation_failed,
                failed_alert_types,
                ..
            } => tracing::error!(
                transaction_id = %transaction_id,
                evaluation_failed = evaluation_failed,
                failed_alert_types = ?failed_alert_types,
                "completion inconsistency returned to caller"
            ),
            Self::ServiceUnavailable(_) | Self::Configuration(_) => {
                tracing::warn!(error = %self, "service unavailable")
            }
            _ => {}
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details: self.details(),
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<ration_core::ValidationError> for AppError {
    fn from(err: ration_core::ValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<ComparatorError> for AppError {
    fn from(err: ComparatorError) -> Self {
        match err {
            ComparatorError::NoFaceDetected => Self::Validation("No face detected in image".into()),
            ComparatorError::Unavailable { .. } | ComparatorError::Timeout { .. } => {
                Self::ServiceUnavailable(err.to_string())
            }
            ComparatorError::InvalidResponse { .. }
            | ComparatorError::IncompatibleEmbeddings { .. } => {
                Self::UpstreamError(err.to_string())
            }
        }
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Validation(msg) => Self::Validation(msg),
            EngineError::DuplicateCard(_) => Self::DuplicateCard(err.to_string()),
            EngineError::NotFound { .. } => Self::NotFound(err.to_string()),
            EngineError::InvalidTransition(e) => Self::InvalidTransition(e.to_string()),
            EngineError::Conflict(msg) => Self::Conflict(msg),
            EngineError::Configuration(msg) => Self::Configuration(msg),
            EngineError::FaceService(e) => e.into(),
            EngineError::CompletionInconsistency(c) => Self::CompletionInconsistency {
                transaction_id: c.transaction_id,
                evaluation_failed: c.evaluation_failed,
                failed_alert_types: c.failed_alert_types,
                escalation_failed: c.escalation_failed,
            },
            EngineError::Store(e) => Self::Internal(e.to_string()),
        }
    }
}
