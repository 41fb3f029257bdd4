//! # Custom Extractors & Validation
//!
//! Provides the [`Validate`] trait for request DTOs and helpers to extract
//! JSON bodies and query strings in handlers.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::Query;
use axum::Json;

use crate::error::AppError;

/// Request types that convert themselves into validated domain values.
///
/// Deserialization only checks JSON shape; `validate` runs the domain
/// constructors (card number format, face sample decoding, ...).
pub trait Validate {
    /// Validated form of the request.
    type Output;

    /// Check business rules and build the validated value.
    fn validate(self) -> Result<Self::Output, AppError>;
}

/// Extract a JSON body, mapping deserialization errors to [`AppError::BadRequest`].
pub fn extract_json<T>(result: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    result
        .map(|Json(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

/// Extract a JSON body and run its [`Validate`] impl.
pub fn extract_validated_json<T: Validate>(
    result: Result<Json<T>, JsonRejection>,
) -> Result<T::Output, AppError> {
    extract_json(result)?.validate()
}

/// Extract query parameters, mapping rejections to [`AppError::BadRequest`].
pub fn extract_query<T>(result: Result<Query<T>, QueryRejection>) -> Result<T, AppError> {
    result
        .map(|Query(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

/// Parse an optional closed-vocabulary query value.
pub fn parse_optional<T>(value: Option<&str>) -> Result<Option<T>, AppError>
where
    T: std::str::FromStr<Err = ration_core::ValidationError>,
{
    value
        .filter(|v| !v.is_empty())
        .map(str::parse)
        .transpose()
        .map_err(AppError::from)
}
