//! # API Route Modules
//!
//! - `verify`: counter verification, the engine's main operation.
//! - `beneficiaries`: registration, lookup, status changes, reference
//!   face replacement.
//! - `transactions`: read-only ledger views.
//! - `alerts`: alert listing and review.
//! - `admin`: shops and distribution cycles.
//! - `reports`: dashboard counts and the reconciliation report.

pub mod admin;
pub mod alerts;
pub mod beneficiaries;
pub mod reports;
pub mod transactions;
pub mod verify;

use ration_core::{CardNumber, StaffRef};

use crate::error::AppError;

/// Parse a card number taken from the path.
pub(crate) fn card_from_path(raw: &str) -> Result<CardNumber, AppError> {
    CardNumber::new(raw).map_err(AppError::from)
}

/// Parse a staff reference from a request field.
pub(crate) fn staff(raw: String) -> Result<StaffRef, AppError> {
    StaffRef::new(raw).map_err(AppError::from)
}
