#![deny(missing_docs)]

//! # ration-core — Foundational Types for Ration-Card Verification
//!
//! Every other crate in the workspace depends on this one. It performs no
//! I/O and holds no state; it only defines values that are valid by
//! construction.
//!
//! ## Design Principles
//!
//! 1. **Newtype wrappers for domain primitives.** A [`ShopId`] cannot be
//!    passed where a [`CycleId`] is expected, and a [`CardNumber`] is always
//!    trimmed, upper-cased and format-checked.
//!
//! 2. **Opaque biometrics.** [`FaceEmbedding`] and [`FaceSample`] hide their
//!    representation. Only the comparator adapters look inside.
//!
//! 3. **Closed vocabularies.** Statuses, alert types and severities are
//!    enums with a single text mapping shared by the API and the datastore.
//!
//! 4. **[`ValidationError`] at the boundary.** Malformed input is rejected
//!    when a value is constructed, not re-checked at each call site.

pub mod biometric;
pub mod config;
pub mod domain;
pub mod error;
pub mod identity;

pub use biometric::{Confidence, FaceEmbedding, FaceSample};
pub use config::DetectionConfig;
pub use domain::{
    AlertStatus, AlertType, BeneficiaryStatus, CycleStatus, RejectionReason, Severity,
    TransactionStatus,
};
pub use error::{ConfigError, ValidationError};
pub use identity::{
    AlertId, BeneficiaryId, CardNumber, CycleId, ShopCode, ShopId, StaffRef, TransactionId,
};
