//! # Error Hierarchy
//!
//! Construction-time validation failures and configuration errors, built
//! with `thiserror`.

use thiserror::Error;

/// Errors raised when constructing a domain primitive from untrusted input.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A required text field was empty after trimming.
    #[error("{field} must not be empty")]
    MissingField {
        /// Name of the offending field.
        field: &'static str,
    },

    /// A text field exceeded its maximum length.
    #[error("{field} exceeds {max} characters")]
    FieldTooLong {
        /// Name of the offending field.
        field: &'static str,
        /// Maximum permitted length in characters.
        max: usize,
    },

    /// Card number failed the format check.
    #[error("invalid card number {0:?}: expected 4-32 characters of A-Z, 0-9, '-' or '/'")]
    InvalidCardNumber(String),

    /// Phone number contains characters other than digits, '+', '-' or space.
    #[error("invalid phone number {0:?}")]
    InvalidPhone(String),

    /// Shop code failed the format check.
    #[error("invalid shop code {0:?}: expected 1-32 characters of A-Z, 0-9, '-' or '_'")]
    InvalidShopCode(String),

    /// The face embedding has no components.
    #[error("face embedding must not be empty")]
    EmptyEmbedding,

    /// The face embedding contains NaN or infinity.
    #[error("face embedding component {index} is not a finite number")]
    NonFiniteEmbedding {
        /// Position of the first bad component.
        index: usize,
    },

    /// The face embedding has more components than any supported model emits.
    #[error("face embedding has {dimensions} components, maximum is {max}")]
    EmbeddingTooLarge {
        /// Number of components supplied.
        dimensions: usize,
        /// Maximum supported.
        max: usize,
    },

    /// The face sample is empty.
    #[error("face sample must not be empty")]
    EmptyFaceSample,

    /// The face sample exceeds the accepted size.
    #[error("face sample is {bytes} bytes, maximum is {max}")]
    FaceSampleTooLarge {
        /// Decoded size.
        bytes: usize,
        /// Maximum accepted.
        max: usize,
    },

    /// The face sample is not valid base64.
    #[error("face sample is not valid base64: {0}")]
    InvalidFaceSampleEncoding(String),

    /// A confidence value fell outside `[0, 100]` or was not finite.
    #[error("confidence {0} is outside [0, 100]")]
    ConfidenceOutOfRange(f64),

    /// Text did not match any variant of a closed vocabulary.
    #[error("unknown {kind} {value:?}")]
    UnknownVariant {
        /// Vocabulary name (e.g. "alert status").
        kind: &'static str,
        /// The rejected text.
        value: String,
    },

    /// A date range ends before it starts.
    #[error("end date {end} is before start date {start}")]
    InvalidDateRange {
        /// Range start.
        start: chrono::NaiveDate,
        /// Range end.
        end: chrono::NaiveDate,
    },
}

/// Errors raised while loading [`crate::DetectionConfig`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A recognised option was present but could not be used.
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        /// Environment variable name.
        key: &'static str,
        /// Raw value found.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}
