//! Engine error type.

use thiserror::Error;

use ration_core::{AlertType, CardNumber, ConfigError, TransactionId, ValidationError};
use ration_state::TransitionError;

use crate::comparator::ComparatorError;
use crate::model::VerificationResult;
use crate::store::StoreError;

/// Errors returned by engine operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Input failed validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The card number is already registered.
    #[error("card number {0} is already registered")]
    DuplicateCard(CardNumber),

    /// A referenced record does not exist.
    #[error("{kind} {key} not found")]
    NotFound {
        /// Record kind.
        kind: &'static str,
        /// Lookup key.
        key: String,
    },

    /// A lifecycle transition was rejected.
    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    /// A uniqueness rule other than card number rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The deployment is not in a state that allows the operation, e.g. no
    /// active distribution cycle.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The face comparator failed outside a verification.
    #[error(transparent)]
    FaceService(#[from] ComparatorError),

    /// A verification wrote its transaction but could not complete its rule
    /// pass, escalation or alerts.
    #[error(transparent)]
    CompletionInconsistency(Box<CompletionInconsistency>),

    /// Datastore failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<ValidationError> for EngineError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e.to_string())
    }
}

impl From<ConfigError> for EngineError {
    fn from(e: ConfigError) -> Self {
        Self::Configuration(e.to_string())
    }
}

impl From<CompletionInconsistency> for EngineError {
    fn from(e: CompletionInconsistency) -> Self {
        Self::CompletionInconsistency(Box::new(e))
    }
}

/// A verification that is durably recorded but whose side effects are
/// incomplete. Carries the result the caller would otherwise have received.
#[derive(Debug, Clone)]
pub struct CompletionInconsistency {
    /// The transaction that was written.
    pub transaction_id: TransactionId,
    /// History could not be read, so no rule ran against the transaction.
    pub evaluation_failed: bool,
    /// Alerts that could not be persisted.
    pub failed_alert_types: Vec<AlertType>,
    /// Whether `success → flagged` could not be applied.
    pub escalation_failed: bool,
    /// The computed outcome, or the outcome as written when no rule ran.
    pub result: VerificationResult,
}

impl std::fmt::Display for CompletionInconsistency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "transaction {} recorded but completion failed",
            self.transaction_id
        )?;
        if self.evaluation_failed {
            f.write_str(": duplicate rules not evaluated")?;
        }
        if self.escalation_failed {
            f.write_str(": escalation to flagged not applied")?;
        }
        if !self.failed_alert_types.is_empty() {
            let types: Vec<&str> = self.failed_alert_types.iter().map(|t| t.as_str()).collect();
            write!(f, ": alerts not persisted [{}]", types.join(", "))?;
        }
        Ok(())
    }
}

impl std::error::Error for CompletionInconsistency {}
