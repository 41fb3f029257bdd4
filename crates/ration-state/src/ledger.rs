//! Ledger status escalation.
//!
//! A transaction is written once with its provisional status. The only
//! rewrite ever allowed is `success → flagged`, applied when a duplicate
//! rule fires for the attempt that was just written.

use ration_core::TransactionStatus;

use crate::error::TransitionError;

/// Validate escalating a written transaction to `flagged`.
pub fn escalate(current: TransactionStatus) -> Result<TransactionStatus, TransitionError> {
    match current {
        TransactionStatus::Success => Ok(TransactionStatus::Flagged),
        other => Err(TransitionError::new(
            "transaction",
            other,
            TransactionStatus::Flagged,
            "only successful transactions can be flagged",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_success_escalates() {
        assert_eq!(escalate(TransactionStatus::Success), Ok(TransactionStatus::Flagged));
        assert!(escalate(TransactionStatus::Failed).is_err());
        assert!(escalate(TransactionStatus::Flagged).is_err());
    }
}
