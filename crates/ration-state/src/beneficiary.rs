//! Beneficiary status changes.
//!
//! Any status may follow any other. What the lifecycle guarantees is that
//! every effective change leaves a [`StatusChange`] behind, and that a
//! request naming the current status is a no-op rather than a logged
//! change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ration_core::{BeneficiaryId, BeneficiaryStatus, StaffRef, ValidationError};

/// Audit record for one beneficiary status change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    /// Whose status changed.
    pub beneficiary_id: BeneficiaryId,
    /// Status before.
    pub from_status: BeneficiaryStatus,
    /// Status after.
    pub to_status: BeneficiaryStatus,
    /// Staff member who made the change.
    pub changed_by: StaffRef,
    /// Free-text justification.
    pub reason: Option<String>,
    /// When the change took effect.
    pub changed_at: DateTime<Utc>,
}

impl StatusChange {
    /// Longest accepted reason.
    pub const MAX_REASON_LEN: usize = 500;

    /// Plan a change from `from` to `to`.
    ///
    /// Returns `Ok(None)` when the statuses are equal.
    pub fn plan(
        beneficiary_id: BeneficiaryId,
        from: BeneficiaryStatus,
        to: BeneficiaryStatus,
        changed_by: StaffRef,
        reason: Option<String>,
        changed_at: DateTime<Utc>,
    ) -> Result<Option<Self>, ValidationError> {
        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        if let Some(r) = &reason {
            if r.chars().count() > Self::MAX_REASON_LEN {
                return Err(ValidationError::FieldTooLong {
                    field: "reason",
                    max: Self::MAX_REASON_LEN,
                });
            }
        }
        if from == to {
            return Ok(None);
        }
        Ok(Some(Self {
            beneficiary_id,
            from_status: from,
            to_status: to,
            changed_by,
            reason,
            changed_at,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staff() -> StaffRef {
        StaffRef::new("district-officer").unwrap()
    }

    #[test]
    fn every_pair_of_distinct_statuses_is_allowed() {
        for from in BeneficiaryStatus::ALL {
            for to in BeneficiaryStatus::ALL {
                let planned = StatusChange::plan(
                    BeneficiaryId::new(),
                    *from,
                    *to,
                    staff(),
                    None,
                    Utc::now(),
                )
                .unwrap();
                assert_eq!(planned.is_some(), from != to, "{from} -> {to}");
            }
        }
    }

    #[test]
    fn blank_reason_is_dropped_and_long_reason_rejected() {
        let change = StatusChange::plan(
            BeneficiaryId::new(),
            BeneficiaryStatus::Active,
            BeneficiaryStatus::Blocked,
            staff(),
            Some("   ".into()),
            Utc::now(),
        )
        .unwrap()
        .unwrap();
        assert_eq!(change.reason, None);

        let err = StatusChange::plan(
            BeneficiaryId::new(),
            BeneficiaryStatus::Active,
            BeneficiaryStatus::Blocked,
            staff(),
            Some("x".repeat(501)),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::FieldTooLong { field: "reason", .. }));
    }
}
