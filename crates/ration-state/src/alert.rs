//! Alert review lifecycle.
//!
//! ```text
//! pending ──► resolved   (terminal)
//!    │
//!    └──────► dismissed  (terminal)
//! ```
//!
//! `reviewed` exists in the vocabulary for records imported from older
//! deployments but no review action produces or consumes it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ration_core::{AlertStatus, StaffRef};

use crate::error::TransitionError;

/// A reviewer's decision on one alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertReview {
    /// Target status, already checked by [`review_target`].
    pub status: AlertStatus,
    /// Who reviewed.
    pub reviewed_by: StaffRef,
    /// When.
    pub reviewed_at: DateTime<Utc>,
}

/// Validate a review request against the alert's current status.
///
/// Returns the new status on success.
pub fn review_target(
    current: AlertStatus,
    requested: AlertStatus,
) -> Result<AlertStatus, TransitionError> {
    if !requested.is_terminal() {
        return Err(TransitionError::new(
            "alert",
            current,
            requested,
            "a review must resolve or dismiss the alert",
        ));
    }
    if current != AlertStatus::Pending {
        return Err(TransitionError::new(
            "alert",
            current,
            requested,
            "only pending alerts can be reviewed",
        ));
    }
    Ok(requested)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_can_be_resolved_or_dismissed() {
        assert_eq!(
            review_target(AlertStatus::Pending, AlertStatus::Resolved),
            Ok(AlertStatus::Resolved)
        );
        assert_eq!(
            review_target(AlertStatus::Pending, AlertStatus::Dismissed),
            Ok(AlertStatus::Dismissed)
        );
    }

    #[test]
    fn terminal_alerts_cannot_be_reviewed_again() {
        for current in [AlertStatus::Resolved, AlertStatus::Dismissed, AlertStatus::Reviewed] {
            let err = review_target(current, AlertStatus::Resolved).unwrap_err();
            assert_eq!(err.machine, "alert");
            assert_eq!(err.from, current.as_str());
        }
    }

    #[test]
    fn review_must_target_a_terminal_status() {
        assert!(review_target(AlertStatus::Pending, AlertStatus::Reviewed).is_err());
        assert!(review_target(AlertStatus::Pending, AlertStatus::Pending).is_err());
    }
}
