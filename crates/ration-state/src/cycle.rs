//! Distribution cycle lifecycle.
//!
//! A cycle is opened `active` and closed exactly once. The "at most one
//! active cycle" rule spans records, so it lives in the datastore.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use ration_core::{CycleStatus, ValidationError};

use crate::error::TransitionError;

/// Validated date range of a cycle (inclusive on both ends).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleWindow {
    /// First day.
    pub start_date: NaiveDate,
    /// Last day.
    pub end_date: NaiveDate,
}

impl CycleWindow {
    /// Build a window; `end_date` may equal but not precede `start_date`.
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Result<Self, ValidationError> {
        if end_date < start_date {
            return Err(ValidationError::InvalidDateRange {
                start: start_date,
                end: end_date,
            });
        }
        Ok(Self {
            start_date,
            end_date,
        })
    }

    /// Whether `day` falls inside the window.
    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start_date <= day && day <= self.end_date
    }
}

/// Validate closing a cycle.
pub fn close_target(
    current: CycleStatus,
    target: CycleStatus,
) -> Result<CycleStatus, TransitionError> {
    match (current, target) {
        (CycleStatus::Active, CycleStatus::Completed | CycleStatus::Cancelled) => Ok(target),
        (CycleStatus::Active, CycleStatus::Active) => Err(TransitionError::new(
            "cycle",
            current,
            target,
            "a cycle can only be closed as completed or cancelled",
        )),
        _ => Err(TransitionError::new(
            "cycle",
            current,
            target,
            "cycle is already closed",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[test]
    fn window_rejects_inverted_range() {
        assert!(CycleWindow::new(day(10), day(1)).is_err());
        let w = CycleWindow::new(day(1), day(1)).unwrap();
        assert!(w.contains(day(1)));
        assert!(!w.contains(day(2)));
    }

    #[test]
    fn active_closes_once() {
        assert_eq!(
            close_target(CycleStatus::Active, CycleStatus::Completed),
            Ok(CycleStatus::Completed)
        );
        assert_eq!(
            close_target(CycleStatus::Active, CycleStatus::Cancelled),
            Ok(CycleStatus::Cancelled)
        );
        assert!(close_target(CycleStatus::Completed, CycleStatus::Cancelled).is_err());
        assert!(close_target(CycleStatus::Cancelled, CycleStatus::Completed).is_err());
        assert!(close_target(CycleStatus::Active, CycleStatus::Active).is_err());
    }
}
