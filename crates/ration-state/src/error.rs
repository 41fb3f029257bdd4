use thiserror::Error;

/// A requested status change that the lifecycle does not permit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {machine} transition from {from} to {to}: {reason}")]
pub struct TransitionError {
    /// Which lifecycle rejected the change (e.g. "alert").
    pub machine: &'static str,
    /// Current status text.
    pub from: String,
    /// Requested status text.
    pub to: String,
    /// Why it was rejected.
    pub reason: String,
}

impl TransitionError {
    pub(crate) fn new(
        machine: &'static str,
        from: impl ToString,
        to: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            machine,
            from: from.to_string(),
            to: to.to_string(),
            reason: reason.into(),
        }
    }
}
