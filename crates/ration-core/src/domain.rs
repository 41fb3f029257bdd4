//! # Domain Vocabularies
//!
//! Closed sets of statuses and classifications. Each enum has exactly one
//! text form, used for JSON (`snake_case`) and for the datastore's
//! CHECK-constrained text columns, so the two can never diverge.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

macro_rules! closed_vocabulary {
    (
        $(#[$meta:meta])*
        $name:ident ($kind:literal) {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Canonical text form.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $name::$variant => $text ),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $text => Ok($name::$variant), )+
                    other => Err(ValidationError::UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

closed_vocabulary!(
    /// Registration status of a beneficiary. Only `active` beneficiaries
    /// can collect rations.
    BeneficiaryStatus("beneficiary status") {
        /// Eligible to collect.
        Active => "active",
        /// Temporarily barred.
        Suspended => "suspended",
        /// Permanently barred pending investigation.
        Blocked => "blocked",
    }
);

closed_vocabulary!(
    /// Lifecycle status of a distribution cycle.
    CycleStatus("cycle status") {
        /// The one cycle currently accepting collections.
        Active => "active",
        /// Closed normally.
        Completed => "completed",
        /// Closed without completing.
        Cancelled => "cancelled",
    }
);

closed_vocabulary!(
    /// Outcome recorded on a ledger transaction.
    TransactionStatus("transaction status") {
        /// Face accepted, no duplicate rule fired.
        Success => "success",
        /// Card unknown, beneficiary inactive, face rejected or unverifiable.
        Failed => "failed",
        /// Face accepted but at least one duplicate rule fired.
        Flagged => "flagged",
    }
);

impl TransactionStatus {
    /// Whether rations were handed over (face accepted).
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Success | Self::Flagged)
    }
}

closed_vocabulary!(
    /// Fraud signal raised by the duplicate rule evaluator.
    AlertType("alert type") {
        /// Accepted collection at a second shop in the same cycle.
        DuplicateLocation => "duplicate_location",
        /// Known card presented by a face below the match threshold.
        DifferentPerson => "different_person",
        /// Accepted collections beyond the per-cycle limit.
        MultipleAttempts => "multiple_attempts",
        /// Repeat attempt inside the duplicate time window.
        SuspiciousTiming => "suspicious_timing",
    }
);

impl AlertType {
    /// Fixed severity attached to each signal.
    pub fn severity(&self) -> Severity {
        match self {
            Self::DifferentPerson => Severity::Critical,
            Self::DuplicateLocation | Self::MultipleAttempts => Severity::High,
            Self::SuspiciousTiming => Severity::Medium,
        }
    }
}

closed_vocabulary!(
    /// Alert severity, ordered from least to most severe.
    Severity("severity") {
        /// Informational.
        Low => "low",
        /// Worth a look.
        Medium => "medium",
        /// Likely fraud.
        High => "high",
        /// Probable impersonation.
        Critical => "critical",
    }
);

closed_vocabulary!(
    /// Review status of a duplicate alert.
    AlertStatus("alert status") {
        /// Awaiting review.
        Pending => "pending",
        /// Seen but not closed.
        Reviewed => "reviewed",
        /// Confirmed and acted upon. Terminal.
        Resolved => "resolved",
        /// Judged a false positive. Terminal.
        Dismissed => "dismissed",
    }
);

impl AlertStatus {
    /// Whether no further review is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Dismissed)
    }
}

closed_vocabulary!(
    /// Why a transaction was recorded as `failed`.
    RejectionReason("rejection reason") {
        /// No beneficiary holds this card number.
        CardNotRegistered => "card_not_registered",
        /// The beneficiary is suspended or blocked.
        BeneficiaryInactive => "beneficiary_inactive",
        /// Confidence below the match threshold.
        FaceRejected => "face_rejected",
        /// The captured sample contained no usable face.
        NoFaceDetected => "no_face_detected",
        /// The face comparator could not be reached or timed out.
        FaceServiceUnavailable => "face_service_unavailable",
    }
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_forms_round_trip() {
        for s in AlertType::ALL {
            assert_eq!(s.as_str().parse::<AlertType>().unwrap(), *s);
        }
        for s in RejectionReason::ALL {
            assert_eq!(s.as_str().parse::<RejectionReason>().unwrap(), *s);
        }
    }

    #[test]
    fn serde_uses_the_same_text_as_as_str() {
        for s in AlertStatus::ALL {
            let json = serde_json::to_string(s).unwrap();
            assert_eq!(json, format!("\"{}\"", s.as_str()));
        }
        for s in TransactionStatus::ALL {
            let json = serde_json::to_string(s).unwrap();
            assert_eq!(json, format!("\"{}\"", s.as_str()));
        }
    }

    #[test]
    fn unknown_text_is_a_validation_error() {
        let err = "archived".parse::<AlertStatus>().unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnknownVariant {
                kind: "alert status",
                value: "archived".into()
            }
        );
    }

    #[test]
    fn alert_severities_are_fixed() {
        assert_eq!(AlertType::DifferentPerson.severity(), Severity::Critical);
        assert_eq!(AlertType::DuplicateLocation.severity(), Severity::High);
        assert_eq!(AlertType::MultipleAttempts.severity(), Severity::High);
        assert_eq!(AlertType::SuspiciousTiming.severity(), Severity::Medium);
        assert!(Severity::Critical > Severity::High);
    }

    #[test]
    fn accepted_statuses() {
        assert!(TransactionStatus::Success.is_accepted());
        assert!(TransactionStatus::Flagged.is_accepted());
        assert!(!TransactionStatus::Failed.is_accepted());
    }
}
