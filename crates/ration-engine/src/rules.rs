//! # Duplicate Rule Evaluator
//!
//! Pure function from the current attempt, its cycle history and the
//! resolved beneficiary to the raised signals and the derived status.
//!
//! | # | Alert | Severity | Fires when | `previous_transaction_id` |
//! |---|-------|----------|------------|---------------------------|
//! | 1 | `different_person` | critical | known card, confidence below threshold | none |
//! | 2 | `duplicate_location` | high | face accepted, prior successful collection by the beneficiary at another shop | latest such |
//! | 3 | `multiple_attempts` | high | face accepted, prior successful collections by the beneficiary `>= MAX_TRANSACTIONS_PER_CYCLE` | earliest such |
//! | 4 | `suspicious_timing` | medium | face accepted, any prior attempt on the card within the window | nearest in time |
//!
//! All applicable rules fire, in table order. Rules 2 and 3 only count
//! prior transactions whose status is `success`; a `flagged` collection is
//! already under review through its own alerts. "Prior" means earlier in
//! the oldest-first history than the current attempt, which is never its
//! own predecessor.
//!
//! Status: `failed` without a beneficiary or when the face is not accepted,
//! `flagged` when rule 2, 3 or 4 fired, otherwise `success`.

use ration_core::{AlertType, DetectionConfig, Severity, TransactionId, TransactionStatus};

use crate::model::{Beneficiary, Transaction};

/// Everything the evaluator looks at.
#[derive(Debug, Clone, Copy)]
pub struct RuleInput<'a> {
    /// The attempt being judged, as written to the ledger.
    pub current: &'a Transaction,
    /// Resolved beneficiary, if the card is registered.
    pub beneficiary: Option<&'a Beneficiary>,
    /// Same card, same cycle, oldest first. May include `current`.
    pub card_history: &'a [Transaction],
    /// Same beneficiary, same cycle, oldest first. May include `current`.
    pub beneficiary_history: &'a [Transaction],
}

/// One raised signal, not yet persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertSpec {
    /// Which rule fired.
    pub alert_type: AlertType,
    /// Fixed by type.
    pub severity: Severity,
    /// Human-readable explanation.
    pub description: String,
    /// Conflicting earlier transaction.
    pub previous_transaction_id: Option<TransactionId>,
}

impl AlertSpec {
    fn new(
        alert_type: AlertType,
        description: String,
        previous_transaction_id: Option<TransactionId>,
    ) -> Self {
        Self {
            alert_type,
            severity: alert_type.severity(),
            description,
            previous_transaction_id,
        }
    }
}

/// Evaluator output.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Raised signals, in rule order.
    pub alerts: Vec<AlertSpec>,
    /// Derived status of the current attempt.
    pub status: TransactionStatus,
    /// Whether the face met the threshold.
    pub face_accepted: bool,
}

impl Evaluation {
    /// Whether any rule other than `different_person` fired.
    pub fn has_duplicate_signal(&self) -> bool {
        self.alerts
            .iter()
            .any(|a| a.alert_type != AlertType::DifferentPerson)
    }
}

/// Entries of `history` that precede `current`.
fn prior<'h>(history: &'h [Transaction], current: &Transaction) -> Vec<&'h Transaction> {
    match history.iter().position(|t| t.id == current.id) {
        Some(idx) => history[..idx]
            .iter()
            .filter(|t| t.cycle_id == current.cycle_id)
            .collect(),
        None => history
            .iter()
            .filter(|t| {
                t.id != current.id
                    && t.cycle_id == current.cycle_id
                    && t.created_at <= current.created_at
            })
            .collect(),
    }
}

/// Run the rule table.
pub fn evaluate(input: &RuleInput<'_>, config: &DetectionConfig) -> Evaluation {
    let current = input.current;
    let Some(beneficiary) = input.beneficiary else {
        return Evaluation {
            alerts: Vec::new(),
            status: TransactionStatus::Failed,
            face_accepted: false,
        };
    };

    let face_accepted = beneficiary.is_active()
        && current
            .face_match_confidence
            .is_some_and(|c| c.meets(config.face_match_threshold));
    let mut alerts = Vec::new();

    if let Some(confidence) = current.face_match_confidence {
        if !confidence.meets(config.face_match_threshold) {
            alerts.push(AlertSpec::new(
                AlertType::DifferentPerson,
                format!(
                    "Face does not match registered beneficiary for card {}: confidence {}% below threshold {:.2}%",
                    current.card_number, confidence, config.face_match_threshold
                ),
                None,
            ));
        }
    }

    if face_accepted {
        let collections: Vec<&Transaction> = prior(input.beneficiary_history, current)
            .into_iter()
            .filter(|t| {
                t.beneficiary_id == Some(beneficiary.id) && t.status == TransactionStatus::Success
            })
            .collect();

        if let Some(elsewhere) = collections
            .iter()
            .rev()
            .find(|t| t.shop_id != current.shop_id)
        {
            alerts.push(AlertSpec::new(
                AlertType::DuplicateLocation,
                format!(
                    "Card {} already collected at another shop in this cycle (transaction {})",
                    current.card_number, elsewhere.id
                ),
                Some(elsewhere.id),
            ));
        }

        let limit = config.max_transactions_per_cycle as usize;
        if collections.len() >= limit {
            if let Some(first) = collections.first() {
                alerts.push(AlertSpec::new(
                    AlertType::MultipleAttempts,
                    format!(
                        "{} prior collection(s) for card {} in this cycle; limit is {}",
                        collections.len(),
                        current.card_number,
                        limit
                    ),
                    Some(first.id),
                ));
            }
        }

        let window = config.time_window();
        if let Some(nearest) = prior(input.card_history, current)
            .into_iter()
            .filter(|t| t.card_number == current.card_number)
            .filter(|t| current.created_at - t.created_at <= window)
            .last()
        {
            let hours = (current.created_at - nearest.created_at).num_seconds() as f64 / 3600.0;
            alerts.push(AlertSpec::new(
                AlertType::SuspiciousTiming,
                format!(
                    "Previous attempt for card {} {:.1} hours earlier (transaction {})",
                    current.card_number, hours, nearest.id
                ),
                Some(nearest.id),
            ));
        }
    }

    let status = if !face_accepted {
        TransactionStatus::Failed
    } else if alerts.is_empty() {
        TransactionStatus::Success
    } else {
        TransactionStatus::Flagged
    };

    Evaluation {
        alerts,
        status,
        face_accepted,
    }
}
