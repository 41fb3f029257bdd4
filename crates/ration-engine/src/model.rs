//! Records of the verification data model.
//!
//! Every record is built from already-validated `ration-core` values, so a
//! record in memory is a record the datastore will accept.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use ration_core::{
    AlertId, AlertStatus, AlertType, BeneficiaryId, BeneficiaryStatus, CardNumber, Confidence,
    CycleId, CycleStatus, FaceEmbedding, FaceSample, RejectionReason, Severity, ShopCode, ShopId,
    StaffRef, TransactionId, TransactionStatus, ValidationError,
};
use ration_state::CycleWindow;

/// Trim, drop when blank, and bound the length.
fn optional_text(
    value: Option<String>,
    field: &'static str,
    max: usize,
) -> Result<Option<String>, ValidationError> {
    let value = value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    if let Some(v) = &value {
        if v.chars().count() > max {
            return Err(ValidationError::FieldTooLong { field, max });
        }
    }
    Ok(value)
}

/// Personal attributes captured at registration.
///
/// Only [`IdentityFields::new`] builds one, so a value always holds a
/// non-empty name and a well-formed phone number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityFields {
    name: String,
    phone: Option<String>,
    address: Option<String>,
}

impl IdentityFields {
    /// Validate and normalize registration attributes.
    pub fn new(
        name: impl Into<String>,
        phone: Option<String>,
        address: Option<String>,
    ) -> Result<Self, ValidationError> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(ValidationError::MissingField { field: "name" });
        }
        if name.chars().count() > 120 {
            return Err(ValidationError::FieldTooLong {
                field: "name",
                max: 120,
            });
        }
        let phone = optional_text(phone, "phone", 20)?;
        if let Some(p) = &phone {
            if !p
                .chars()
                .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' '))
            {
                return Err(ValidationError::InvalidPhone(p.clone()));
            }
        }
        Ok(Self {
            name,
            phone,
            address: optional_text(address, "address", 500)?,
        })
    }

    /// Name as printed on the card.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Contact number.
    pub fn phone(&self) -> Option<&str> {
        self.phone.as_deref()
    }

    /// Postal address.
    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub(crate) fn into_parts(self) -> (String, Option<String>, Option<String>) {
        (self.name, self.phone, self.address)
    }
}

/// A registered ration-card holder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Beneficiary {
    /// Record identifier.
    pub id: BeneficiaryId,
    /// Unique, immutable business key.
    pub card_number: CardNumber,
    /// Name as printed on the card.
    pub name: String,
    /// Contact number.
    pub phone: Option<String>,
    /// Postal address.
    pub address: Option<String>,
    /// Reference face representation.
    pub reference_embedding: FaceEmbedding,
    /// Eligibility.
    pub status: BeneficiaryStatus,
    /// Registration time.
    pub created_at: DateTime<Utc>,
    /// Last status change or reference replacement.
    pub updated_at: DateTime<Utc>,
}

impl Beneficiary {
    /// Whether this beneficiary may collect rations.
    pub fn is_active(&self) -> bool {
        self.status == BeneficiaryStatus::Active
    }
}

/// A distribution point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RationShop {
    /// Record identifier.
    pub id: ShopId,
    /// Unique public code.
    pub shop_code: ShopCode,
    /// Display name.
    pub name: String,
    /// Street address.
    pub address: Option<String>,
    /// Administrative district.
    pub district: Option<String>,
    /// When the shop was added.
    pub created_at: DateTime<Utc>,
}

impl RationShop {
    /// Build a new shop record.
    pub fn new(
        shop_code: ShopCode,
        name: impl Into<String>,
        address: Option<String>,
        district: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(ValidationError::MissingField { field: "name" });
        }
        Ok(Self {
            id: ShopId::new(),
            shop_code,
            name,
            address: optional_text(address, "address", 500)?,
            district: optional_text(district, "district", 120)?,
            created_at,
        })
    }
}

/// A period during which each beneficiary is expected to collect once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionCycle {
    /// Record identifier.
    pub id: CycleId,
    /// Label, e.g. "March 2026".
    pub name: String,
    /// First day.
    pub start_date: NaiveDate,
    /// Last day.
    pub end_date: NaiveDate,
    /// Lifecycle status.
    pub status: CycleStatus,
    /// When the cycle was opened.
    pub created_at: DateTime<Utc>,
    /// When the cycle was completed or cancelled.
    pub closed_at: Option<DateTime<Utc>>,
}

impl DistributionCycle {
    /// A freshly opened, active cycle.
    pub fn open(
        name: impl Into<String>,
        window: CycleWindow,
        created_at: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(ValidationError::MissingField { field: "name" });
        }
        Ok(Self {
            id: CycleId::new(),
            name,
            start_date: window.start_date,
            end_date: window.end_date,
            status: CycleStatus::Active,
            created_at,
            closed_at: None,
        })
    }
}

/// One verification attempt. Immutable once written, except for the single
/// `success → flagged` escalation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Assigned by the ledger.
    pub id: TransactionId,
    /// Absent when the card number is not registered.
    pub beneficiary_id: Option<BeneficiaryId>,
    /// Card number as presented.
    pub card_number: CardNumber,
    /// Where the attempt happened.
    pub shop_id: ShopId,
    /// Cycle the attempt belongs to.
    pub cycle_id: CycleId,
    /// Shop operator who submitted the attempt.
    pub operator_id: StaffRef,
    /// Absent when no comparison took place.
    pub face_match_confidence: Option<Confidence>,
    /// Derived outcome.
    pub status: TransactionStatus,
    /// Set when `status` is `failed`.
    pub rejection_reason: Option<RejectionReason>,
    /// Items handed over, as submitted by the shop.
    pub items_collected: Vec<serde_json::Value>,
    /// Assigned by the ledger.
    pub created_at: DateTime<Utc>,
}

/// A fraud signal awaiting or after human review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateAlert {
    /// Record identifier.
    pub id: AlertId,
    /// Which rule fired.
    pub alert_type: AlertType,
    /// Fixed by `alert_type`.
    pub severity: Severity,
    /// Review status.
    pub status: AlertStatus,
    /// Triggering transaction.
    pub transaction_id: TransactionId,
    /// Conflicting earlier transaction, where the rule names one.
    pub previous_transaction_id: Option<TransactionId>,
    /// Beneficiary of the triggering transaction.
    pub beneficiary_id: Option<BeneficiaryId>,
    /// Card number of the triggering transaction.
    pub card_number: CardNumber,
    /// Shop of the triggering transaction.
    pub shop_id: ShopId,
    /// Human-readable explanation.
    pub description: String,
    /// When the rule fired.
    pub created_at: DateTime<Utc>,
    /// Reviewer, once reviewed.
    pub reviewed_by: Option<StaffRef>,
    /// Review time, once reviewed.
    pub reviewed_at: Option<DateTime<Utc>>,
}

/// Alert as reported back to the shop in a verification result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertSummary {
    /// Absent if the alert could not be persisted.
    pub alert_id: Option<AlertId>,
    /// Which rule fired.
    pub alert_type: AlertType,
    /// Severity.
    pub severity: Severity,
    /// Human-readable explanation.
    pub description: String,
    /// Conflicting earlier transaction.
    pub previous_transaction_id: Option<TransactionId>,
}

/// Input to a verification.
#[derive(Debug, Clone)]
pub struct VerificationRequest {
    /// Card presented at the counter.
    pub card_number: CardNumber,
    /// Shop where the attempt is made.
    pub shop_id: ShopId,
    /// Freshly captured face.
    pub face_sample: FaceSample,
    /// Operator submitting the attempt.
    pub operator_id: StaffRef,
    /// Items to hand over.
    pub items_collected: Vec<serde_json::Value>,
}

/// Outcome of a verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    /// Whether rations may be handed over.
    pub accepted: bool,
    /// The ledger entry written for this attempt.
    pub transaction_id: TransactionId,
    /// Resolved beneficiary, if the card is registered.
    pub beneficiary_id: Option<BeneficiaryId>,
    /// Final derived status.
    pub transaction_status: TransactionStatus,
    /// Face confidence, when a comparison took place.
    pub confidence: Option<Confidence>,
    /// Raised signals, in rule order.
    pub alerts: Vec<AlertSummary>,
    /// Message for the operator.
    pub message: String,
    /// Why the attempt failed, when it did.
    pub rejection_reason: Option<RejectionReason>,
}

/// Aggregate counts for the monitoring dashboard, computed on demand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardCounts {
    /// All registered beneficiaries.
    pub total_beneficiaries: u64,
    /// Beneficiaries with status `active`.
    pub active_beneficiaries: u64,
    /// Beneficiaries with status `suspended`.
    pub suspended_beneficiaries: u64,
    /// Beneficiaries with status `blocked`.
    pub blocked_beneficiaries: u64,
    /// All ledger entries.
    pub total_transactions: u64,
    /// Transactions with status `success`.
    pub successful_transactions: u64,
    /// Transactions with status `flagged`.
    pub flagged_transactions: u64,
    /// Transactions with status `failed`.
    pub failed_transactions: u64,
    /// Alerts awaiting review.
    pub pending_alerts: u64,
    /// Pending alerts with severity `critical`.
    pub critical_alerts: u64,
    /// Pending alerts with severity `high`.
    pub high_alerts: u64,
    /// Pending alerts with severity `medium`.
    pub medium_alerts: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_fields_trim_and_require_name() {
        let f = IdentityFields::new("  Asha Devi ", Some(" ".into()), Some(" Ward 4 ".into()))
            .unwrap();
        assert_eq!(f.name(), "Asha Devi");
        assert_eq!(f.phone(), None);
        assert_eq!(f.address(), Some("Ward 4"));
        assert_eq!(
            IdentityFields::new("  ", None, None),
            Err(ValidationError::MissingField { field: "name" })
        );
    }

    #[test]
    fn identity_fields_check_phone_alphabet() {
        assert!(IdentityFields::new("A", Some("+91 98300-12345".into()), None).is_ok());
        assert!(IdentityFields::new("A", Some("call me".into()), None).is_err());
    }

    #[test]
    fn opened_cycle_is_active() {
        let w = CycleWindow::new(
            NaiveDate::from_ymd_opt(2026, 4, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 4, 30).unwrap(),
        )
        .unwrap();
        let c = DistributionCycle::open("April 2026", w, Utc::now()).unwrap();
        assert_eq!(c.status, CycleStatus::Active);
        assert!(c.closed_at.is_none());
    }
}
