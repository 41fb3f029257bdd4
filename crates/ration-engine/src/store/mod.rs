//! # Datastore Ports
//!
//! The engine never holds records between requests; everything goes
//! through these traits. Each trait is object-safe so the API can pick an
//! implementation at startup (Postgres or [`memory::MemoryStore`]).
//!
//! ## Guarantees required from an implementation
//!
//! - `insert_beneficiary` rejects a second record with the same card number
//!   with [`StoreError::UniqueViolation`] ([`UniqueKey::CardNumber`]),
//!   atomically with the insert.
//! - `insert_cycle` rejects a second `active` cycle ([`UniqueKey::ActiveCycle`]).
//! - Conditional writes (status change, escalation, review, cycle close)
//!   apply only when the stored status still equals the expected one and
//!   otherwise report [`Guarded::Stale`] with the current record.
//! - Ledger reads return transactions oldest first, ties in write order.
//! - List reads return newest first, capped by the filter's `limit`.

pub mod memory;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use ration_core::{
    AlertId, AlertStatus, BeneficiaryId, BeneficiaryStatus, CardNumber, CycleId, CycleStatus,
    FaceEmbedding, Severity, ShopId, TransactionId, TransactionStatus,
};
use ration_state::{AlertReview, StatusChange};

use crate::model::{
    Beneficiary, DashboardCounts, DistributionCycle, DuplicateAlert, RationShop, Transaction,
};
use crate::BoxFuture;

/// Result alias for datastore calls.
pub type StoreResult<T> = Result<T, StoreError>;

/// Business keys the datastore keeps unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueKey {
    /// `beneficiaries.card_number`
    CardNumber,
    /// `ration_shops.shop_code`
    ShopCode,
    /// At most one cycle with status `active`.
    ActiveCycle,
    /// Primary key collision.
    RecordId,
}

impl std::fmt::Display for UniqueKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::CardNumber => "card_number",
            Self::ShopCode => "shop_code",
            Self::ActiveCycle => "active_cycle",
            Self::RecordId => "id",
        })
    }
}

/// Datastore failures.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A uniqueness guarantee rejected the write.
    #[error("unique constraint on {0} violated")]
    UniqueViolation(UniqueKey),

    /// A write referenced a record that does not exist.
    #[error("referenced {0} does not exist")]
    MissingReference(&'static str),

    /// A stored row could not be mapped back into a record.
    #[error("stored record is invalid: {0}")]
    Corrupt(String),

    /// The datastore could not be reached or failed the statement.
    #[error("datastore unavailable: {0}")]
    Unavailable(String),
}

/// Outcome of a conditional write.
#[derive(Debug, Clone, PartialEq)]
pub enum Guarded<T> {
    /// The write applied; the updated record.
    Applied(T),
    /// The record exists but no longer has the expected status.
    Stale(T),
    /// No such record.
    Missing,
}

/// Filter for beneficiary listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeneficiaryFilter {
    /// Only this status.
    pub status: Option<BeneficiaryStatus>,
    /// Maximum rows.
    pub limit: usize,
}

/// Filter for transaction listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionFilter {
    /// Only this cycle.
    pub cycle_id: Option<CycleId>,
    /// Only this shop.
    pub shop_id: Option<ShopId>,
    /// Only this status.
    pub status: Option<TransactionStatus>,
    /// Maximum rows.
    pub limit: usize,
}

/// Filter for alert listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertFilter {
    /// Only this review status.
    pub status: Option<AlertStatus>,
    /// Only this severity.
    pub severity: Option<Severity>,
    /// Maximum rows.
    pub limit: usize,
}

/// Identity Registry storage.
pub trait BeneficiaryStore: Send + Sync {
    /// Insert a new beneficiary; card number must be unused.
    fn insert_beneficiary<'a>(
        &'a self,
        beneficiary: &'a Beneficiary,
    ) -> BoxFuture<'a, StoreResult<()>>;

    /// Exact lookup on the card number.
    fn beneficiary_by_card<'a>(
        &'a self,
        card_number: &'a CardNumber,
    ) -> BoxFuture<'a, StoreResult<Option<Beneficiary>>>;

    /// Apply a status change if the stored status still equals
    /// `change.from_status`, appending the change to the status log.
    fn apply_status_change<'a>(
        &'a self,
        change: &'a StatusChange,
    ) -> BoxFuture<'a, StoreResult<Guarded<Beneficiary>>>;

    /// Replace the reference embedding.
    fn replace_reference_embedding<'a>(
        &'a self,
        id: BeneficiaryId,
        embedding: &'a FaceEmbedding,
        at: DateTime<Utc>,
    ) -> BoxFuture<'a, StoreResult<Option<Beneficiary>>>;

    /// Status log, oldest first.
    fn status_history(&self, id: BeneficiaryId) -> BoxFuture<'_, StoreResult<Vec<StatusChange>>>;

    /// Newest first.
    fn list_beneficiaries(
        &self,
        filter: BeneficiaryFilter,
    ) -> BoxFuture<'_, StoreResult<Vec<Beneficiary>>>;
}

/// Shops and distribution cycles.
pub trait ReferenceStore: Send + Sync {
    /// Insert a shop; shop code must be unused.
    fn insert_shop<'a>(&'a self, shop: &'a RationShop) -> BoxFuture<'a, StoreResult<()>>;

    /// Shop by id.
    fn shop(&self, id: ShopId) -> BoxFuture<'_, StoreResult<Option<RationShop>>>;

    /// All shops ordered by code.
    fn list_shops(&self) -> BoxFuture<'_, StoreResult<Vec<RationShop>>>;

    /// Insert a cycle; at most one may be active.
    fn insert_cycle<'a>(&'a self, cycle: &'a DistributionCycle) -> BoxFuture<'a, StoreResult<()>>;

    /// Cycle by id.
    fn cycle(&self, id: CycleId) -> BoxFuture<'_, StoreResult<Option<DistributionCycle>>>;

    /// Every cycle whose status is `active` (normally zero or one).
    fn active_cycles(&self) -> BoxFuture<'_, StoreResult<Vec<DistributionCycle>>>;

    /// All cycles, newest first.
    fn list_cycles(&self) -> BoxFuture<'_, StoreResult<Vec<DistributionCycle>>>;

    /// Close an `active` cycle as `target`.
    fn close_cycle(
        &self,
        id: CycleId,
        target: CycleStatus,
        at: DateTime<Utc>,
    ) -> BoxFuture<'_, StoreResult<Guarded<DistributionCycle>>>;
}

/// Transaction Ledger storage. No delete; the only update is escalation.
pub trait LedgerStore: Send + Sync {
    /// Append a transaction.
    fn append_transaction<'a>(
        &'a self,
        transaction: &'a Transaction,
    ) -> BoxFuture<'a, StoreResult<()>>;

    /// Rewrite status `success` to `flagged`.
    fn escalate_transaction(
        &self,
        id: TransactionId,
    ) -> BoxFuture<'_, StoreResult<Guarded<Transaction>>>;

    /// Transaction by id.
    fn transaction(&self, id: TransactionId) -> BoxFuture<'_, StoreResult<Option<Transaction>>>;

    /// Same card, same cycle, oldest first.
    fn transactions_by_card_in_cycle<'a>(
        &'a self,
        card_number: &'a CardNumber,
        cycle_id: CycleId,
    ) -> BoxFuture<'a, StoreResult<Vec<Transaction>>>;

    /// Same beneficiary, same cycle, oldest first.
    fn transactions_by_beneficiary_in_cycle(
        &self,
        beneficiary_id: BeneficiaryId,
        cycle_id: CycleId,
    ) -> BoxFuture<'_, StoreResult<Vec<Transaction>>>;

    /// Whole cycle, oldest first.
    fn transactions_in_cycle(
        &self,
        cycle_id: CycleId,
    ) -> BoxFuture<'_, StoreResult<Vec<Transaction>>>;

    /// Newest first.
    fn list_transactions(
        &self,
        filter: TransactionFilter,
    ) -> BoxFuture<'_, StoreResult<Vec<Transaction>>>;
}

/// Duplicate alert storage.
pub trait AlertStore: Send + Sync {
    /// Insert one alert.
    fn insert_alert<'a>(&'a self, alert: &'a DuplicateAlert) -> BoxFuture<'a, StoreResult<()>>;

    /// Alert by id.
    fn alert(&self, id: AlertId) -> BoxFuture<'_, StoreResult<Option<DuplicateAlert>>>;

    /// Alerts raised by the given transactions, in rule order per transaction.
    fn alerts_for_transactions<'a>(
        &'a self,
        transaction_ids: &'a [TransactionId],
    ) -> BoxFuture<'a, StoreResult<Vec<DuplicateAlert>>>;

    /// Record a review if the alert is still `pending`.
    fn review_alert<'a>(
        &'a self,
        id: AlertId,
        review: &'a AlertReview,
    ) -> BoxFuture<'a, StoreResult<Guarded<DuplicateAlert>>>;

    /// Newest first.
    fn list_alerts(&self, filter: AlertFilter) -> BoxFuture<'_, StoreResult<Vec<DuplicateAlert>>>;
}

/// Aggregate counts for dashboards.
pub trait DashboardStore: Send + Sync {
    /// Count records by status and severity.
    fn dashboard_counts(&self) -> BoxFuture<'_, StoreResult<DashboardCounts>>;
}

/// One handle per component port.
///
/// Usually all five point at the same datastore ([`Stores::shared`]); tests
/// swap a single port to inject faults.
#[derive(Clone)]
pub struct Stores {
    /// Identity Registry storage.
    pub beneficiaries: Arc<dyn BeneficiaryStore>,
    /// Shops and cycles.
    pub reference: Arc<dyn ReferenceStore>,
    /// Transaction Ledger storage.
    pub ledger: Arc<dyn LedgerStore>,
    /// Alert storage.
    pub alerts: Arc<dyn AlertStore>,
    /// Dashboard aggregates.
    pub dashboard: Arc<dyn DashboardStore>,
}

impl Stores {
    /// Point every port at one datastore.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: BeneficiaryStore + ReferenceStore + LedgerStore + AlertStore + DashboardStore + 'static,
    {
        Self {
            beneficiaries: store.clone(),
            reference: store.clone(),
            ledger: store.clone(),
            alerts: store.clone(),
            dashboard: store,
        }
    }
}

impl std::fmt::Debug for Stores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stores").finish_non_exhaustive()
    }
}
