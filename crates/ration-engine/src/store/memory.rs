//! In-memory datastore.
//!
//! All tables live behind one `parking_lot::RwLock`, so every uniqueness
//! check and conditional write happens under the same write guard as the
//! mutation it protects. Used when `DATABASE_URL` is unset and in tests.

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use ration_core::{
    AlertId, AlertStatus, BeneficiaryId, BeneficiaryStatus, CardNumber, CycleId, CycleStatus,
    FaceEmbedding, Severity, ShopId, TransactionId, TransactionStatus,
};
use ration_state::{AlertReview, StatusChange};

use super::{
    AlertFilter, AlertStore, BeneficiaryFilter, BeneficiaryStore, DashboardStore, Guarded,
    LedgerStore, ReferenceStore, StoreError, StoreResult, TransactionFilter, UniqueKey,
};
use crate::model::{
    Beneficiary, DashboardCounts, DistributionCycle, DuplicateAlert, RationShop, Transaction,
};
use crate::BoxFuture;

#[derive(Debug, Default)]
struct Tables {
    beneficiaries: Vec<Beneficiary>,
    beneficiary_by_card: HashMap<CardNumber, usize>,
    beneficiary_by_id: HashMap<BeneficiaryId, usize>,
    status_log: Vec<StatusChange>,
    shops: Vec<RationShop>,
    cycles: Vec<DistributionCycle>,
    transactions: Vec<Transaction>,
    transaction_by_id: HashMap<TransactionId, usize>,
    alerts: Vec<DuplicateAlert>,
    alert_by_id: HashMap<AlertId, usize>,
}

/// Thread-safe in-memory implementation of every datastore port.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    /// Empty datastore.
    pub fn new() -> Self {
        Self::default()
    }
}

fn ready<'a, T: Send + 'a>(value: T) -> BoxFuture<'a, T> {
    Box::pin(std::future::ready(value))
}

/// Reverse write order, then stable-sort newest first, then cap.
fn newest_first<'t, T, I>(
    rows: I,
    created_at: impl Fn(&T) -> DateTime<Utc>,
    limit: usize,
) -> Vec<T>
where
    T: Clone + 't,
    I: DoubleEndedIterator<Item = &'t T>,
{
    let mut out: Vec<T> = rows.rev().cloned().collect();
    out.sort_by_key(|row| Reverse(created_at(row)));
    out.truncate(limit);
    out
}

/// Stable-sort oldest first; ties keep write order.
fn oldest_first<'t, I>(rows: I) -> Vec<Transaction>
where
    I: Iterator<Item = &'t Transaction>,
{
    let mut out: Vec<Transaction> = rows.cloned().collect();
    out.sort_by_key(|t| t.created_at);
    out
}

impl BeneficiaryStore for MemoryStore {
    fn insert_beneficiary<'a>(
        &'a self,
        beneficiary: &'a Beneficiary,
    ) -> BoxFuture<'a, StoreResult<()>> {
        let mut t = self.tables.write();
        if t.beneficiary_by_card.contains_key(&beneficiary.card_number) {
            return ready(Err(StoreError::UniqueViolation(UniqueKey::CardNumber)));
        }
        if t.beneficiary_by_id.contains_key(&beneficiary.id) {
            return ready(Err(StoreError::UniqueViolation(UniqueKey::RecordId)));
        }
        let pos = t.beneficiaries.len();
        t.beneficiaries.push(beneficiary.clone());
        t.beneficiary_by_card.insert(beneficiary.card_number.clone(), pos);
        t.beneficiary_by_id.insert(beneficiary.id, pos);
        ready(Ok(()))
    }

    fn beneficiary_by_card<'a>(
        &'a self,
        card_number: &'a CardNumber,
    ) -> BoxFuture<'a, StoreResult<Option<Beneficiary>>> {
        let t = self.tables.read();
        let found = t
            .beneficiary_by_card
            .get(card_number)
            .map(|&pos| t.beneficiaries[pos].clone());
        ready(Ok(found))
    }

    fn apply_status_change<'a>(
        &'a self,
        change: &'a StatusChange,
    ) -> BoxFuture<'a, StoreResult<Guarded<Beneficiary>>> {
        let mut t = self.tables.write();
        let Some(&pos) = t.beneficiary_by_id.get(&change.beneficiary_id) else {
            return ready(Ok(Guarded::Missing));
        };
        if t.beneficiaries[pos].status != change.from_status {
            return ready(Ok(Guarded::Stale(t.beneficiaries[pos].clone())));
        }
        let record = &mut t.beneficiaries[pos];
        record.status = change.to_status;
        record.updated_at = change.changed_at;
        let updated = record.clone();
        t.status_log.push(change.clone());
        ready(Ok(Guarded::Applied(updated)))
    }

    fn replace_reference_embedding<'a>(
        &'a self,
        id: BeneficiaryId,
        embedding: &'a FaceEmbedding,
        at: DateTime<Utc>,
    ) -> BoxFuture<'a, StoreResult<Option<Beneficiary>>> {
        let mut t = self.tables.write();
        let Some(&pos) = t.beneficiary_by_id.get(&id) else {
            return ready(Ok(None));
        };
        let record = &mut t.beneficiaries[pos];
        record.reference_embedding = embedding.clone();
        record.updated_at = at;
        ready(Ok(Some(record.clone())))
    }

    fn status_history(&self, id: BeneficiaryId) -> BoxFuture<'_, StoreResult<Vec<StatusChange>>> {
        let t = self.tables.read();
        let log = t
            .status_log
            .iter()
            .filter(|c| c.beneficiary_id == id)
            .cloned()
            .collect();
        ready(Ok(log))
    }

    fn list_beneficiaries(
        &self,
        filter: BeneficiaryFilter,
    ) -> BoxFuture<'_, StoreResult<Vec<Beneficiary>>> {
        let t = self.tables.read();
        let rows = t
            .beneficiaries
            .iter()
            .filter(|b| filter.status.map_or(true, |s| b.status == s));
        ready(Ok(newest_first(rows, |b| b.created_at, filter.limit)))
    }
}

impl ReferenceStore for MemoryStore {
    fn insert_shop<'a>(&'a self, shop: &'a RationShop) -> BoxFuture<'a, StoreResult<()>> {
        let mut t = self.tables.write();
        if t.shops.iter().any(|s| s.shop_code == shop.shop_code) {
            return ready(Err(StoreError::UniqueViolation(UniqueKey::ShopCode)));
        }
        if t.shops.iter().any(|s| s.id == shop.id) {
            return ready(Err(StoreError::UniqueViolation(UniqueKey::RecordId)));
        }
        t.shops.push(shop.clone());
        ready(Ok(()))
    }

    fn shop(&self, id: ShopId) -> BoxFuture<'_, StoreResult<Option<RationShop>>> {
        let t = self.tables.read();
        ready(Ok(t.shops.iter().find(|s| s.id == id).cloned()))
    }

    fn list_shops(&self) -> BoxFuture<'_, StoreResult<Vec<RationShop>>> {
        let t = self.tables.read();
        let mut shops = t.shops.clone();
        shops.sort_by(|a, b| a.shop_code.as_str().cmp(b.shop_code.as_str()));
        ready(Ok(shops))
    }

    fn insert_cycle<'a>(
        &'a self,
        cycle: &'a DistributionCycle,
    ) -> BoxFuture<'a, StoreResult<()>> {
        let mut t = self.tables.write();
        if cycle.status == CycleStatus::Active
            && t.cycles.iter().any(|c| c.status == CycleStatus::Active)
        {
            return ready(Err(StoreError::UniqueViolation(UniqueKey::ActiveCycle)));
        }
        if t.cycles.iter().any(|c| c.id == cycle.id) {
            return ready(Err(StoreError::UniqueViolation(UniqueKey::RecordId)));
        }
        t.cycles.push(cycle.clone());
        ready(Ok(()))
    }

    fn cycle(&self, id: CycleId) -> BoxFuture<'_, StoreResult<Option<DistributionCycle>>> {
        let t = self.tables.read();
        ready(Ok(t.cycles.iter().find(|c| c.id == id).cloned()))
    }

    fn active_cycles(&self) -> BoxFuture<'_, StoreResult<Vec<DistributionCycle>>> {
        let t = self.tables.read();
        let active = t
            .cycles
            .iter()
            .filter(|c| c.status == CycleStatus::Active)
            .cloned()
            .collect();
        ready(Ok(active))
    }

    fn list_cycles(&self) -> BoxFuture<'_, StoreResult<Vec<DistributionCycle>>> {
        let t = self.tables.read();
        ready(Ok(newest_first(t.cycles.iter(), |c| c.created_at, usize::MAX)))
    }

    fn close_cycle(
        &self,
        id: CycleId,
        target: CycleStatus,
        at: DateTime<Utc>,
    ) -> BoxFuture<'_, StoreResult<Guarded<DistributionCycle>>> {
        let mut t = self.tables.write();
        let Some(cycle) = t.cycles.iter_mut().find(|c| c.id == id) else {
            return ready(Ok(Guarded::Missing));
        };
        if cycle.status != CycleStatus::Active {
            return ready(Ok(Guarded::Stale(cycle.clone())));
        }
        cycle.status = target;
        cycle.closed_at = Some(at);
        ready(Ok(Guarded::Applied(cycle.clone())))
    }
}

impl LedgerStore for MemoryStore {
    fn append_transaction<'a>(
        &'a self,
        transaction: &'a Transaction,
    ) -> BoxFuture<'a, StoreResult<()>> {
        let mut t = self.tables.write();
        if t.transaction_by_id.contains_key(&transaction.id) {
            return ready(Err(StoreError::UniqueViolation(UniqueKey::RecordId)));
        }
        if !t.shops.iter().any(|s| s.id == transaction.shop_id) {
            return ready(Err(StoreError::MissingReference("shop")));
        }
        if !t.cycles.iter().any(|c| c.id == transaction.cycle_id) {
            return ready(Err(StoreError::MissingReference("cycle")));
        }
        let pos = t.transactions.len();
        t.transactions.push(transaction.clone());
        t.transaction_by_id.insert(transaction.id, pos);
        ready(Ok(()))
    }

    fn escalate_transaction(
        &self,
        id: TransactionId,
    ) -> BoxFuture<'_, StoreResult<Guarded<Transaction>>> {
        let mut t = self.tables.write();
        let Some(&pos) = t.transaction_by_id.get(&id) else {
            return ready(Ok(Guarded::Missing));
        };
        let record = &mut t.transactions[pos];
        if record.status != TransactionStatus::Success {
            return ready(Ok(Guarded::Stale(record.clone())));
        }
        record.status = TransactionStatus::Flagged;
        ready(Ok(Guarded::Applied(record.clone())))
    }

    fn transaction(&self, id: TransactionId) -> BoxFuture<'_, StoreResult<Option<Transaction>>> {
        let t = self.tables.read();
        let found = t
            .transaction_by_id
            .get(&id)
            .map(|&pos| t.transactions[pos].clone());
        ready(Ok(found))
    }

    fn transactions_by_card_in_cycle<'a>(
        &'a self,
        card_number: &'a CardNumber,
        cycle_id: CycleId,
    ) -> BoxFuture<'a, StoreResult<Vec<Transaction>>> {
        let t = self.tables.read();
        let rows = t
            .transactions
            .iter()
            .filter(|tx| tx.cycle_id == cycle_id && &tx.card_number == card_number);
        ready(Ok(oldest_first(rows)))
    }

    fn transactions_by_beneficiary_in_cycle(
        &self,
        beneficiary_id: BeneficiaryId,
        cycle_id: CycleId,
    ) -> BoxFuture<'_, StoreResult<Vec<Transaction>>> {
        let t = self.tables.read();
        let rows = t
            .transactions
            .iter()
            .filter(|tx| tx.cycle_id == cycle_id && tx.beneficiary_id == Some(beneficiary_id));
        ready(Ok(oldest_first(rows)))
    }

    fn transactions_in_cycle(
        &self,
        cycle_id: CycleId,
    ) -> BoxFuture<'_, StoreResult<Vec<Transaction>>> {
        let t = self.tables.read();
        let rows = t.transactions.iter().filter(|tx| tx.cycle_id == cycle_id);
        ready(Ok(oldest_first(rows)))
    }

    fn list_transactions(
        &self,
        filter: TransactionFilter,
    ) -> BoxFuture<'_, StoreResult<Vec<Transaction>>> {
        let t = self.tables.read();
        let rows = t.transactions.iter().filter(|tx| {
            filter.cycle_id.map_or(true, |c| tx.cycle_id == c)
                && filter.shop_id.map_or(true, |s| tx.shop_id == s)
                && filter.status.map_or(true, |s| tx.status == s)
        });
        ready(Ok(newest_first(rows, |tx| tx.created_at, filter.limit)))
    }
}

impl AlertStore for MemoryStore {
    fn insert_alert<'a>(&'a self, alert: &'a DuplicateAlert) -> BoxFuture<'a, StoreResult<()>> {
        let mut t = self.tables.write();
        if t.alert_by_id.contains_key(&alert.id) {
            return ready(Err(StoreError::UniqueViolation(UniqueKey::RecordId)));
        }
        if !t.transaction_by_id.contains_key(&alert.transaction_id) {
            return ready(Err(StoreError::MissingReference("transaction")));
        }
        let pos = t.alerts.len();
        t.alerts.push(alert.clone());
        t.alert_by_id.insert(alert.id, pos);
        ready(Ok(()))
    }

    fn alert(&self, id: AlertId) -> BoxFuture<'_, StoreResult<Option<DuplicateAlert>>> {
        let t = self.tables.read();
        let found = t.alert_by_id.get(&id).map(|&pos| t.alerts[pos].clone());
        ready(Ok(found))
    }

    fn alerts_for_transactions<'a>(
        &'a self,
        transaction_ids: &'a [TransactionId],
    ) -> BoxFuture<'a, StoreResult<Vec<DuplicateAlert>>> {
        let wanted: HashSet<&TransactionId> = transaction_ids.iter().collect();
        let t = self.tables.read();
        let mut rows: Vec<DuplicateAlert> = t
            .alerts
            .iter()
            .filter(|a| wanted.contains(&a.transaction_id))
            .cloned()
            .collect();
        rows.sort_by_key(|a| a.created_at);
        ready(Ok(rows))
    }

    fn review_alert<'a>(
        &'a self,
        id: AlertId,
        review: &'a AlertReview,
    ) -> BoxFuture<'a, StoreResult<Guarded<DuplicateAlert>>> {
        let mut t = self.tables.write();
        let Some(&pos) = t.alert_by_id.get(&id) else {
            return ready(Ok(Guarded::Missing));
        };
        let record = &mut t.alerts[pos];
        if record.status != AlertStatus::Pending {
            return ready(Ok(Guarded::Stale(record.clone())));
        }
        record.status = review.status;
        record.reviewed_by = Some(review.reviewed_by.clone());
        record.reviewed_at = Some(review.reviewed_at);
        ready(Ok(Guarded::Applied(record.clone())))
    }

    fn list_alerts(&self, filter: AlertFilter) -> BoxFuture<'_, StoreResult<Vec<DuplicateAlert>>> {
        let t = self.tables.read();
        let rows = t.alerts.iter().filter(|a| {
            filter.status.map_or(true, |s| a.status == s)
                && filter.severity.map_or(true, |s| a.severity == s)
        });
        ready(Ok(newest_first(rows, |a| a.created_at, filter.limit)))
    }
}

impl DashboardStore for MemoryStore {
    fn dashboard_counts(&self) -> BoxFuture<'_, StoreResult<DashboardCounts>> {
        let t = self.tables.read();
        let mut c = DashboardCounts::default();
        for b in &t.beneficiaries {
            c.total_beneficiaries += 1;
            match b.status {
                BeneficiaryStatus::Active => c.active_beneficiaries += 1,
                BeneficiaryStatus::Suspended => c.suspended_beneficiaries += 1,
                BeneficiaryStatus::Blocked => c.blocked_beneficiaries += 1,
            }
        }
        for tx in &t.transactions {
            c.total_transactions += 1;
            match tx.status {
                TransactionStatus::Success => c.successful_transactions += 1,
                TransactionStatus::Flagged => c.flagged_transactions += 1,
                TransactionStatus::Failed => c.failed_transactions += 1,
            }
        }
        for a in t.alerts.iter().filter(|a| a.status == AlertStatus::Pending) {
            c.pending_alerts += 1;
            match a.severity {
                Severity::Critical => c.critical_alerts += 1,
                Severity::High => c.high_alerts += 1,
                Severity::Medium => c.medium_alerts += 1,
                Severity::Low => {}
            }
        }
        ready(Ok(c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use ration_core::{RejectionReason, ShopCode, StaffRef};
    use ration_state::CycleWindow;

    fn beneficiary(card: &str) -> Beneficiary {
        let now = Utc::now();
        Beneficiary {
            id: BeneficiaryId::new(),
            card_number: CardNumber::new(card).unwrap(),
            name: "Test".into(),
            phone: None,
            address: None,
            reference_embedding: FaceEmbedding::new(vec![1.0, 0.0]).unwrap(),
            status: BeneficiaryStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    fn cycle() -> DistributionCycle {
        let window = CycleWindow::new(
            NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 5, 31).unwrap(),
        )
        .unwrap();
        DistributionCycle::open("May", window, Utc::now()).unwrap()
    }

    fn tx(shop: ShopId, cycle: CycleId, card: &str, at: DateTime<Utc>) -> Transaction {
        Transaction {
            id: TransactionId::new(),
            beneficiary_id: None,
            card_number: CardNumber::new(card).unwrap(),
            shop_id: shop,
            cycle_id: cycle,
            operator_id: StaffRef::new("op").unwrap(),
            face_match_confidence: None,
            status: TransactionStatus::Failed,
            rejection_reason: Some(RejectionReason::CardNotRegistered),
            items_collected: vec![],
            created_at: at,
        }
    }

    #[tokio::test]
    async fn card_number_is_unique() {
        let store = MemoryStore::new();
        store.insert_beneficiary(&beneficiary("CARD-1")).await.unwrap();
        let err = store
            .insert_beneficiary(&beneficiary("card-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(UniqueKey::CardNumber)));
    }

    #[tokio::test]
    async fn only_one_active_cycle() {
        let store = MemoryStore::new();
        store.insert_cycle(&cycle()).await.unwrap();
        let err = store.insert_cycle(&cycle()).await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(UniqueKey::ActiveCycle)));
    }

    #[tokio::test]
    async fn ledger_reads_are_chronological_and_lists_newest_first() {
        let store = MemoryStore::new();
        let shop = RationShop::new(ShopCode::new("S1").unwrap(), "Shop", None, None, Utc::now())
            .unwrap();
        let c = cycle();
        store.insert_shop(&shop).await.unwrap();
        store.insert_cycle(&c).await.unwrap();

        let base = Utc::now();
        let later = tx(shop.id, c.id, "CARD-1", base + Duration::minutes(5));
        let earlier = tx(shop.id, c.id, "CARD-1", base);
        store.append_transaction(&later).await.unwrap();
        store.append_transaction(&earlier).await.unwrap();

        let card = CardNumber::new("CARD-1").unwrap();
        let history = store.transactions_by_card_in_cycle(&card, c.id).await.unwrap();
        assert_eq!(history[0].id, earlier.id);
        assert_eq!(history[1].id, later.id);

        let listed = store
            .list_transactions(TransactionFilter {
                cycle_id: None,
                shop_id: None,
                status: None,
                limit: 1,
            })
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, later.id);
    }

    #[tokio::test]
    async fn append_requires_known_shop_and_cycle() {
        let store = MemoryStore::new();
        let err = store
            .append_transaction(&tx(ShopId::new(), CycleId::new(), "CARD-1", Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::MissingReference("shop")));
    }

    #[tokio::test]
    async fn escalation_is_one_shot() {
        let store = MemoryStore::new();
        let shop = RationShop::new(ShopCode::new("S1").unwrap(), "Shop", None, None, Utc::now())
            .unwrap();
        let c = cycle();
        store.insert_shop(&shop).await.unwrap();
        store.insert_cycle(&c).await.unwrap();
        let mut t = tx(shop.id, c.id, "CARD-1", Utc::now());
        t.status = TransactionStatus::Success;
        t.rejection_reason = None;
        store.append_transaction(&t).await.unwrap();

        assert!(matches!(
            store.escalate_transaction(t.id).await.unwrap(),
            Guarded::Applied(ref r) if r.status == TransactionStatus::Flagged
        ));
        assert!(matches!(
            store.escalate_transaction(t.id).await.unwrap(),
            Guarded::Stale(_)
        ));
        assert!(matches!(
            store.escalate_transaction(TransactionId::new()).await.unwrap(),
            Guarded::Missing
        ));
    }
}
