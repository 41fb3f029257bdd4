//! # Transaction Ledger
//!
//! Append-only log of every verification attempt, including failed ones.
//! The ledger assigns identifiers and timestamps; entries are never
//! deleted and the only rewrite is `success → flagged`.

use std::sync::Arc;

use ration_core::{
    BeneficiaryId, CardNumber, Confidence, CycleId, RejectionReason, ShopId, StaffRef,
    TransactionId, TransactionStatus,
};
use ration_state::escalate;

use crate::clock::Clock;
use crate::error::EngineError;
use crate::model::Transaction;
use crate::store::{Guarded, LedgerStore};

/// Fields of an attempt the caller decides; id and time come from the ledger.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    /// Resolved beneficiary, if any.
    pub beneficiary_id: Option<BeneficiaryId>,
    /// Card as presented.
    pub card_number: CardNumber,
    /// Shop of the attempt.
    pub shop_id: ShopId,
    /// Active cycle.
    pub cycle_id: CycleId,
    /// Operator.
    pub operator_id: StaffRef,
    /// Confidence, when a comparison happened.
    pub face_match_confidence: Option<Confidence>,
    /// Provisional status.
    pub status: TransactionStatus,
    /// Set for failed attempts.
    pub rejection_reason: Option<RejectionReason>,
    /// Items handed over.
    pub items_collected: Vec<serde_json::Value>,
}

/// Ledger operations over a [`LedgerStore`].
#[derive(Clone)]
pub struct TransactionLedger {
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
}

impl TransactionLedger {
    /// Build over `store`.
    pub fn new(store: Arc<dyn LedgerStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Write one attempt and return it as stored.
    pub async fn append(&self, entry: NewTransaction) -> Result<Transaction, EngineError> {
        let transaction = Transaction {
            id: TransactionId::new(),
            beneficiary_id: entry.beneficiary_id,
            card_number: entry.card_number,
            shop_id: entry.shop_id,
            cycle_id: entry.cycle_id,
            operator_id: entry.operator_id,
            face_match_confidence: entry.face_match_confidence,
            status: entry.status,
            rejection_reason: entry.rejection_reason,
            items_collected: entry.items_collected,
            created_at: self.clock.now(),
        };
        self.store.append_transaction(&transaction).await?;
        tracing::debug!(
            transaction_id = %transaction.id,
            status = %transaction.status,
            "transaction appended"
        );
        Ok(transaction)
    }

    /// Same card in the cycle, oldest first.
    pub async fn find_by_card_in_cycle(
        &self,
        card_number: &CardNumber,
        cycle_id: CycleId,
    ) -> Result<Vec<Transaction>, EngineError> {
        Ok(self
            .store
            .transactions_by_card_in_cycle(card_number, cycle_id)
            .await?)
    }

    /// Same beneficiary in the cycle, oldest first.
    pub async fn find_by_beneficiary_in_cycle(
        &self,
        beneficiary_id: BeneficiaryId,
        cycle_id: CycleId,
    ) -> Result<Vec<Transaction>, EngineError> {
        Ok(self
            .store
            .transactions_by_beneficiary_in_cycle(beneficiary_id, cycle_id)
            .await?)
    }

    /// Rewrite `success` to `flagged`. Returns the stored record.
    pub async fn escalate(&self, transaction: &Transaction) -> Result<Transaction, EngineError> {
        escalate(transaction.status)?;
        match self.store.escalate_transaction(transaction.id).await? {
            Guarded::Applied(t) => Ok(t),
            Guarded::Stale(t) => Err(escalate(t.status).err().map_or_else(
                || EngineError::Conflict(format!("transaction {} changed concurrently", t.id)),
                EngineError::from,
            )),
            Guarded::Missing => Err(EngineError::NotFound {
                kind: "transaction",
                key: transaction.id.to_string(),
            }),
        }
    }
}

impl std::fmt::Debug for TransactionLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionLedger").finish_non_exhaustive()
    }
}
