//! # Reconciliation
//!
//! Concurrent attempts on the same card can each miss the other's write
//! and both be recorded clean. Reconciliation re-runs the duplicate rules
//! over the full cycle history and reports every accepted transaction
//! whose signals were never persisted.
//!
//! The scan is read-only: it writes no alerts and flags no transactions.
//! Findings are for a reviewer to act on.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use ration_core::{
    AlertType, BeneficiaryId, BeneficiaryStatus, CardNumber, CycleId, TransactionId,
};

use crate::error::EngineError;
use crate::model::{Beneficiary, Transaction};
use crate::orchestrator::VerificationEngine;
use crate::rules::{evaluate, RuleInput};

/// A duplicate signal that should exist but does not.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConflictFinding {
    /// Accepted transaction that should have raised the signal.
    pub transaction_id: TransactionId,
    /// Its card.
    pub card_number: CardNumber,
    /// Its beneficiary.
    pub beneficiary_id: BeneficiaryId,
    /// Missing signal.
    pub alert_type: AlertType,
    /// Conflicting earlier transaction.
    pub previous_transaction_id: Option<TransactionId>,
    /// Explanation as the rule would have written it.
    pub description: String,
}

/// Result of one scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationReport {
    /// Scanned cycle.
    pub cycle_id: CycleId,
    /// When the scan ran.
    pub generated_at: DateTime<Utc>,
    /// Ledger entries read.
    pub transactions_scanned: usize,
    /// Missing signals, in ledger order.
    pub findings: Vec<ConflictFinding>,
}

impl ReconciliationReport {
    /// No missing signals.
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }
}

impl VerificationEngine {
    /// Scan `cycle_id`, or the active cycle when `None`.
    pub async fn reconcile(
        &self,
        cycle_id: Option<CycleId>,
    ) -> Result<ReconciliationReport, EngineError> {
        let cycle = match cycle_id {
            Some(id) => self
                .stores()
                .reference
                .cycle(id)
                .await?
                .ok_or_else(|| EngineError::NotFound {
                    kind: "cycle",
                    key: id.to_string(),
                })?,
            None => self.active_cycle().await?,
        };

        let ledger = self.stores().ledger.transactions_in_cycle(cycle.id).await?;
        let ids: Vec<TransactionId> = ledger.iter().map(|t| t.id).collect();
        let persisted: HashSet<(TransactionId, AlertType)> = self
            .stores()
            .alerts
            .alerts_for_transactions(&ids)
            .await?
            .into_iter()
            .map(|a| (a.transaction_id, a.alert_type))
            .collect();

        let mut beneficiaries: HashMap<CardNumber, Option<Beneficiary>> = HashMap::new();
        let mut findings = Vec::new();

        for tx in ledger.iter().filter(|t| t.status.is_accepted()) {
            let Some(beneficiary_id) = tx.beneficiary_id else {
                continue;
            };
            if !beneficiaries.contains_key(&tx.card_number) {
                let found = self.registry().lookup(&tx.card_number).await?;
                beneficiaries.insert(tx.card_number.clone(), found);
            }
            let Some(Some(beneficiary)) = beneficiaries.get(&tx.card_number) else {
                continue;
            };
            // Judged as of the attempt, which was accepted.
            let mut as_of = beneficiary.clone();
            as_of.status = BeneficiaryStatus::Active;

            let card_history: Vec<Transaction> = ledger
                .iter()
                .filter(|t| t.card_number == tx.card_number)
                .cloned()
                .collect();
            let beneficiary_history: Vec<Transaction> = ledger
                .iter()
                .filter(|t| t.beneficiary_id == Some(beneficiary_id))
                .cloned()
                .collect();

            let evaluation = evaluate(
                &RuleInput {
                    current: tx,
                    beneficiary: Some(&as_of),
                    card_history: &card_history,
                    beneficiary_history: &beneficiary_history,
                },
                self.config(),
            );
            for spec in evaluation.alerts {
                if spec.alert_type == AlertType::DifferentPerson
                    || persisted.contains(&(tx.id, spec.alert_type))
                {
                    continue;
                }
                findings.push(ConflictFinding {
                    transaction_id: tx.id,
                    card_number: tx.card_number.clone(),
                    beneficiary_id,
                    alert_type: spec.alert_type,
                    previous_transaction_id: spec.previous_transaction_id,
                    description: spec.description,
                });
            }
        }

        if findings.is_empty() {
            tracing::info!(cycle_id = %cycle.id, scanned = ledger.len(), "reconciliation clean");
        } else {
            tracing::warn!(
                cycle_id = %cycle.id,
                scanned = ledger.len(),
                findings = findings.len(),
                "reconciliation found unrecorded duplicate signals"
            );
        }

        Ok(ReconciliationReport {
            cycle_id: cycle.id,
            generated_at: self.clock().now(),
            transactions_scanned: ledger.len(),
            findings,
        })
    }
}
