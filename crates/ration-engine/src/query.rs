//! Read-side projections for dashboards and review screens.
//!
//! Lists are newest first. `limit` defaults to [`DEFAULT_LIST_LIMIT`] and
//! is capped at [`MAX_LIST_LIMIT`].

use serde::Serialize;

use ration_core::{
    AlertId, AlertStatus, BeneficiaryStatus, CardNumber, CycleId, Severity, ShopId, TransactionId,
    TransactionStatus,
};
use ration_state::StatusChange;

use crate::error::EngineError;
use crate::model::{
    Beneficiary, DashboardCounts, DistributionCycle, DuplicateAlert, RationShop, Transaction,
};
use crate::orchestrator::VerificationEngine;
use crate::store::{AlertFilter, BeneficiaryFilter, TransactionFilter};

/// Rows returned when no limit is given.
pub const DEFAULT_LIST_LIMIT: usize = 100;

/// Largest accepted limit.
pub const MAX_LIST_LIMIT: usize = 1000;

/// Apply the default and the cap.
pub fn clamp_limit(limit: Option<u32>) -> usize {
    limit.map_or(DEFAULT_LIST_LIMIT, |l| (l as usize).clamp(1, MAX_LIST_LIMIT))
}

/// A transaction with the alerts it raised.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionDetail {
    /// The ledger entry.
    pub transaction: Transaction,
    /// Its alerts, in rule order.
    pub alerts: Vec<DuplicateAlert>,
}

impl VerificationEngine {
    /// Beneficiaries, optionally by status.
    pub async fn list_beneficiaries(
        &self,
        status: Option<BeneficiaryStatus>,
        limit: Option<u32>,
    ) -> Result<Vec<Beneficiary>, EngineError> {
        Ok(self
            .stores()
            .beneficiaries
            .list_beneficiaries(BeneficiaryFilter {
                status,
                limit: clamp_limit(limit),
            })
            .await?)
    }

    /// One beneficiary by card number.
    pub async fn beneficiary(&self, card_number: &CardNumber) -> Result<Beneficiary, EngineError> {
        self.registry().require(card_number).await
    }

    /// Status changes of one beneficiary, oldest first.
    pub async fn status_history(
        &self,
        card_number: &CardNumber,
    ) -> Result<Vec<StatusChange>, EngineError> {
        self.registry().history(card_number).await
    }

    /// Ledger entries, optionally filtered.
    pub async fn list_transactions(
        &self,
        cycle_id: Option<CycleId>,
        shop_id: Option<ShopId>,
        status: Option<TransactionStatus>,
        limit: Option<u32>,
    ) -> Result<Vec<Transaction>, EngineError> {
        Ok(self
            .stores()
            .ledger
            .list_transactions(TransactionFilter {
                cycle_id,
                shop_id,
                status,
                limit: clamp_limit(limit),
            })
            .await?)
    }

    /// One transaction and its alerts.
    pub async fn transaction_detail(
        &self,
        id: TransactionId,
    ) -> Result<TransactionDetail, EngineError> {
        let transaction = self
            .stores()
            .ledger
            .transaction(id)
            .await?
            .ok_or_else(|| EngineError::NotFound {
                kind: "transaction",
                key: id.to_string(),
            })?;
        let alerts = self
            .stores()
            .alerts
            .alerts_for_transactions(std::slice::from_ref(&transaction.id))
            .await?;
        Ok(TransactionDetail {
            transaction,
            alerts,
        })
    }

    /// Alerts, optionally by review status and severity.
    pub async fn list_alerts(
        &self,
        status: Option<AlertStatus>,
        severity: Option<Severity>,
        limit: Option<u32>,
    ) -> Result<Vec<DuplicateAlert>, EngineError> {
        Ok(self
            .stores()
            .alerts
            .list_alerts(AlertFilter {
                status,
                severity,
                limit: clamp_limit(limit),
            })
            .await?)
    }

    /// One alert.
    pub async fn alert(&self, id: AlertId) -> Result<DuplicateAlert, EngineError> {
        self.stores()
            .alerts
            .alert(id)
            .await?
            .ok_or_else(|| EngineError::NotFound {
                kind: "alert",
                key: id.to_string(),
            })
    }

    /// All shops by code.
    pub async fn list_shops(&self) -> Result<Vec<RationShop>, EngineError> {
        Ok(self.stores().reference.list_shops().await?)
    }

    /// All cycles, newest first.
    pub async fn list_cycles(&self) -> Result<Vec<DistributionCycle>, EngineError> {
        Ok(self.stores().reference.list_cycles().await?)
    }

    /// Aggregate counts.
    pub async fn dashboard(&self) -> Result<DashboardCounts, EngineError> {
        Ok(self.stores().dashboard.dashboard_counts().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_defaults_and_caps() {
        assert_eq!(clamp_limit(None), 100);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(25)), 25);
        assert_eq!(clamp_limit(Some(50_000)), 1000);
    }
}
