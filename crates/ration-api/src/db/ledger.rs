//! Transaction Ledger storage.
//!
//! Reads order by `(created_at, seq)` so entries written in the same
//! instant keep their write order. The table trigger rejects every update
//! except the `success -> flagged` escalation issued here.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use ration_core::{
    BeneficiaryId, CardNumber, Confidence, CycleId, RejectionReason, ShopId, StaffRef,
    TransactionId, TransactionStatus,
};
use ration_engine::store::{Guarded, LedgerStore, StoreResult, TransactionFilter};
use ration_engine::{BoxFuture, Transaction};

use super::{corrupt, sql_limit, store_error, PgStore};

const COLUMNS: &str = "id, beneficiary_id, card_number, shop_id, cycle_id, operator_id, \
     face_match_confidence, status, rejection_reason, items_collected, created_at";

#[derive(sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    beneficiary_id: Option<Uuid>,
    card_number: String,
    shop_id: Uuid,
    cycle_id: Uuid,
    operator_id: String,
    face_match_confidence: Option<f64>,
    status: String,
    rejection_reason: Option<String>,
    items_collected: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl TransactionRow {
    fn into_record(self) -> StoreResult<Transaction> {
        let id = self.id;
        let items_collected = match self.items_collected {
            serde_json::Value::Array(items) => items,
            other => return Err(corrupt("transaction", id, format!("items_collected is {other}"))),
        };
        Ok(Transaction {
            id: TransactionId::from_uuid(id),
            beneficiary_id: self.beneficiary_id.map(BeneficiaryId::from_uuid),
            card_number: CardNumber::new(self.card_number)
                .map_err(|e| corrupt("transaction", id, e))?,
            shop_id: ShopId::from_uuid(self.shop_id),
            cycle_id: CycleId::from_uuid(self.cycle_id),
            operator_id: StaffRef::new(self.operator_id)
                .map_err(|e| corrupt("transaction", id, e))?,
            face_match_confidence: self
                .face_match_confidence
                .map(Confidence::new)
                .transpose()
                .map_err(|e| corrupt("transaction", id, e))?,
            status: self
                .status
                .parse::<TransactionStatus>()
                .map_err(|e| corrupt("transaction", id, e))?,
            rejection_reason: self
                .rejection_reason
                .map(|r| r.parse::<RejectionReason>())
                .transpose()
                .map_err(|e| corrupt("transaction", id, e))?,
            items_collected,
            created_at: self.created_at,
        })
    }
}

fn collect(rows: Vec<TransactionRow>) -> StoreResult<Vec<Transaction>> {
    rows.into_iter().map(TransactionRow::into_record).collect()
}

impl LedgerStore for PgStore {
    fn append_transaction<'a>(
        &'a self,
        transaction: &'a Transaction,
    ) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO transactions
                    (id, beneficiary_id, card_number, shop_id, cycle_id, operator_id,
                     face_match_confidence, status, rejection_reason, items_collected, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            )
            .bind(*transaction.id.as_uuid())
            .bind(transaction.beneficiary_id.map(|b| *b.as_uuid()))
            .bind(transaction.card_number.as_str())
            .bind(*transaction.shop_id.as_uuid())
            .bind(*transaction.cycle_id.as_uuid())
            .bind(transaction.operator_id.as_str())
            .bind(transaction.face_match_confidence.map(|c| c.value()))
            .bind(transaction.status.as_str())
            .bind(transaction.rejection_reason.map(|r| r.as_str()))
            .bind(serde_json::Value::Array(transaction.items_collected.clone()))
            .bind(transaction.created_at)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
            Ok(())
        })
    }

    fn escalate_transaction(
        &self,
        id: TransactionId,
    ) -> BoxFuture<'_, StoreResult<Guarded<Transaction>>> {
        Box::pin(async move {
            let flagged = sqlx::query_as::<_, TransactionRow>(&format!(
                "UPDATE transactions SET status = 'flagged'
                 WHERE id = $1 AND status = 'success'
                 RETURNING {COLUMNS}"
            ))
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

            Ok(match flagged {
                Some(row) => Guarded::Applied(row.into_record()?),
                None => match self.transaction(id).await? {
                    Some(current) => Guarded::Stale(current),
                    None => Guarded::Missing,
                },
            })
        })
    }

    fn transaction(&self, id: TransactionId) -> BoxFuture<'_, StoreResult<Option<Transaction>>> {
        Box::pin(async move {
            sqlx::query_as::<_, TransactionRow>(&format!(
                "SELECT {COLUMNS} FROM transactions WHERE id = $1"
            ))
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?
            .map(TransactionRow::into_record)
            .transpose()
        })
    }

    fn transactions_by_card_in_cycle<'a>(
        &'a self,
        card_number: &'a CardNumber,
        cycle_id: CycleId,
    ) -> BoxFuture<'a, StoreResult<Vec<Transaction>>> {
        Box::pin(async move {
            let rows = sqlx::query_as::<_, TransactionRow>(&format!(
                "SELECT {COLUMNS} FROM transactions
                 WHERE cycle_id = $1 AND card_number = $2
                 ORDER BY created_at, seq"
            ))
            .bind(*cycle_id.as_uuid())
            .bind(card_number.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
            collect(rows)
        })
    }

    fn transactions_by_beneficiary_in_cycle(
        &self,
        beneficiary_id: BeneficiaryId,
        cycle_id: CycleId,
    ) -> BoxFuture<'_, StoreResult<Vec<Transaction>>> {
        Box::pin(async move {
            let rows = sqlx::query_as::<_, TransactionRow>(&format!(
                "SELECT {COLUMNS} FROM transactions
                 WHERE cycle_id = $1 AND beneficiary_id = $2
                 ORDER BY created_at, seq"
            ))
            .bind(*cycle_id.as_uuid())
            .bind(*beneficiary_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
            collect(rows)
        })
    }

    fn transactions_in_cycle(
        &self,
        cycle_id: CycleId,
    ) -> BoxFuture<'_, StoreResult<Vec<Transaction>>> {
        Box::pin(async move {
            let rows = sqlx::query_as::<_, TransactionRow>(&format!(
                "SELECT {COLUMNS} FROM transactions WHERE cycle_id = $1 ORDER BY created_at, seq"
            ))
            .bind(*cycle_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
            collect(rows)
        })
    }

    fn list_transactions(
        &self,
        filter: TransactionFilter,
    ) -> BoxFuture<'_, StoreResult<Vec<Transaction>>> {
        Box::pin(async move {
            let rows = sqlx::query_as::<_, TransactionRow>(&format!(
                "SELECT {COLUMNS} FROM transactions
                 WHERE ($1::uuid IS NULL OR cycle_id = $1)
                   AND ($2::uuid IS NULL OR shop_id = $2)
                   AND ($3::text IS NULL OR status = $3)
                 ORDER BY created_at DESC, seq DESC
                 LIMIT $4"
            ))
            .bind(filter.cycle_id.map(|c| *c.as_uuid()))
            .bind(filter.shop_id.map(|s| *s.as_uuid()))
            .bind(filter.status.map(|s| s.as_str()))
            .bind(sql_limit(filter.limit))
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
            collect(rows)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ration_engine::store::StoreError;

    fn row(items: serde_json::Value) -> TransactionRow {
        TransactionRow {
            id: Uuid::new_v4(),
            beneficiary_id: None,
            card_number: "rc-1001".into(),
            shop_id: Uuid::new_v4(),
            cycle_id: Uuid::new_v4(),
            operator_id: "op-7".into(),
            face_match_confidence: None,
            status: "failed".into(),
            rejection_reason: Some("card_not_registered".into()),
            items_collected: items,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn row_maps_to_record() {
        let tx = row(serde_json::json!([{"item": "rice", "kg": 5}]))
            .into_record()
            .unwrap();
        assert_eq!(tx.card_number.as_str(), "RC-1001");
        assert_eq!(tx.status, TransactionStatus::Failed);
        assert_eq!(tx.rejection_reason, Some(RejectionReason::CardNotRegistered));
        assert_eq!(tx.items_collected.len(), 1);
    }

    #[test]
    fn non_array_items_are_corrupt() {
        let err = row(serde_json::json!({"item": "rice"})).into_record().unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }
}
