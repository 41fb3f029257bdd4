//! Identity Registry storage: beneficiaries and their status log.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use ration_core::{BeneficiaryId, CardNumber, FaceEmbedding, StaffRef};
use ration_engine::store::{
    BeneficiaryFilter, BeneficiaryStore, Guarded, StoreError, StoreResult,
};
use ration_engine::{Beneficiary, BoxFuture};
use ration_state::StatusChange;

use super::{corrupt, sql_limit, store_error, PgStore};

const COLUMNS: &str = "id, card_number, name, phone, address, reference_embedding, status, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct BeneficiaryRow {
    id: Uuid,
    card_number: String,
    name: String,
    phone: Option<String>,
    address: Option<String>,
    reference_embedding: serde_json::Value,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl BeneficiaryRow {
    fn into_record(self) -> StoreResult<Beneficiary> {
        let id = self.id;
        Ok(Beneficiary {
            id: BeneficiaryId::from_uuid(id),
            card_number: CardNumber::new(self.card_number)
                .map_err(|e| corrupt("beneficiary", id, e))?,
            name: self.name,
            phone: self.phone,
            address: self.address,
            reference_embedding: serde_json::from_value::<FaceEmbedding>(self.reference_embedding)
                .map_err(|e| corrupt("beneficiary", id, e))?,
            status: self.status.parse().map_err(|e| corrupt("beneficiary", id, e))?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct StatusChangeRow {
    seq: i64,
    beneficiary_id: Uuid,
    from_status: String,
    to_status: String,
    changed_by: String,
    reason: Option<String>,
    changed_at: DateTime<Utc>,
}

impl StatusChangeRow {
    fn into_record(self) -> StoreResult<StatusChange> {
        let seq = self.seq;
        Ok(StatusChange {
            beneficiary_id: BeneficiaryId::from_uuid(self.beneficiary_id),
            from_status: self.from_status.parse().map_err(|e| corrupt("status change", seq, e))?,
            to_status: self.to_status.parse().map_err(|e| corrupt("status change", seq, e))?,
            changed_by: StaffRef::new(self.changed_by)
                .map_err(|e| corrupt("status change", seq, e))?,
            reason: self.reason,
            changed_at: self.changed_at,
        })
    }
}

fn embedding_json(embedding: &FaceEmbedding) -> StoreResult<serde_json::Value> {
    serde_json::to_value(embedding)
        .map_err(|e| StoreError::Corrupt(format!("failed to serialize embedding: {e}")))
}

impl PgStore {
    async fn beneficiary_by_id(&self, id: BeneficiaryId) -> StoreResult<Option<Beneficiary>> {
        sqlx::query_as::<_, BeneficiaryRow>(&format!(
            "SELECT {COLUMNS} FROM beneficiaries WHERE id = $1"
        ))
        .bind(*id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?
        .map(BeneficiaryRow::into_record)
        .transpose()
    }
}

impl BeneficiaryStore for PgStore {
    fn insert_beneficiary<'a>(
        &'a self,
        beneficiary: &'a Beneficiary,
    ) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO beneficiaries
                    (id, card_number, name, phone, address, reference_embedding, status, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            )
            .bind(*beneficiary.id.as_uuid())
            .bind(beneficiary.card_number.as_str())
            .bind(beneficiary.name.as_str())
            .bind(beneficiary.phone.as_deref())
            .bind(beneficiary.address.as_deref())
            .bind(embedding_json(&beneficiary.reference_embedding)?)
            .bind(beneficiary.status.as_str())
            .bind(beneficiary.created_at)
            .bind(beneficiary.updated_at)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
            Ok(())
        })
    }

    fn beneficiary_by_card<'a>(
        &'a self,
        card_number: &'a CardNumber,
    ) -> BoxFuture<'a, StoreResult<Option<Beneficiary>>> {
        Box::pin(async move {
            sqlx::query_as::<_, BeneficiaryRow>(&format!(
                "SELECT {COLUMNS} FROM beneficiaries WHERE card_number = $1"
            ))
            .bind(card_number.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?
            .map(BeneficiaryRow::into_record)
            .transpose()
        })
    }

    fn apply_status_change<'a>(
        &'a self,
        change: &'a StatusChange,
    ) -> BoxFuture<'a, StoreResult<Guarded<Beneficiary>>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await.map_err(store_error)?;
            let updated = sqlx::query_as::<_, BeneficiaryRow>(&format!(
                "UPDATE beneficiaries SET status = $2, updated_at = $3
                 WHERE id = $1 AND status = $4
                 RETURNING {COLUMNS}"
            ))
            .bind(*change.beneficiary_id.as_uuid())
            .bind(change.to_status.as_str())
            .bind(change.changed_at)
            .bind(change.from_status.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(store_error)?;

            let Some(row) = updated else {
                tx.rollback().await.map_err(store_error)?;
                return Ok(match self.beneficiary_by_id(change.beneficiary_id).await? {
                    Some(current) => Guarded::Stale(current),
                    None => Guarded::Missing,
                });
            };

            sqlx::query(
                "INSERT INTO beneficiary_status_changes
                    (beneficiary_id, from_status, to_status, changed_by, reason, changed_at)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(*change.beneficiary_id.as_uuid())
            .bind(change.from_status.as_str())
            .bind(change.to_status.as_str())
            .bind(change.changed_by.as_str())
            .bind(change.reason.as_deref())
            .bind(change.changed_at)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;

            tx.commit().await.map_err(store_error)?;
            Ok(Guarded::Applied(row.into_record()?))
        })
    }

    fn replace_reference_embedding<'a>(
        &'a self,
        id: BeneficiaryId,
        embedding: &'a FaceEmbedding,
        at: DateTime<Utc>,
    ) -> BoxFuture<'a, StoreResult<Option<Beneficiary>>> {
        Box::pin(async move {
            sqlx::query_as::<_, BeneficiaryRow>(&format!(
                "UPDATE beneficiaries SET reference_embedding = $2, updated_at = $3
                 WHERE id = $1
                 RETURNING {COLUMNS}"
            ))
            .bind(*id.as_uuid())
            .bind(embedding_json(embedding)?)
            .bind(at)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?
            .map(BeneficiaryRow::into_record)
            .transpose()
        })
    }

    fn status_history(&self, id: BeneficiaryId) -> BoxFuture<'_, StoreResult<Vec<StatusChange>>> {
        Box::pin(async move {
            sqlx::query_as::<_, StatusChangeRow>(
                "SELECT seq, beneficiary_id, from_status, to_status, changed_by, reason, changed_at
                 FROM beneficiary_status_changes
                 WHERE beneficiary_id = $1
                 ORDER BY seq",
            )
            .bind(*id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?
            .into_iter()
            .map(StatusChangeRow::into_record)
            .collect()
        })
    }

    fn list_beneficiaries(
        &self,
        filter: BeneficiaryFilter,
    ) -> BoxFuture<'_, StoreResult<Vec<Beneficiary>>> {
        Box::pin(async move {
            sqlx::query_as::<_, BeneficiaryRow>(&format!(
                "SELECT {COLUMNS} FROM beneficiaries
                 WHERE ($1::text IS NULL OR status = $1)
                 ORDER BY created_at DESC, seq DESC
                 LIMIT $2"
            ))
            .bind(filter.status.map(|s| s.as_str()))
            .bind(sql_limit(filter.limit))
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?
            .into_iter()
            .map(BeneficiaryRow::into_record)
            .collect()
        })
    }
}
