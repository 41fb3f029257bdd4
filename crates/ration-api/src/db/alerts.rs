//! Duplicate alerts and dashboard aggregates.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use ration_core::{
    AlertId, AlertType, BeneficiaryId, CardNumber, Severity, ShopId, StaffRef, TransactionId,
};
use ration_engine::store::{AlertFilter, AlertStore, DashboardStore, Guarded, StoreResult};
use ration_engine::{BoxFuture, DashboardCounts, DuplicateAlert};
use ration_state::AlertReview;

use super::{corrupt, count, sql_limit, store_error, PgStore};

const COLUMNS: &str = "id, alert_type, severity, status, transaction_id, previous_transaction_id, \
     beneficiary_id, card_number, shop_id, description, created_at, reviewed_by, reviewed_at";

#[derive(sqlx::FromRow)]
struct AlertRow {
    id: Uuid,
    alert_type: String,
    severity: String,
    status: String,
    transaction_id: Uuid,
    previous_transaction_id: Option<Uuid>,
    beneficiary_id: Option<Uuid>,
    card_number: String,
    shop_id: Uuid,
    description: String,
    created_at: DateTime<Utc>,
    reviewed_by: Option<String>,
    reviewed_at: Option<DateTime<Utc>>,
}

impl AlertRow {
    fn into_record(self) -> StoreResult<DuplicateAlert> {
        let id = self.id;
        let bad = |e: ration_core::ValidationError| corrupt("alert", id, e);
        Ok(DuplicateAlert {
            id: AlertId::from_uuid(id),
            alert_type: self.alert_type.parse::<AlertType>().map_err(bad)?,
            severity: self.severity.parse::<Severity>().map_err(bad)?,
            status: self.status.parse().map_err(bad)?,
            transaction_id: TransactionId::from_uuid(self.transaction_id),
            previous_transaction_id: self.previous_transaction_id.map(TransactionId::from_uuid),
            beneficiary_id: self.beneficiary_id.map(BeneficiaryId::from_uuid),
            card_number: CardNumber::new(self.card_number).map_err(bad)?,
            shop_id: ShopId::from_uuid(self.shop_id),
            description: self.description,
            created_at: self.created_at,
            reviewed_by: self.reviewed_by.map(StaffRef::new).transpose().map_err(bad)?,
            reviewed_at: self.reviewed_at,
        })
    }
}

fn collect(rows: Vec<AlertRow>) -> StoreResult<Vec<DuplicateAlert>> {
    rows.into_iter().map(AlertRow::into_record).collect()
}

impl AlertStore for PgStore {
    fn insert_alert<'a>(&'a self, alert: &'a DuplicateAlert) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            sqlx::query(&format!(
                "INSERT INTO duplicate_alerts ({COLUMNS})
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"
            ))
            .bind(*alert.id.as_uuid())
            .bind(alert.alert_type.as_str())
            .bind(alert.severity.as_str())
            .bind(alert.status.as_str())
            .bind(*alert.transaction_id.as_uuid())
            .bind(alert.previous_transaction_id.map(|t| *t.as_uuid()))
            .bind(alert.beneficiary_id.map(|b| *b.as_uuid()))
            .bind(alert.card_number.as_str())
            .bind(*alert.shop_id.as_uuid())
            .bind(alert.description.as_str())
            .bind(alert.created_at)
            .bind(alert.reviewed_by.as_ref().map(|r| r.as_str()))
            .bind(alert.reviewed_at)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
            Ok(())
        })
    }

    fn alert(&self, id: AlertId) -> BoxFuture<'_, StoreResult<Option<DuplicateAlert>>> {
        Box::pin(async move {
            sqlx::query_as::<_, AlertRow>(&format!(
                "SELECT {COLUMNS} FROM duplicate_alerts WHERE id = $1"
            ))
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?
            .map(AlertRow::into_record)
            .transpose()
        })
    }

    fn alerts_for_transactions<'a>(
        &'a self,
        transaction_ids: &'a [TransactionId],
    ) -> BoxFuture<'a, StoreResult<Vec<DuplicateAlert>>> {
        Box::pin(async move {
            let ids: Vec<Uuid> = transaction_ids.iter().map(|t| *t.as_uuid()).collect();
            let rows = sqlx::query_as::<_, AlertRow>(&format!(
                "SELECT {COLUMNS} FROM duplicate_alerts
                 WHERE transaction_id = ANY($1)
                 ORDER BY created_at, seq"
            ))
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
            collect(rows)
        })
    }

    fn review_alert<'a>(
        &'a self,
        id: AlertId,
        review: &'a AlertReview,
    ) -> BoxFuture<'a, StoreResult<Guarded<DuplicateAlert>>> {
        Box::pin(async move {
            let reviewed = sqlx::query_as::<_, AlertRow>(&format!(
                "UPDATE duplicate_alerts
                 SET status = $2, reviewed_by = $3, reviewed_at = $4
                 WHERE id = $1 AND status = 'pending'
                 RETURNING {COLUMNS}"
            ))
            .bind(*id.as_uuid())
            .bind(review.status.as_str())
            .bind(review.reviewed_by.as_str())
            .bind(review.reviewed_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

            Ok(match reviewed {
                Some(row) => Guarded::Applied(row.into_record()?),
                None => match self.alert(id).await? {
                    Some(current) => Guarded::Stale(current),
                    None => Guarded::Missing,
                },
            })
        })
    }

    fn list_alerts(&self, filter: AlertFilter) -> BoxFuture<'_, StoreResult<Vec<DuplicateAlert>>> {
        Box::pin(async move {
            let rows = sqlx::query_as::<_, AlertRow>(&format!(
                "SELECT {COLUMNS} FROM duplicate_alerts
                 WHERE ($1::text IS NULL OR status = $1)
                   AND ($2::text IS NULL OR severity = $2)
                 ORDER BY created_at DESC, seq DESC
                 LIMIT $3"
            ))
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.severity.map(|s| s.as_str()))
            .bind(sql_limit(filter.limit))
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
            collect(rows)
        })
    }
}

impl DashboardStore for PgStore {
    fn dashboard_counts(&self) -> BoxFuture<'_, StoreResult<DashboardCounts>> {
        Box::pin(async move {
            let (total_b, active_b, suspended_b, blocked_b): (i64, i64, i64, i64) = sqlx::query_as(
                "SELECT COUNT(*),
                        COUNT(*) FILTER (WHERE status = 'active'),
                        COUNT(*) FILTER (WHERE status = 'suspended'),
                        COUNT(*) FILTER (WHERE status = 'blocked')
                 FROM beneficiaries",
            )
            .fetch_one(&self.pool)
            .await
            .map_err(store_error)?;

            let (total_t, success_t, flagged_t, failed_t): (i64, i64, i64, i64) = sqlx::query_as(
                "SELECT COUNT(*),
                        COUNT(*) FILTER (WHERE status = 'success'),
                        COUNT(*) FILTER (WHERE status = 'flagged'),
                        COUNT(*) FILTER (WHERE status = 'failed')
                 FROM transactions",
            )
            .fetch_one(&self.pool)
            .await
            .map_err(store_error)?;

            let (pending, critical, high, medium): (i64, i64, i64, i64) = sqlx::query_as(
                "SELECT COUNT(*),
                        COUNT(*) FILTER (WHERE severity = 'critical'),
                        COUNT(*) FILTER (WHERE severity = 'high'),
                        COUNT(*) FILTER (WHERE severity = 'medium')
                 FROM duplicate_alerts
                 WHERE status = 'pending'",
            )
            .fetch_one(&self.pool)
            .await
            .map_err(store_error)?;

            Ok(DashboardCounts {
                total_beneficiaries: count(total_b),
                active_beneficiaries: count(active_b),
                suspended_beneficiaries: count(suspended_b),
                blocked_beneficiaries: count(blocked_b),
                total_transactions: count(total_t),
                successful_transactions: count(success_t),
                flagged_transactions: count(flagged_t),
                failed_transactions: count(failed_t),
                pending_alerts: count(pending),
                critical_alerts: count(critical),
                high_alerts: count(high),
                medium_alerts: count(medium),
            })
        })
    }
}
