//! Shops and distribution cycles.

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use ration_core::{CycleId, CycleStatus, ShopCode, ShopId};
use ration_engine::store::{Guarded, ReferenceStore, StoreResult};
use ration_engine::{BoxFuture, DistributionCycle, RationShop};

use super::{corrupt, store_error, PgStore};

const SHOP_COLUMNS: &str = "id, shop_code, name, address, district, created_at";
const CYCLE_COLUMNS: &str = "id, name, start_date, end_date, status, created_at, closed_at";

#[derive(sqlx::FromRow)]
struct ShopRow {
    id: Uuid,
    shop_code: String,
    name: String,
    address: Option<String>,
    district: Option<String>,
    created_at: DateTime<Utc>,
}

impl ShopRow {
    fn into_record(self) -> StoreResult<RationShop> {
        let id = self.id;
        Ok(RationShop {
            id: ShopId::from_uuid(id),
            shop_code: ShopCode::new(self.shop_code).map_err(|e| corrupt("shop", id, e))?,
            name: self.name,
            address: self.address,
            district: self.district,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CycleRow {
    id: Uuid,
    name: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    status: String,
    created_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
}

impl CycleRow {
    fn into_record(self) -> StoreResult<DistributionCycle> {
        let id = self.id;
        Ok(DistributionCycle {
            id: CycleId::from_uuid(id),
            name: self.name,
            start_date: self.start_date,
            end_date: self.end_date,
            status: self.status.parse().map_err(|e| corrupt("cycle", id, e))?,
            created_at: self.created_at,
            closed_at: self.closed_at,
        })
    }
}

impl PgStore {
    async fn cycles_where(&self, clause: &str) -> StoreResult<Vec<DistributionCycle>> {
        sqlx::query_as::<_, CycleRow>(&format!(
            "SELECT {CYCLE_COLUMNS} FROM distribution_cycles {clause} ORDER BY created_at DESC, seq DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?
        .into_iter()
        .map(CycleRow::into_record)
        .collect()
    }
}

impl ReferenceStore for PgStore {
    fn insert_shop<'a>(&'a self, shop: &'a RationShop) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO ration_shops (id, shop_code, name, address, district, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(*shop.id.as_uuid())
            .bind(shop.shop_code.as_str())
            .bind(shop.name.as_str())
            .bind(shop.address.as_deref())
            .bind(shop.district.as_deref())
            .bind(shop.created_at)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
            Ok(())
        })
    }

    fn shop(&self, id: ShopId) -> BoxFuture<'_, StoreResult<Option<RationShop>>> {
        Box::pin(async move {
            sqlx::query_as::<_, ShopRow>(&format!(
                "SELECT {SHOP_COLUMNS} FROM ration_shops WHERE id = $1"
            ))
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?
            .map(ShopRow::into_record)
            .transpose()
        })
    }

    fn list_shops(&self) -> BoxFuture<'_, StoreResult<Vec<RationShop>>> {
        Box::pin(async move {
            sqlx::query_as::<_, ShopRow>(&format!(
                "SELECT {SHOP_COLUMNS} FROM ration_shops ORDER BY shop_code"
            ))
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?
            .into_iter()
            .map(ShopRow::into_record)
            .collect()
        })
    }

    fn insert_cycle<'a>(
        &'a self,
        cycle: &'a DistributionCycle,
    ) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO distribution_cycles
                    (id, name, start_date, end_date, status, created_at, closed_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(*cycle.id.as_uuid())
            .bind(cycle.name.as_str())
            .bind(cycle.start_date)
            .bind(cycle.end_date)
            .bind(cycle.status.as_str())
            .bind(cycle.created_at)
            .bind(cycle.closed_at)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
            Ok(())
        })
    }

    fn cycle(&self, id: CycleId) -> BoxFuture<'_, StoreResult<Option<DistributionCycle>>> {
        Box::pin(async move {
            sqlx::query_as::<_, CycleRow>(&format!(
                "SELECT {CYCLE_COLUMNS} FROM distribution_cycles WHERE id = $1"
            ))
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?
            .map(CycleRow::into_record)
            .transpose()
        })
    }

    fn active_cycles(&self) -> BoxFuture<'_, StoreResult<Vec<DistributionCycle>>> {
        Box::pin(self.cycles_where("WHERE status = 'active'"))
    }

    fn list_cycles(&self) -> BoxFuture<'_, StoreResult<Vec<DistributionCycle>>> {
        Box::pin(self.cycles_where(""))
    }

    fn close_cycle(
        &self,
        id: CycleId,
        target: CycleStatus,
        at: DateTime<Utc>,
    ) -> BoxFuture<'_, StoreResult<Guarded<DistributionCycle>>> {
        Box::pin(async move {
            let closed = sqlx::query_as::<_, CycleRow>(&format!(
                "UPDATE distribution_cycles SET status = $2, closed_at = $3
                 WHERE id = $1 AND status = 'active'
                 RETURNING {CYCLE_COLUMNS}"
            ))
            .bind(*id.as_uuid())
            .bind(target.as_str())
            .bind(at)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

            Ok(match closed {
                Some(row) => Guarded::Applied(row.into_record()?),
                None => match self.cycle(id).await? {
                    Some(current) => Guarded::Stale(current),
                    None => Guarded::Missing,
                },
            })
        })
    }
}
