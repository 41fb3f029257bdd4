//! Shop and distribution-cycle administration.

use ration_core::{CycleId, CycleStatus, ShopCode};
use ration_state::{close_target, CycleWindow};

use crate::error::EngineError;
use crate::model::{DistributionCycle, RationShop};
use crate::orchestrator::VerificationEngine;
use crate::store::{Guarded, StoreError, UniqueKey};

impl VerificationEngine {
    /// Add a distribution point.
    pub async fn create_shop(
        &self,
        shop_code: ShopCode,
        name: String,
        address: Option<String>,
        district: Option<String>,
    ) -> Result<RationShop, EngineError> {
        let shop = RationShop::new(shop_code, name, address, district, self.clock().now())?;
        match self.stores().reference.insert_shop(&shop).await {
            Ok(()) => {
                tracing::info!(shop_id = %shop.id, shop_code = %shop.shop_code, "shop created");
                Ok(shop)
            }
            Err(StoreError::UniqueViolation(UniqueKey::ShopCode)) => Err(EngineError::Conflict(
                format!("shop code {} already exists", shop.shop_code),
            )),
            Err(e) => Err(e.into()),
        }
    }

    /// Open a new active cycle. Fails while another cycle is active.
    pub async fn open_cycle(
        &self,
        name: String,
        window: CycleWindow,
    ) -> Result<DistributionCycle, EngineError> {
        let cycle = DistributionCycle::open(name, window, self.clock().now())?;
        match self.stores().reference.insert_cycle(&cycle).await {
            Ok(()) => {
                tracing::info!(
                    cycle_id = %cycle.id,
                    start = %cycle.start_date,
                    end = %cycle.end_date,
                    "distribution cycle opened"
                );
                Ok(cycle)
            }
            Err(StoreError::UniqueViolation(UniqueKey::ActiveCycle)) => Err(EngineError::Conflict(
                "a distribution cycle is already active".into(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    /// Close an active cycle as `completed` or `cancelled`.
    pub async fn close_cycle(
        &self,
        id: CycleId,
        target: CycleStatus,
    ) -> Result<DistributionCycle, EngineError> {
        if target == CycleStatus::Active {
            return Err(EngineError::Validation(
                "a cycle closes as completed or cancelled, not active".into(),
            ));
        }
        let not_found = || EngineError::NotFound {
            kind: "cycle",
            key: id.to_string(),
        };
        let current = self.stores().reference.cycle(id).await?.ok_or_else(not_found)?;
        let target = close_target(current.status, target)?;
        match self
            .stores()
            .reference
            .close_cycle(id, target, self.clock().now())
            .await?
        {
            Guarded::Applied(closed) => {
                tracing::info!(
                    cycle_id = %id,
                    status = %closed.status,
                    "distribution cycle closed"
                );
                Ok(closed)
            }
            Guarded::Stale(now) => Err(close_target(now.status, target)
                .err()
                .map_or_else(
                    || EngineError::Conflict(format!("cycle {id} changed concurrently")),
                    EngineError::from,
                )),
            Guarded::Missing => Err(not_found()),
        }
    }
}
