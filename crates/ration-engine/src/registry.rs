//! # Identity Registry
//!
//! One record per ration card. The card number is the unique business key;
//! the datastore enforces uniqueness atomically with the insert, so two
//! concurrent registrations of the same card yield exactly one record.

use std::sync::Arc;

use ration_core::{BeneficiaryId, BeneficiaryStatus, CardNumber, FaceEmbedding, StaffRef};
use ration_state::StatusChange;

use crate::clock::Clock;
use crate::error::EngineError;
use crate::model::{Beneficiary, IdentityFields};
use crate::store::{BeneficiaryStore, Guarded, StoreError, UniqueKey};

/// Registry operations over a [`BeneficiaryStore`].
#[derive(Clone)]
pub struct IdentityRegistry {
    store: Arc<dyn BeneficiaryStore>,
    clock: Arc<dyn Clock>,
}

impl IdentityRegistry {
    /// Build over `store`.
    pub fn new(store: Arc<dyn BeneficiaryStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Create an active beneficiary.
    ///
    /// # Errors
    ///
    /// [`EngineError::DuplicateCard`] when the card number is taken.
    pub async fn register(
        &self,
        card_number: CardNumber,
        identity: IdentityFields,
        reference_embedding: FaceEmbedding,
    ) -> Result<Beneficiary, EngineError> {
        let now = self.clock.now();
        let (name, phone, address) = identity.into_parts();
        let beneficiary = Beneficiary {
            id: BeneficiaryId::new(),
            card_number,
            name,
            phone,
            address,
            reference_embedding,
            status: BeneficiaryStatus::Active,
            created_at: now,
            updated_at: now,
        };
        match self.store.insert_beneficiary(&beneficiary).await {
            Ok(()) => {
                tracing::info!(
                    beneficiary_id = %beneficiary.id,
                    card_number = %beneficiary.card_number,
                    "beneficiary registered"
                );
                Ok(beneficiary)
            }
            Err(StoreError::UniqueViolation(UniqueKey::CardNumber)) => {
                Err(EngineError::DuplicateCard(beneficiary.card_number))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Exact lookup. Inactive beneficiaries are returned too.
    pub async fn lookup(
        &self,
        card_number: &CardNumber,
    ) -> Result<Option<Beneficiary>, EngineError> {
        Ok(self.store.beneficiary_by_card(card_number).await?)
    }

    /// Lookup that treats absence as an error.
    pub async fn require(&self, card_number: &CardNumber) -> Result<Beneficiary, EngineError> {
        self.lookup(card_number)
            .await?
            .ok_or_else(|| EngineError::NotFound {
                kind: "beneficiary",
                key: card_number.to_string(),
            })
    }

    /// Change eligibility, recording who changed it and why.
    ///
    /// Setting the current status again is a no-op and writes no history.
    pub async fn set_status(
        &self,
        card_number: &CardNumber,
        to: BeneficiaryStatus,
        changed_by: StaffRef,
        reason: Option<String>,
    ) -> Result<Beneficiary, EngineError> {
        let current = self.require(card_number).await?;
        let Some(change) = StatusChange::plan(
            current.id,
            current.status,
            to,
            changed_by,
            reason,
            self.clock.now(),
        )?
        else {
            return Ok(current);
        };

        match self.store.apply_status_change(&change).await? {
            Guarded::Applied(updated) => {
                tracing::info!(
                    beneficiary_id = %updated.id,
                    from = %change.from_status,
                    to = %change.to_status,
                    changed_by = %change.changed_by,
                    "beneficiary status changed"
                );
                Ok(updated)
            }
            Guarded::Stale(now) => Err(EngineError::Conflict(format!(
                "beneficiary {} status changed concurrently (now {})",
                card_number, now.status
            ))),
            Guarded::Missing => Err(EngineError::NotFound {
                kind: "beneficiary",
                key: card_number.to_string(),
            }),
        }
    }

    /// Replace the stored reference face.
    pub async fn replace_reference(
        &self,
        card_number: &CardNumber,
        embedding: FaceEmbedding,
    ) -> Result<Beneficiary, EngineError> {
        let current = self.require(card_number).await?;
        let updated = self
            .store
            .replace_reference_embedding(current.id, &embedding, self.clock.now())
            .await?
            .ok_or_else(|| EngineError::NotFound {
                kind: "beneficiary",
                key: card_number.to_string(),
            })?;
        tracing::info!(beneficiary_id = %updated.id, "reference face replaced");
        Ok(updated)
    }

    /// Status changes, oldest first.
    pub async fn history(
        &self,
        card_number: &CardNumber,
    ) -> Result<Vec<StatusChange>, EngineError> {
        let current = self.require(card_number).await?;
        Ok(self.store.status_history(current.id).await?)
    }
}

impl std::fmt::Debug for IdentityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityRegistry").finish_non_exhaustive()
    }
}
