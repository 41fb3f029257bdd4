//! # Verification Orchestrator
//!
//! Runs one counter attempt through a fixed sequence of stages:
//!
//! ```text
//! RECEIVED → IDENTITY_RESOLVED → FACE_COMPARED → LEDGER_WRITTEN
//!          → RULES_EVALUATED → ALERTS_PERSISTED → RESPONDED
//! ```
//!
//! - No active cycle (or more than one): the request fails before any write.
//! - Unknown card: a `failed` transaction is written and the flow jumps to
//!   RESPONDED without evaluating rules.
//! - Inactive beneficiary: a `failed` transaction is written without
//!   calling the comparator.
//! - Comparator failure: a `failed` transaction with reason
//!   `face_service_unavailable` and no confidence. Never `different_person`.
//! - After the transaction is written, nothing is rolled back. A history
//!   read, escalation or alert write that fails turns the outcome into
//!   [`EngineError::CompletionInconsistency`], which still carries the
//!   computed result.
//!
//! Nothing is retried; a caller retry is a new attempt with a new
//! transaction.

use std::sync::Arc;

use ration_core::{
    AlertId, AlertStatus, AlertType, BeneficiaryStatus, CardNumber, Confidence, DetectionConfig,
    FaceEmbedding, FaceSample, RejectionReason, StaffRef, TransactionStatus,
};
use ration_state::{review_target, AlertReview};

use crate::clock::Clock;
use crate::comparator::{ComparatorError, FaceComparator};
use crate::error::{CompletionInconsistency, EngineError};
use crate::ledger::{NewTransaction, TransactionLedger};
use crate::model::{
    AlertSummary, Beneficiary, DistributionCycle, DuplicateAlert, IdentityFields, Transaction,
    VerificationRequest, VerificationResult,
};
use crate::registry::IdentityRegistry;
use crate::rules::{self, RuleInput};
use crate::store::{Guarded, Stores};

/// Stages of a verification, logged at debug level as they complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationStage {
    /// Request accepted for processing.
    Received,
    /// Card number looked up.
    IdentityResolved,
    /// Face sample scored.
    FaceCompared,
    /// Transaction appended.
    LedgerWritten,
    /// Duplicate rules run.
    RulesEvaluated,
    /// Escalation and alerts written.
    AlertsPersisted,
    /// Result returned.
    Responded,
}

impl VerificationStage {
    /// Log label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::IdentityResolved => "identity_resolved",
            Self::FaceCompared => "face_compared",
            Self::LedgerWritten => "ledger_written",
            Self::RulesEvaluated => "rules_evaluated",
            Self::AlertsPersisted => "alerts_persisted",
            Self::Responded => "responded",
        }
    }
}

impl std::fmt::Display for VerificationStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operator message for an outcome.
fn outcome_message(
    status: TransactionStatus,
    rejection: Option<RejectionReason>,
    confidence: Option<Confidence>,
) -> String {
    match (status, rejection) {
        (TransactionStatus::Success, _) => "Verification successful".into(),
        (TransactionStatus::Flagged, _) => "Verification completed with alerts".into(),
        (_, Some(RejectionReason::NoFaceDetected)) => "No face detected in captured sample".into(),
        (_, Some(RejectionReason::FaceServiceUnavailable)) => {
            "Face comparison service unavailable; this is not a face mismatch".into()
        }
        (_, Some(RejectionReason::CardNotRegistered)) => "Card number not found in system".into(),
        (_, Some(RejectionReason::BeneficiaryInactive)) => {
            "Beneficiary account is not active".into()
        }
        (_, _) => match confidence {
            Some(c) => format!("Face verification failed. Confidence: {c}%"),
            None => "Face verification failed".into(),
        },
    }
}

/// The verification engine: one instance per process, shared by handlers.
#[derive(Clone)]
pub struct VerificationEngine {
    stores: Stores,
    comparator: Arc<dyn FaceComparator>,
    clock: Arc<dyn Clock>,
    config: DetectionConfig,
    registry: IdentityRegistry,
    ledger: TransactionLedger,
}

impl std::fmt::Debug for VerificationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationEngine")
            .field("comparator", &self.comparator.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl VerificationEngine {
    /// Assemble the engine.
    pub fn new(
        stores: Stores,
        comparator: Arc<dyn FaceComparator>,
        clock: Arc<dyn Clock>,
        config: DetectionConfig,
    ) -> Self {
        let registry = IdentityRegistry::new(stores.beneficiaries.clone(), clock.clone());
        let ledger = TransactionLedger::new(stores.ledger.clone(), clock.clone());
        Self {
            stores,
            comparator,
            clock,
            config,
            registry,
            ledger,
        }
    }

    /// Detection thresholds in force.
    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Datastore handles.
    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    /// Identity Registry.
    pub fn registry(&self) -> &IdentityRegistry {
        &self.registry
    }

    /// Transaction Ledger.
    pub fn ledger(&self) -> &TransactionLedger {
        &self.ledger
    }

    /// Time source.
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Comparator backend name.
    pub fn comparator_name(&self) -> &str {
        self.comparator.name()
    }

    /// The single active distribution cycle.
    ///
    /// # Errors
    ///
    /// [`EngineError::Configuration`] when zero or several cycles are active.
    pub async fn active_cycle(&self) -> Result<DistributionCycle, EngineError> {
        let mut active = self.stores.reference.active_cycles().await?;
        match active.len() {
            1 => Ok(active.remove(0)),
            0 => Err(EngineError::Configuration(
                "no active distribution cycle".into(),
            )),
            n => Err(EngineError::Configuration(format!(
                "{n} distribution cycles are active; exactly one is required"
            ))),
        }
    }

    fn stage(&self, stage: VerificationStage, card_number: &CardNumber) {
        tracing::debug!(stage = stage.as_str(), card_number = %card_number, "verification stage");
    }

    /// Verify one counter attempt.
    pub async fn verify(
        &self,
        request: VerificationRequest,
    ) -> Result<VerificationResult, EngineError> {
        let card = request.card_number.clone();
        self.stage(VerificationStage::Received, &card);

        let cycle = self.active_cycle().await?;
        if self.stores.reference.shop(request.shop_id).await?.is_none() {
            return Err(EngineError::Validation(format!(
                "unknown shop {}",
                request.shop_id
            )));
        }

        let beneficiary = self.registry.lookup(&card).await?;
        self.stage(VerificationStage::IdentityResolved, &card);

        let Some(beneficiary) = beneficiary else {
            let tx = self
                .append_failed(&request, &cycle, None, RejectionReason::CardNotRegistered)
                .await?;
            tracing::info!(
                transaction_id = %tx.id,
                card_number = %card,
                shop_id = %request.shop_id,
                "verification rejected: card not registered"
            );
            self.stage(VerificationStage::Responded, &card);
            return Ok(self.rejected_result(&tx, None, RejectionReason::CardNotRegistered));
        };

        if !beneficiary.is_active() {
            let tx = self
                .append_failed(
                    &request,
                    &cycle,
                    Some(&beneficiary),
                    RejectionReason::BeneficiaryInactive,
                )
                .await?;
            tracing::info!(
                transaction_id = %tx.id,
                beneficiary_id = %beneficiary.id,
                status = %beneficiary.status,
                "verification rejected: beneficiary inactive"
            );
            self.stage(VerificationStage::Responded, &card);
            let mut result =
                self.rejected_result(&tx, Some(&beneficiary), RejectionReason::BeneficiaryInactive);
            result.message = format!("Beneficiary account is {}", beneficiary.status);
            return Ok(result);
        }

        let (confidence, rejection) = self
            .score(&beneficiary.reference_embedding, &request.face_sample)
            .await;
        self.stage(VerificationStage::FaceCompared, &card);

        let tx = self
            .ledger
            .append(NewTransaction {
                beneficiary_id: Some(beneficiary.id),
                card_number: card.clone(),
                shop_id: request.shop_id,
                cycle_id: cycle.id,
                operator_id: request.operator_id,
                face_match_confidence: confidence,
                status: if rejection.is_none() {
                    TransactionStatus::Success
                } else {
                    TransactionStatus::Failed
                },
                rejection_reason: rejection,
                items_collected: request.items_collected,
            })
            .await?;
        self.stage(VerificationStage::LedgerWritten, &card);

        self.complete(tx, &beneficiary).await
    }

    /// Scores the sample. Failures become a rejection reason, never a score.
    async fn score(
        &self,
        reference: &FaceEmbedding,
        sample: &FaceSample,
    ) -> (Option<Confidence>, Option<RejectionReason>) {
        let outcome = match self.comparator.embed(sample).await {
            Ok(candidate) => self.comparator.compare(reference, &candidate).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(c) if c.meets(self.config.face_match_threshold) => (Some(c), None),
            Ok(c) => (Some(c), Some(RejectionReason::FaceRejected)),
            Err(ComparatorError::NoFaceDetected) => (None, Some(RejectionReason::NoFaceDetected)),
            Err(ComparatorError::IncompatibleEmbeddings {
                reference,
                candidate,
            }) => {
                // Reference enrolled with another model; it needs replacing.
                tracing::error!(
                    comparator = self.comparator.name(),
                    reference_dimensions = reference,
                    candidate_dimensions = candidate,
                    "reference embedding is incompatible with the sample embedding"
                );
                (None, Some(RejectionReason::FaceServiceUnavailable))
            }
            Err(e) => {
                tracing::warn!(
                    comparator = self.comparator.name(),
                    error = %e,
                    "face comparison failed"
                );
                (None, Some(RejectionReason::FaceServiceUnavailable))
            }
        }
    }

    async fn append_failed(
        &self,
        request: &VerificationRequest,
        cycle: &DistributionCycle,
        beneficiary: Option<&Beneficiary>,
        reason: RejectionReason,
    ) -> Result<Transaction, EngineError> {
        self.ledger
            .append(NewTransaction {
                beneficiary_id: beneficiary.map(|b| b.id),
                card_number: request.card_number.clone(),
                shop_id: request.shop_id,
                cycle_id: cycle.id,
                operator_id: request.operator_id.clone(),
                face_match_confidence: None,
                status: TransactionStatus::Failed,
                rejection_reason: Some(reason),
                items_collected: request.items_collected.clone(),
            })
            .await
    }

    fn rejected_result(
        &self,
        tx: &Transaction,
        beneficiary: Option<&Beneficiary>,
        reason: RejectionReason,
    ) -> VerificationResult {
        VerificationResult {
            accepted: false,
            transaction_id: tx.id,
            beneficiary_id: beneficiary.map(|b| b.id),
            transaction_status: TransactionStatus::Failed,
            confidence: None,
            alerts: Vec::new(),
            message: outcome_message(TransactionStatus::Failed, Some(reason), None),
            rejection_reason: Some(reason),
        }
    }

    /// The transaction as written, before any rule ran.
    fn recorded_result(&self, tx: &Transaction, beneficiary: &Beneficiary) -> VerificationResult {
        VerificationResult {
            accepted: tx.status.is_accepted(),
            transaction_id: tx.id,
            beneficiary_id: Some(beneficiary.id),
            transaction_status: tx.status,
            confidence: tx.face_match_confidence,
            alerts: Vec::new(),
            message: outcome_message(tx.status, tx.rejection_reason, tx.face_match_confidence),
            rejection_reason: tx.rejection_reason,
        }
    }

    /// Rules, escalation and alerts for a written transaction.
    async fn complete(
        &self,
        tx: Transaction,
        beneficiary: &Beneficiary,
    ) -> Result<VerificationResult, EngineError> {
        let card = tx.card_number.clone();
        let histories = async {
            let by_card = self.ledger.find_by_card_in_cycle(&card, tx.cycle_id).await?;
            let by_beneficiary = self
                .ledger
                .find_by_beneficiary_in_cycle(beneficiary.id, tx.cycle_id)
                .await?;
            Ok::<_, EngineError>((by_card, by_beneficiary))
        }
        .await;
        let (card_history, beneficiary_history) = match histories {
            Ok(h) => h,
            Err(e) => {
                tracing::error!(
                    transaction_id = %tx.id,
                    error = %e,
                    "transaction recorded but history could not be read"
                );
                let inconsistency = CompletionInconsistency {
                    transaction_id: tx.id,
                    evaluation_failed: true,
                    failed_alert_types: Vec::new(),
                    escalation_failed: false,
                    result: self.recorded_result(&tx, beneficiary),
                };
                tracing::error!(
                    transaction_id = %tx.id,
                    detail = %inconsistency,
                    "verification completion inconsistency"
                );
                return Err(inconsistency.into());
            }
        };

        let evaluation = rules::evaluate(
            &RuleInput {
                current: &tx,
                beneficiary: Some(beneficiary),
                card_history: &card_history,
                beneficiary_history: &beneficiary_history,
            },
            &self.config,
        );
        self.stage(VerificationStage::RulesEvaluated, &card);

        let mut escalation_failed = false;
        if evaluation.status == TransactionStatus::Flagged {
            if let Err(e) = self.ledger.escalate(&tx).await {
                tracing::error!(
                    transaction_id = %tx.id,
                    error = %e,
                    "escalation to flagged failed"
                );
                escalation_failed = true;
            }
        }

        let mut summaries = Vec::with_capacity(evaluation.alerts.len());
        let mut failed_alert_types: Vec<AlertType> = Vec::new();
        for spec in evaluation.alerts {
            let alert = DuplicateAlert {
                id: AlertId::new(),
                alert_type: spec.alert_type,
                severity: spec.severity,
                status: AlertStatus::Pending,
                transaction_id: tx.id,
                previous_transaction_id: spec.previous_transaction_id,
                beneficiary_id: tx.beneficiary_id,
                card_number: tx.card_number.clone(),
                shop_id: tx.shop_id,
                description: spec.description.clone(),
                created_at: self.clock.now(),
                reviewed_by: None,
                reviewed_at: None,
            };
            let alert_id = match self.stores.alerts.insert_alert(&alert).await {
                Ok(()) => {
                    tracing::warn!(
                        alert_id = %alert.id,
                        alert_type = %alert.alert_type,
                        severity = %alert.severity,
                        transaction_id = %tx.id,
                        card_number = %card,
                        "duplicate alert raised"
                    );
                    Some(alert.id)
                }
                Err(e) => {
                    tracing::error!(
                        alert_type = %alert.alert_type,
                        transaction_id = %tx.id,
                        error = %e,
                        "alert could not be persisted"
                    );
                    failed_alert_types.push(alert.alert_type);
                    None
                }
            };
            summaries.push(AlertSummary {
                alert_id,
                alert_type: spec.alert_type,
                severity: spec.severity,
                description: spec.description,
                previous_transaction_id: spec.previous_transaction_id,
            });
        }
        self.stage(VerificationStage::AlertsPersisted, &card);

        let status = evaluation.status;
        let rejection_reason = if status == TransactionStatus::Failed {
            tx.rejection_reason
        } else {
            None
        };
        let result = VerificationResult {
            accepted: status.is_accepted(),
            transaction_id: tx.id,
            beneficiary_id: Some(beneficiary.id),
            transaction_status: status,
            confidence: tx.face_match_confidence,
            alerts: summaries,
            message: outcome_message(status, rejection_reason, tx.face_match_confidence),
            rejection_reason,
        };
        self.stage(VerificationStage::Responded, &card);

        if escalation_failed || !failed_alert_types.is_empty() {
            let inconsistency = CompletionInconsistency {
                transaction_id: tx.id,
                evaluation_failed: false,
                failed_alert_types,
                escalation_failed,
                result,
            };
            tracing::error!(
                transaction_id = %tx.id,
                detail = %inconsistency,
                "verification completion inconsistency"
            );
            return Err(inconsistency.into());
        }

        tracing::info!(
            transaction_id = %tx.id,
            beneficiary_id = %beneficiary.id,
            status = %status,
            alerts = result.alerts.len(),
            "verification completed"
        );
        Ok(result)
    }

    /// Register a beneficiary, extracting the reference face from `sample`.
    pub async fn register_beneficiary(
        &self,
        card_number: CardNumber,
        identity: IdentityFields,
        sample: &FaceSample,
    ) -> Result<Beneficiary, EngineError> {
        if self.registry.lookup(&card_number).await?.is_some() {
            return Err(EngineError::DuplicateCard(card_number));
        }
        let embedding = self.extract_reference(sample).await?;
        self.registry.register(card_number, identity, embedding).await
    }

    /// Register with an embedding computed elsewhere.
    pub async fn register_with_embedding(
        &self,
        card_number: CardNumber,
        identity: IdentityFields,
        embedding: FaceEmbedding,
    ) -> Result<Beneficiary, EngineError> {
        self.registry.register(card_number, identity, embedding).await
    }

    /// Replace a beneficiary's reference face from a new sample.
    pub async fn replace_reference_face(
        &self,
        card_number: &CardNumber,
        sample: &FaceSample,
    ) -> Result<Beneficiary, EngineError> {
        self.registry.require(card_number).await?;
        let embedding = self.extract_reference(sample).await?;
        self.registry.replace_reference(card_number, embedding).await
    }

    async fn extract_reference(&self, sample: &FaceSample) -> Result<FaceEmbedding, EngineError> {
        match self.comparator.embed(sample).await {
            Ok(e) => Ok(e),
            Err(ComparatorError::NoFaceDetected) => Err(EngineError::Validation(
                "No face detected in image".into(),
            )),
            Err(e) => Err(EngineError::FaceService(e)),
        }
    }

    /// Change eligibility; see [`IdentityRegistry::set_status`].
    pub async fn set_beneficiary_status(
        &self,
        card_number: &CardNumber,
        status: BeneficiaryStatus,
        changed_by: StaffRef,
        reason: Option<String>,
    ) -> Result<Beneficiary, EngineError> {
        self.registry
            .set_status(card_number, status, changed_by, reason)
            .await
    }

    /// Resolve or dismiss a pending alert.
    ///
    /// A requested status other than `resolved` or `dismissed` is a
    /// validation error regardless of the alert's state.
    pub async fn review_alert(
        &self,
        id: AlertId,
        requested: AlertStatus,
        reviewer: StaffRef,
    ) -> Result<DuplicateAlert, EngineError> {
        if !requested.is_terminal() {
            return Err(EngineError::Validation(format!(
                "review status must be resolved or dismissed, not {requested}"
            )));
        }
        let not_found = || EngineError::NotFound {
            kind: "alert",
            key: id.to_string(),
        };
        let alert = self.stores.alerts.alert(id).await?.ok_or_else(not_found)?;
        let status = review_target(alert.status, requested)?;
        let review = AlertReview {
            status,
            reviewed_by: reviewer,
            reviewed_at: self.clock.now(),
        };
        match self.stores.alerts.review_alert(id, &review).await? {
            Guarded::Applied(updated) => {
                tracing::info!(
                    alert_id = %id,
                    status = %updated.status,
                    reviewed_by = %review.reviewed_by,
                    "alert reviewed"
                );
                Ok(updated)
            }
            Guarded::Stale(current) => Err(review_target(current.status, requested)
                .err()
                .map_or_else(
                    || EngineError::Conflict(format!("alert {id} changed concurrently")),
                    EngineError::from,
                )),
            Guarded::Missing => Err(not_found()),
        }
    }
}
