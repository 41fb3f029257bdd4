//! # Integration Tests for ration-engine
//!
//! Drives the engine end to end against the in-memory datastore with a
//! manual clock: verification outcomes per rule, audit completeness, alert
//! review, registration uniqueness, completion inconsistencies and
//! reconciliation of concurrent attempts.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

use ration_core::{
    AlertStatus, AlertType, BeneficiaryId, BeneficiaryStatus, CardNumber, Confidence, CycleId,
    CycleStatus, DetectionConfig, FaceEmbedding, FaceSample, RejectionReason, Severity, ShopCode,
    StaffRef, TransactionId, TransactionStatus,
};
use ration_engine::store::{
    AlertFilter, AlertStore, Guarded, LedgerStore, StoreError, StoreResult, TransactionFilter,
};
use ration_engine::{
    BoxFuture, ComparatorError, DistributionCycle, DuplicateAlert, EngineError, FaceComparator,
    IdentityFields, ManualClock, MemoryStore, RationShop, Stores, Transaction, VectorComparator,
    VerificationEngine, VerificationRequest,
};
use ration_state::{AlertReview, CycleWindow};

const CARD: &str = "RC-1001";

struct Harness {
    engine: VerificationEngine,
    clock: ManualClock,
    store: Arc<MemoryStore>,
    shop_a: RationShop,
    shop_b: RationShop,
    cycle: DistributionCycle,
}

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap()
}

fn face(v: &[f32]) -> FaceSample {
    FaceSample::new(serde_json::to_vec(v).unwrap()).unwrap()
}

fn matching_face() -> FaceSample {
    face(&[1.0, 0.0])
}

fn other_face() -> FaceSample {
    face(&[0.5, 0.866])
}

fn staff(name: &str) -> StaffRef {
    StaffRef::new(name).unwrap()
}

fn card() -> CardNumber {
    CardNumber::new(CARD).unwrap()
}

async fn harness_with(
    config: DetectionConfig,
    comparator: Arc<dyn FaceComparator>,
    wrap: impl FnOnce(Stores, Arc<MemoryStore>) -> Stores,
) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let clock = ManualClock::new(start());
    let stores = wrap(Stores::shared(store.clone()), store.clone());
    let engine = VerificationEngine::new(stores, comparator, Arc::new(clock.clone()), config);

    let shop_a = engine
        .create_shop(ShopCode::new("FPS-001").unwrap(), "Ward 4 FPS".into(), None, None)
        .await
        .unwrap();
    let shop_b = engine
        .create_shop(ShopCode::new("FPS-002").unwrap(), "Ward 9 FPS".into(), None, None)
        .await
        .unwrap();
    let window = CycleWindow::new(
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
        NaiveDate::from_ymd_opt(2026, 3, 31).unwrap(),
    )
    .unwrap();
    let cycle = engine.open_cycle("March 2026".into(), window).await.unwrap();
    engine
        .register_with_embedding(
            card(),
            IdentityFields::new("Asha Devi", None, None).unwrap(),
            FaceEmbedding::new(vec![1.0, 0.0]).unwrap(),
        )
        .await
        .unwrap();

    Harness {
        engine,
        clock,
        store,
        shop_a,
        shop_b,
        cycle,
    }
}

async fn harness() -> Harness {
    harness_with(DetectionConfig::default(), Arc::new(VectorComparator), |s, _| s).await
}

impl Harness {
    fn request(&self, shop: &RationShop, sample: FaceSample) -> VerificationRequest {
        self.request_for(CARD, shop, sample)
    }

    fn request_for(
        &self,
        card: &str,
        shop: &RationShop,
        sample: FaceSample,
    ) -> VerificationRequest {
        VerificationRequest {
            card_number: CardNumber::new(card).unwrap(),
            shop_id: shop.id,
            face_sample: sample,
            operator_id: staff("operator-7"),
            items_collected: vec![serde_json::json!({"item": "rice", "kg": 5})],
        }
    }

    async fn ledger(&self) -> Vec<Transaction> {
        self.engine
            .list_transactions(None, None, None, None)
            .await
            .unwrap()
    }
}

/// Comparator that is always down.
struct DownComparator;

impl FaceComparator for DownComparator {
    fn embed<'a>(
        &'a self,
        _sample: &'a FaceSample,
    ) -> BoxFuture<'a, Result<FaceEmbedding, ComparatorError>> {
        Box::pin(async {
            Err(ComparatorError::Unavailable {
                reason: "connection refused".into(),
            })
        })
    }

    fn compare<'a>(
        &'a self,
        _reference: &'a FaceEmbedding,
        _candidate: &'a FaceEmbedding,
    ) -> BoxFuture<'a, Result<Confidence, ComparatorError>> {
        Box::pin(async { Err(ComparatorError::Timeout { elapsed_ms: 10_000 }) })
    }

    fn name(&self) -> &str {
        "down"
    }
}

/// Alert store whose inserts always fail; reads go to the real store.
struct FailingAlertInserts(Arc<MemoryStore>);

impl AlertStore for FailingAlertInserts {
    fn insert_alert<'a>(&'a self, _alert: &'a DuplicateAlert) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async { Err(StoreError::Unavailable("disk full".into())) })
    }

    fn alert(
        &self,
        id: ration_core::AlertId,
    ) -> BoxFuture<'_, StoreResult<Option<DuplicateAlert>>> {
        self.0.alert(id)
    }

    fn alerts_for_transactions<'a>(
        &'a self,
        ids: &'a [TransactionId],
    ) -> BoxFuture<'a, StoreResult<Vec<DuplicateAlert>>> {
        self.0.alerts_for_transactions(ids)
    }

    fn review_alert<'a>(
        &'a self,
        id: ration_core::AlertId,
        review: &'a AlertReview,
    ) -> BoxFuture<'a, StoreResult<Guarded<DuplicateAlert>>> {
        self.0.review_alert(id, review)
    }

    fn list_alerts(&self, filter: AlertFilter) -> BoxFuture<'_, StoreResult<Vec<DuplicateAlert>>> {
        self.0.list_alerts(filter)
    }
}

/// Ledger whose per-card history read always fails; everything else goes
/// to the real store.
struct FailingHistoryReads(Arc<MemoryStore>);

impl LedgerStore for FailingHistoryReads {
    fn append_transaction<'a>(
        &'a self,
        transaction: &'a Transaction,
    ) -> BoxFuture<'a, StoreResult<()>> {
        self.0.append_transaction(transaction)
    }

    fn escalate_transaction(
        &self,
        id: TransactionId,
    ) -> BoxFuture<'_, StoreResult<Guarded<Transaction>>> {
        self.0.escalate_transaction(id)
    }

    fn transaction(&self, id: TransactionId) -> BoxFuture<'_, StoreResult<Option<Transaction>>> {
        self.0.transaction(id)
    }

    fn transactions_by_card_in_cycle<'a>(
        &'a self,
        _card_number: &'a CardNumber,
        _cycle_id: CycleId,
    ) -> BoxFuture<'a, StoreResult<Vec<Transaction>>> {
        Box::pin(async { Err(StoreError::Unavailable("read replica down".into())) })
    }

    fn transactions_by_beneficiary_in_cycle(
        &self,
        beneficiary_id: BeneficiaryId,
        cycle_id: CycleId,
    ) -> BoxFuture<'_, StoreResult<Vec<Transaction>>> {
        self.0.transactions_by_beneficiary_in_cycle(beneficiary_id, cycle_id)
    }

    fn transactions_in_cycle(
        &self,
        cycle_id: CycleId,
    ) -> BoxFuture<'_, StoreResult<Vec<Transaction>>> {
        self.0.transactions_in_cycle(cycle_id)
    }

    fn list_transactions(
        &self,
        filter: TransactionFilter,
    ) -> BoxFuture<'_, StoreResult<Vec<Transaction>>> {
        self.0.list_transactions(filter)
    }
}

// -- Baseline and short-circuits ----------------------------------------------

#[tokio::test]
async fn test_first_accepted_attempt_succeeds_without_alerts() {
    let h = harness().await;
    let result = h
        .engine
        .verify(h.request(&h.shop_a, matching_face()))
        .await
        .unwrap();
    assert!(result.accepted);
    assert_eq!(result.transaction_status, TransactionStatus::Success);
    assert!(result.alerts.is_empty());
    assert_eq!(result.confidence.map(|c| c.value()), Some(100.0));
    assert_eq!(result.message, "Verification successful");
    assert_eq!(result.rejection_reason, None);
}

#[tokio::test]
async fn test_unknown_card_is_recorded_and_short_circuits() {
    let h = harness().await;
    let result = h
        .engine
        .verify(h.request_for("RC-9999", &h.shop_a, matching_face()))
        .await
        .unwrap();
    assert!(!result.accepted);
    assert_eq!(result.transaction_status, TransactionStatus::Failed);
    assert_eq!(result.rejection_reason, Some(RejectionReason::CardNotRegistered));
    assert_eq!(result.message, "Card number not found in system");
    assert_eq!(result.beneficiary_id, None);

    let ledger = h.ledger().await;
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].beneficiary_id, None);
    assert!(h.engine.list_alerts(None, None, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_no_active_cycle_fails_before_any_write() {
    let h = harness().await;
    h.engine
        .close_cycle(h.cycle.id, CycleStatus::Completed)
        .await
        .unwrap();
    let err = h
        .engine
        .verify(h.request(&h.shop_a, matching_face()))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Configuration(_)));
    assert!(h.ledger().await.is_empty());
}

#[tokio::test]
async fn test_unknown_shop_is_a_validation_error() {
    let h = harness().await;
    let ghost = RationShop::new(ShopCode::new("GHOST").unwrap(), "Ghost", None, None, start())
        .unwrap();
    let err = h
        .engine
        .verify(h.request(&ghost, matching_face()))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
    assert!(h.ledger().await.is_empty());
}

#[tokio::test]
async fn test_inactive_beneficiary_is_rejected_without_comparison() {
    let h = harness_with(DetectionConfig::default(), Arc::new(DownComparator), |s, _| s).await;
    h.engine
        .set_beneficiary_status(&card(), BeneficiaryStatus::Suspended, staff("officer"), None)
        .await
        .unwrap();
    let result = h
        .engine
        .verify(h.request(&h.shop_a, matching_face()))
        .await
        .unwrap();
    assert_eq!(result.rejection_reason, Some(RejectionReason::BeneficiaryInactive));
    assert_eq!(result.message, "Beneficiary account is suspended");
    assert!(result.alerts.is_empty());
    assert!(result.beneficiary_id.is_some());
}

// -- Face comparator outcomes -------------------------------------------------

#[tokio::test]
async fn test_comparator_outage_is_not_a_face_mismatch() {
    let h = harness_with(DetectionConfig::default(), Arc::new(DownComparator), |s, _| s).await;
    let result = h
        .engine
        .verify(h.request(&h.shop_a, matching_face()))
        .await
        .unwrap();
    assert_eq!(result.transaction_status, TransactionStatus::Failed);
    assert_eq!(
        result.rejection_reason,
        Some(RejectionReason::FaceServiceUnavailable)
    );
    assert_eq!(result.confidence, None);
    assert!(result.alerts.is_empty());
    assert!(h.engine.list_alerts(None, None, None).await.unwrap().is_empty());
    assert_eq!(h.ledger().await.len(), 1);
}

#[tokio::test]
async fn test_embedding_dimension_mismatch_is_not_a_face_mismatch() {
    let h = harness().await;
    let result = h
        .engine
        .verify(h.request(&h.shop_a, face(&[1.0, 0.0, 0.0])))
        .await
        .unwrap();
    assert_eq!(result.transaction_status, TransactionStatus::Failed);
    assert_eq!(
        result.rejection_reason,
        Some(RejectionReason::FaceServiceUnavailable)
    );
    assert_eq!(result.confidence, None);
    assert!(result.alerts.is_empty());
    assert!(h.engine.list_alerts(None, None, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_no_face_in_sample_fails_without_alert() {
    let h = harness().await;
    let blank = FaceSample::new(vec![0xFF, 0xD8, 0xFF]).unwrap();
    let result = h.engine.verify(h.request(&h.shop_a, blank)).await.unwrap();
    assert_eq!(result.rejection_reason, Some(RejectionReason::NoFaceDetected));
    assert_eq!(result.message, "No face detected in captured sample");
    assert!(result.alerts.is_empty());
}

// -- Rule 1: different_person -------------------------------------------------

#[tokio::test]
async fn test_low_confidence_on_known_card_fails_with_critical_alert() {
    let h = harness().await;
    let result = h
        .engine
        .verify(h.request(&h.shop_a, other_face()))
        .await
        .unwrap();
    assert!(!result.accepted);
    assert_eq!(result.transaction_status, TransactionStatus::Failed);
    assert_eq!(result.rejection_reason, Some(RejectionReason::FaceRejected));
    assert!(result.confidence.unwrap().value() < 60.0);
    assert!(result.message.starts_with("Face verification failed. Confidence: "));
    assert_eq!(result.alerts.len(), 1);
    assert_eq!(result.alerts[0].alert_type, AlertType::DifferentPerson);
    assert_eq!(result.alerts[0].severity, Severity::Critical);
    assert_eq!(result.alerts[0].previous_transaction_id, None);
    assert!(result.alerts[0].alert_id.is_some());
}

#[tokio::test]
async fn test_rule_one_takes_precedence_over_history() {
    let h = harness().await;
    h.engine
        .verify(h.request(&h.shop_a, matching_face()))
        .await
        .unwrap();
    h.clock.advance(Duration::hours(1));
    let result = h
        .engine
        .verify(h.request(&h.shop_b, other_face()))
        .await
        .unwrap();
    assert_eq!(result.transaction_status, TransactionStatus::Failed);
    let types: Vec<AlertType> = result.alerts.iter().map(|a| a.alert_type).collect();
    assert_eq!(types, vec![AlertType::DifferentPerson]);
}

// -- Rule 2: duplicate_location -----------------------------------------------

#[tokio::test]
async fn test_collection_at_second_shop_is_flagged_duplicate_location() {
    let h = harness().await;
    let first = h
        .engine
        .verify(h.request(&h.shop_a, matching_face()))
        .await
        .unwrap();
    h.clock.advance(Duration::hours(30));
    let second = h
        .engine
        .verify(h.request(&h.shop_b, matching_face()))
        .await
        .unwrap();

    assert!(second.accepted);
    assert_eq!(second.transaction_status, TransactionStatus::Flagged);
    assert_eq!(second.message, "Verification completed with alerts");
    let location = second
        .alerts
        .iter()
        .find(|a| a.alert_type == AlertType::DuplicateLocation)
        .unwrap();
    assert_eq!(location.severity, Severity::High);
    assert_eq!(location.previous_transaction_id, Some(first.transaction_id));

    let detail = h
        .engine
        .transaction_detail(second.transaction_id)
        .await
        .unwrap();
    assert_eq!(detail.transaction.status, TransactionStatus::Flagged);
    assert_eq!(detail.alerts.len(), second.alerts.len());
}

// -- Rule 3: multiple_attempts ------------------------------------------------

#[tokio::test]
async fn test_second_collection_at_same_shop_is_multiple_attempts() {
    let h = harness().await;
    let first = h
        .engine
        .verify(h.request(&h.shop_a, matching_face()))
        .await
        .unwrap();
    assert!(first.alerts.is_empty());

    h.clock.advance(Duration::hours(30));
    let second = h
        .engine
        .verify(h.request(&h.shop_a, matching_face()))
        .await
        .unwrap();
    assert_eq!(second.transaction_status, TransactionStatus::Flagged);
    let types: Vec<AlertType> = second.alerts.iter().map(|a| a.alert_type).collect();
    assert_eq!(types, vec![AlertType::MultipleAttempts]);
    assert_eq!(
        second.alerts[0].previous_transaction_id,
        Some(first.transaction_id)
    );
}

#[tokio::test]
async fn test_multiple_attempts_respects_configured_limit() {
    let config = DetectionConfig {
        max_transactions_per_cycle: 2,
        ..DetectionConfig::default()
    };
    let h = harness_with(config, Arc::new(VectorComparator), |s, _| s).await;
    for expected_flag in [false, false, true] {
        let r = h
            .engine
            .verify(h.request(&h.shop_a, matching_face()))
            .await
            .unwrap();
        let flagged = r
            .alerts
            .iter()
            .any(|a| a.alert_type == AlertType::MultipleAttempts);
        assert_eq!(flagged, expected_flag);
        h.clock.advance(Duration::hours(48));
    }
}

#[tokio::test]
async fn test_flagged_collections_are_not_counted_as_prior_successes() {
    let config = DetectionConfig {
        max_transactions_per_cycle: 2,
        ..DetectionConfig::default()
    };
    let h = harness_with(config, Arc::new(VectorComparator), |s, _| s).await;
    let first = h
        .engine
        .verify(h.request(&h.shop_a, matching_face()))
        .await
        .unwrap();
    assert_eq!(first.transaction_status, TransactionStatus::Success);

    h.clock.advance(Duration::hours(1));
    let second = h
        .engine
        .verify(h.request(&h.shop_b, matching_face()))
        .await
        .unwrap();
    assert_eq!(second.transaction_status, TransactionStatus::Flagged);

    // Only the first collection is a prior success; it was at this shop.
    h.clock.advance(Duration::hours(48));
    let third = h
        .engine
        .verify(h.request(&h.shop_a, matching_face()))
        .await
        .unwrap();
    assert_eq!(third.transaction_status, TransactionStatus::Success);
    assert!(third.alerts.is_empty());
}

// -- Rule 4: suspicious_timing ------------------------------------------------

#[tokio::test]
async fn test_attempts_two_hours_apart_raise_suspicious_timing() {
    let h = harness().await;
    let first = h
        .engine
        .verify(h.request(&h.shop_a, matching_face()))
        .await
        .unwrap();
    h.clock.advance(Duration::hours(2));
    let second = h
        .engine
        .verify(h.request(&h.shop_a, matching_face()))
        .await
        .unwrap();
    let timing = second
        .alerts
        .iter()
        .find(|a| a.alert_type == AlertType::SuspiciousTiming)
        .unwrap();
    assert_eq!(timing.severity, Severity::Medium);
    assert_eq!(timing.previous_transaction_id, Some(first.transaction_id));
}

#[tokio::test]
async fn test_attempts_thirty_hours_apart_do_not_raise_suspicious_timing() {
    let h = harness().await;
    h.engine
        .verify(h.request(&h.shop_a, matching_face()))
        .await
        .unwrap();
    h.clock.advance(Duration::hours(30));
    let second = h
        .engine
        .verify(h.request(&h.shop_a, matching_face()))
        .await
        .unwrap();
    assert!(second
        .alerts
        .iter()
        .all(|a| a.alert_type != AlertType::SuspiciousTiming));
}

#[tokio::test]
async fn test_failed_attempt_counts_for_timing_but_not_collections() {
    let h = harness().await;
    let failed = h
        .engine
        .verify(h.request(&h.shop_b, other_face()))
        .await
        .unwrap();
    h.clock.advance(Duration::hours(1));
    let second = h
        .engine
        .verify(h.request(&h.shop_a, matching_face()))
        .await
        .unwrap();
    let types: Vec<AlertType> = second.alerts.iter().map(|a| a.alert_type).collect();
    assert_eq!(types, vec![AlertType::SuspiciousTiming]);
    assert_eq!(
        second.alerts[0].previous_transaction_id,
        Some(failed.transaction_id)
    );
}

#[tokio::test]
async fn test_cross_shop_rapid_repeat_raises_all_duplicate_signals_in_order() {
    let h = harness().await;
    h.engine
        .verify(h.request(&h.shop_a, matching_face()))
        .await
        .unwrap();
    h.clock.advance(Duration::minutes(20));
    let second = h
        .engine
        .verify(h.request(&h.shop_b, matching_face()))
        .await
        .unwrap();
    let types: Vec<AlertType> = second.alerts.iter().map(|a| a.alert_type).collect();
    assert_eq!(
        types,
        vec![
            AlertType::DuplicateLocation,
            AlertType::MultipleAttempts,
            AlertType::SuspiciousTiming
        ]
    );
}

// -- Audit completeness -------------------------------------------------------

#[tokio::test]
async fn test_every_attempt_writes_exactly_one_transaction() {
    let h = harness().await;
    let attempts = [
        h.request(&h.shop_a, matching_face()),
        h.request(&h.shop_a, other_face()),
        h.request_for("RC-0404", &h.shop_b, matching_face()),
        h.request(&h.shop_b, FaceSample::new(b"not a face".to_vec()).unwrap()),
        h.request(&h.shop_b, matching_face()),
    ];
    let mut ids = Vec::new();
    for request in attempts {
        ids.push(h.engine.verify(request).await.unwrap().transaction_id);
        h.clock.advance(Duration::minutes(5));
    }
    let ledger = h.ledger().await;
    assert_eq!(ledger.len(), 5);
    for id in ids {
        assert!(ledger.iter().any(|t| t.id == id));
    }
    let counts = h.engine.dashboard().await.unwrap();
    assert_eq!(counts.total_transactions, 5);
    assert_eq!(counts.successful_transactions, 1);
    assert_eq!(counts.flagged_transactions, 1);
    assert_eq!(counts.failed_transactions, 3);
}

// -- Completion inconsistency -------------------------------------------------

#[tokio::test]
async fn test_alert_write_failure_is_reported_with_the_result() {
    let h = harness_with(
        DetectionConfig::default(),
        Arc::new(VectorComparator),
        |mut stores, store| {
            stores.alerts = Arc::new(FailingAlertInserts(store));
            stores
        },
    )
    .await;
    h.engine
        .verify(h.request(&h.shop_a, matching_face()))
        .await
        .unwrap();
    h.clock.advance(Duration::hours(1));
    let err = h
        .engine
        .verify(h.request(&h.shop_b, matching_face()))
        .await
        .unwrap_err();
    let EngineError::CompletionInconsistency(inconsistency) = err else {
        panic!("expected completion inconsistency, got {err:?}");
    };
    assert_eq!(inconsistency.failed_alert_types.len(), 3);
    assert!(!inconsistency.escalation_failed);
    assert!(!inconsistency.evaluation_failed);
    assert_eq!(
        inconsistency.result.transaction_status,
        TransactionStatus::Flagged
    );
    assert!(inconsistency.result.alerts.iter().all(|a| a.alert_id.is_none()));

    // The transaction stays as the authoritative record.
    let stored = h
        .store
        .transaction(inconsistency.transaction_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, TransactionStatus::Flagged);
}

#[tokio::test]
async fn test_history_read_failure_after_write_is_reported_with_the_transaction() {
    let h = harness_with(
        DetectionConfig::default(),
        Arc::new(VectorComparator),
        |mut stores, store| {
            stores.ledger = Arc::new(FailingHistoryReads(store));
            stores
        },
    )
    .await;
    let err = h
        .engine
        .verify(h.request(&h.shop_a, matching_face()))
        .await
        .unwrap_err();
    let EngineError::CompletionInconsistency(inconsistency) = err else {
        panic!("expected completion inconsistency, got {err:?}");
    };
    assert!(inconsistency.evaluation_failed);
    assert!(!inconsistency.escalation_failed);
    assert!(inconsistency.failed_alert_types.is_empty());
    assert!(inconsistency.result.alerts.is_empty());
    assert_eq!(inconsistency.result.transaction_id, inconsistency.transaction_id);
    assert!(inconsistency.to_string().contains("duplicate rules not evaluated"));

    let stored = h
        .store
        .transaction(inconsistency.transaction_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, TransactionStatus::Success);
    assert_eq!(inconsistency.result.transaction_status, TransactionStatus::Success);
}

// -- Alert review -------------------------------------------------------------

#[tokio::test]
async fn test_alert_review_is_one_shot() {
    let h = harness().await;
    let result = h
        .engine
        .verify(h.request(&h.shop_a, other_face()))
        .await
        .unwrap();
    let alert_id = result.alerts[0].alert_id.unwrap();

    let err = h
        .engine
        .review_alert(alert_id, AlertStatus::Reviewed, staff("auditor"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
    let err = h
        .engine
        .review_alert(alert_id, AlertStatus::Pending, staff("auditor"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
    let untouched = h.engine.alert(alert_id).await.unwrap();
    assert_eq!(untouched.status, AlertStatus::Pending);

    h.clock.advance(Duration::minutes(10));
    let reviewed = h
        .engine
        .review_alert(alert_id, AlertStatus::Resolved, staff("auditor"))
        .await
        .unwrap();
    assert_eq!(reviewed.status, AlertStatus::Resolved);
    assert_eq!(reviewed.reviewed_by, Some(staff("auditor")));
    assert_eq!(reviewed.reviewed_at, Some(start() + Duration::minutes(10)));

    let again = h
        .engine
        .review_alert(alert_id, AlertStatus::Dismissed, staff("auditor"))
        .await
        .unwrap_err();
    assert!(matches!(again, EngineError::InvalidTransition(_)));

    let missing = h
        .engine
        .review_alert(ration_core::AlertId::new(), AlertStatus::Dismissed, staff("auditor"))
        .await
        .unwrap_err();
    assert!(matches!(missing, EngineError::NotFound { kind: "alert", .. }));

    let pending = h
        .engine
        .list_alerts(Some(AlertStatus::Pending), None, None)
        .await
        .unwrap();
    assert!(pending.is_empty());
}

// -- Identity Registry --------------------------------------------------------

#[tokio::test]
async fn test_card_number_is_unique_across_statuses() {
    let h = harness().await;
    h.engine
        .set_beneficiary_status(&card(), BeneficiaryStatus::Blocked, staff("officer"), None)
        .await
        .unwrap();
    let err = h
        .engine
        .register_beneficiary(
            CardNumber::new("rc-1001").unwrap(),
            IdentityFields::new("Someone Else", None, None).unwrap(),
            &matching_face(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::DuplicateCard(_)));
}

#[tokio::test]
async fn test_registration_stores_normalized_identity() {
    let h = harness().await;
    let identity =
        IdentityFields::new("  Ravi Kumar ", Some(" ".into()), Some(" Ward 9 ".into())).unwrap();
    let registered = h
        .engine
        .register_with_embedding(
            CardNumber::new("RC-3003").unwrap(),
            identity,
            FaceEmbedding::new(vec![0.0, 1.0]).unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(registered.name, "Ravi Kumar");
    assert_eq!(registered.phone, None);
    assert_eq!(registered.address.as_deref(), Some("Ward 9"));
    assert!(IdentityFields::new(" ", None, None).is_err());
}

#[tokio::test]
async fn test_concurrent_registrations_yield_one_record() {
    let h = harness().await;
    let new_card = || CardNumber::new("RC-2002").unwrap();
    let identity = || IdentityFields::new("Ravi", None, None).unwrap();
    let embedding = || FaceEmbedding::new(vec![0.0, 1.0]).unwrap();
    let (a, b) = tokio::join!(
        h.engine.register_with_embedding(new_card(), identity(), embedding()),
        h.engine.register_with_embedding(new_card(), identity(), embedding()),
    );
    assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
    let listed = h.engine.list_beneficiaries(None, None).await.unwrap();
    assert_eq!(listed.len(), 2);
}

#[tokio::test]
async fn test_registration_requires_a_detectable_face() {
    let h = harness().await;
    let err = h
        .engine
        .register_beneficiary(
            CardNumber::new("RC-3003").unwrap(),
            IdentityFields::new("Meena", None, None).unwrap(),
            &FaceSample::new(b"[0, 0]".to_vec()).unwrap(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(ref m) if m == "No face detected in image"));
}

#[tokio::test]
async fn test_status_changes_are_logged_and_same_status_is_a_no_op() {
    let h = harness().await;
    h.engine
        .set_beneficiary_status(&card(), BeneficiaryStatus::Active, staff("officer"), None)
        .await
        .unwrap();
    assert!(h.engine.status_history(&card()).await.unwrap().is_empty());

    h.engine
        .set_beneficiary_status(
            &card(),
            BeneficiaryStatus::Suspended,
            staff("officer"),
            Some("card under investigation".into()),
        )
        .await
        .unwrap();
    h.engine
        .set_beneficiary_status(&card(), BeneficiaryStatus::Active, staff("officer"), None)
        .await
        .unwrap();

    let history = h.engine.status_history(&card()).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].to_status, BeneficiaryStatus::Suspended);
    assert_eq!(history[0].reason.as_deref(), Some("card under investigation"));
    assert_eq!(history[1].from_status, BeneficiaryStatus::Suspended);
}

#[tokio::test]
async fn test_replacing_reference_face_changes_future_matches() {
    let h = harness().await;
    h.engine
        .replace_reference_face(&card(), &face(&[0.0, 1.0]))
        .await
        .unwrap();
    let result = h
        .engine
        .verify(h.request(&h.shop_a, matching_face()))
        .await
        .unwrap();
    assert_eq!(result.rejection_reason, Some(RejectionReason::FaceRejected));
}

// -- Administration -----------------------------------------------------------

#[tokio::test]
async fn test_shop_codes_and_active_cycle_are_unique() {
    let h = harness().await;
    let dup = h
        .engine
        .create_shop(ShopCode::new("fps-001").unwrap(), "Copy".into(), None, None)
        .await
        .unwrap_err();
    assert!(matches!(dup, EngineError::Conflict(_)));

    let window = CycleWindow::new(
        NaiveDate::from_ymd_opt(2026, 4, 1).unwrap(),
        NaiveDate::from_ymd_opt(2026, 4, 30).unwrap(),
    )
    .unwrap();
    let second = h
        .engine
        .open_cycle("April 2026".into(), window)
        .await
        .unwrap_err();
    assert!(matches!(second, EngineError::Conflict(_)));

    let reopen = h
        .engine
        .close_cycle(h.cycle.id, CycleStatus::Active)
        .await
        .unwrap_err();
    assert!(matches!(reopen, EngineError::Validation(_)));

    h.engine
        .close_cycle(h.cycle.id, CycleStatus::Completed)
        .await
        .unwrap();
    let twice = h
        .engine
        .close_cycle(h.cycle.id, CycleStatus::Cancelled)
        .await
        .unwrap_err();
    assert!(matches!(twice, EngineError::InvalidTransition(_)));
    h.engine.open_cycle("April 2026".into(), window).await.unwrap();
}

// -- Reconciliation -----------------------------------------------------------

#[tokio::test]
async fn test_reconciliation_is_clean_after_normal_flow() {
    let h = harness().await;
    h.engine
        .verify(h.request(&h.shop_a, matching_face()))
        .await
        .unwrap();
    h.clock.advance(Duration::hours(2));
    h.engine
        .verify(h.request(&h.shop_b, matching_face()))
        .await
        .unwrap();
    let report = h.engine.reconcile(None).await.unwrap();
    assert_eq!(report.transactions_scanned, 2);
    assert!(report.is_clean());
}

#[tokio::test]
async fn test_reconciliation_finds_concurrent_collection_missed_by_both_passes() {
    let h = harness().await;
    let first = h
        .engine
        .verify(h.request(&h.shop_a, matching_face()))
        .await
        .unwrap();

    // A second shop's attempt that read history before the first write
    // landed: recorded as a clean success with no alerts.
    let beneficiary = h.engine.beneficiary(&card()).await.unwrap();
    let raced = Transaction {
        id: TransactionId::new(),
        beneficiary_id: Some(beneficiary.id),
        card_number: card(),
        shop_id: h.shop_b.id,
        cycle_id: h.cycle.id,
        operator_id: staff("operator-9"),
        face_match_confidence: Some(Confidence::new(97.0).unwrap()),
        status: TransactionStatus::Success,
        rejection_reason: None,
        items_collected: vec![],
        created_at: start(),
    };
    h.store.append_transaction(&raced).await.unwrap();

    let report = h.engine.reconcile(Some(h.cycle.id)).await.unwrap();
    let types: Vec<AlertType> = report.findings.iter().map(|f| f.alert_type).collect();
    assert_eq!(
        types,
        vec![
            AlertType::DuplicateLocation,
            AlertType::MultipleAttempts,
            AlertType::SuspiciousTiming
        ]
    );
    assert!(report.findings.iter().all(|f| f.transaction_id == raced.id));
    assert!(report
        .findings
        .iter()
        .all(|f| f.previous_transaction_id == Some(first.transaction_id)));

    // Read-only: nothing was written.
    assert!(h.engine.list_alerts(None, None, None).await.unwrap().is_empty());
    let stored = h.store.transaction(raced.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Success);
}
