//! # ration-engine — Verification & Duplicate-Detection Engine
//!
//! Decides, for one shop counter attempt, whether rations may be handed
//! over and which fraud signals to raise.
//!
//! ## Components (leaves first)
//!
//! | Component | Module | Role |
//! |-----------|--------|------|
//! | Identity Registry | [`registry`] | one record per card, reference face embedding |
//! | Face Comparator | [`comparator`], [`face_service`] | external similarity scoring |
//! | Transaction Ledger | [`ledger`] | append-only attempt log |
//! | Duplicate Rule Evaluator | [`rules`] | pure rule table over ledger history |
//! | Verification Orchestrator | [`orchestrator`] | staged request flow |
//!
//! Around the core: [`admin`] (shops and cycles), [`query`] (read-side
//! projections), [`reconcile`] (post-hoc conflict scan), and [`store`]
//! (datastore ports plus [`store::memory::MemoryStore`]).
//!
//! ## Concurrency
//!
//! No in-process mutable state is shared between requests beyond the
//! read-only [`ration_core::DetectionConfig`]. Uniqueness and
//! compare-and-set guarantees come from the datastore behind the
//! [`store`] ports.

pub mod admin;
pub mod clock;
pub mod comparator;
pub mod error;
pub mod face_service;
pub mod ledger;
pub mod model;
pub mod orchestrator;
pub mod query;
pub mod reconcile;
pub mod registry;
pub mod rules;
pub mod store;

use std::future::Future;
use std::pin::Pin;

/// Boxed, sendable future returned by the object-safe ports.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub use clock::{Clock, ManualClock, SystemClock};
pub use comparator::{cosine_confidence, ComparatorError, FaceComparator, VectorComparator};
pub use error::{CompletionInconsistency, EngineError};
pub use face_service::{FaceServiceConfig, HttpFaceService};
pub use model::{
    AlertSummary, Beneficiary, DashboardCounts, DistributionCycle, DuplicateAlert, IdentityFields,
    RationShop, Transaction, VerificationRequest, VerificationResult,
};
pub use orchestrator::{VerificationEngine, VerificationStage};
pub use store::{memory::MemoryStore, Stores};
