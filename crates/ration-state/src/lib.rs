//! # ration-state — Record Lifecycles
//!
//! Every mutable field in the verification data model moves through one of
//! the machines in this crate. Each machine is a pure function from the
//! current status and a requested change to either the new status (plus an
//! audit record where one is kept) or a [`TransitionError`].
//!
//! ## Machines
//!
//! - **Alert review** ([`alert`]): `pending → resolved | dismissed`. Both
//!   targets are terminal; `reviewed` is never a review target.
//!
//! - **Beneficiary status** ([`beneficiary`]): any status to any other,
//!   each change captured as a [`StatusChange`].
//!
//! - **Distribution cycle** ([`cycle`]): opened `active`, closed once as
//!   `completed` or `cancelled`.
//!
//! - **Ledger escalation** ([`ledger`]): the single permitted rewrite of a
//!   written transaction, `success → flagged`.
//!
//! The datastore enforces the same rules with conditional writes; these
//! functions decide, the datastore guards against races.

pub mod alert;
pub mod beneficiary;
pub mod cycle;
pub mod error;
pub mod ledger;

pub use alert::{review_target, AlertReview};
pub use beneficiary::StatusChange;
pub use cycle::{close_target, CycleWindow};
pub use error::TransitionError;
pub use ledger::escalate;
