//! # ledger-capture
//!
//! Capture-side helpers for the audit ledger.
//!
//! Applications rarely build ledger requests by hand. This crate turns the
//! things they do have into requests:
//!
//! - [`RequestContext`]: actor, trace id and HTTP correlation fields of the
//!   current call, with `SYSTEM` / fresh-UUID defaults.
//! - [`ActionAuditHelper`]: records free-form action events, digesting a
//!   `details.result` entry into `responseHash`.
//! - [`CallAudit`]: wraps a fallible call and records its outcome.
//! - [`EntityAuditHelper`] and [`AuditableEntity`]: record create / update /
//!   delete of domain values on per-record chains, diffing updates.
//!
//! Both helpers honour the `enabled` setting of their ledger variant.

pub mod action;
pub mod call;
pub mod context;
pub mod entity;

pub use action::{response_hash, ActionAuditHelper, ActionEvent};
pub use call::CallAudit;
pub use context::{RequestContext, SYSTEM_ACTOR};
pub use entity::{diff_states, AuditableEntity, EntityAuditHelper, ValueChange};
