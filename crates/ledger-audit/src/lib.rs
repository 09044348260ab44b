//! # ledger-audit
//!
//! SHA-2 hash engine and in-memory store for the hash-chained audit ledger.
//!
//! ## Overview
//!
//! `Sha2HashEngine` turns a request and its chain link into a canonical JSON
//! document (fixed key set, sorted keys, explicit nulls) and digests it with
//! the configured SHA-2 variant. Any change to any hashed field, or to the
//! previous entry's hash, changes the result.
//!
//! `InMemoryLedger` stores both ledger variants and is the reference
//! implementation of `ActionStore` and `ChangeStore`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ledger_audit::{InMemoryLedger, Sha2HashEngine};
//! use ledger_contracts::settings::LedgerSettings;
//! use ledger_core::{clock::SystemClock, ActionTrail};
//!
//! let store = Arc::new(InMemoryLedger::new());
//! let engine = Arc::new(Sha2HashEngine::new(&LedgerSettings::action()));
//! let trail = ActionTrail::new(store, engine, Arc::new(SystemClock));
//! let receipt = trail.record_event(request)?;
//! ```

pub mod chain;
pub mod digest;
pub mod memory;

pub use chain::{action_payload, canonical_bytes, change_payload, Sha2HashEngine};
pub use digest::DigestAlgorithm;
pub use memory::InMemoryLedger;

// ── Tests ─────────────────────────────────────────────────────────────────────
