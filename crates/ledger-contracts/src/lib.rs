//! # ledger-contracts
//!
//! Shared types, settings, and error contracts for the hash-chained audit
//! ledger.
//!
//! All crates in the workspace import from here. No business logic lives in
//! this crate — only data definitions and error types.

pub mod entry;
pub mod error;
pub mod request;
pub mod scope;
pub mod settings;
