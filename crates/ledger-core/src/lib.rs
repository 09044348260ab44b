//! # ledger-core
//!
//! The write path of the hash-chained audit ledger.
//!
//! This crate provides:
//! - The trait seams (`HashEngine`, `ActionStore`, `ChangeLookup`,
//!   `ChangeStore`, `Clock`)
//! - `RecordNumberAllocator`, which binds each entity to one chain
//! - `ActionTrail` and `ChangeTrail`, the only public write entry points
//!
//! Stores serialize each head-read + insert through `append`; the trails
//! hold no locks of their own.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ledger_core::{ActionTrail, clock::SystemClock};
//!
//! let trail = ActionTrail::new(store, engine, Arc::new(SystemClock));
//! let receipt = trail.record_event(request)?;
//! ```

pub mod action_trail;
pub mod allocator;
pub mod change_trail;
pub mod clock;
pub mod traits;

pub use action_trail::ActionTrail;
pub use allocator::RecordNumberAllocator;
pub use change_trail::ChangeTrail;
