//! # ledger-config
//!
//! TOML configuration for the audit ledger.
//!
//! ## Overview
//!
//! [`LedgerConfig`] loads an `[action]` and an `[entity]` table from a TOML
//! document, fills missing keys with the defaults (`audit_event` /
//! `entity_audit_event`, `SHA-256`, 64 zero genesis hash) and validates the
//! result before anything is wired up.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::path::Path;
//! use ledger_config::LedgerConfig;
//!
//! let config = LedgerConfig::from_file(Path::new("ledger.toml"))?;
//! let settings = config.into_settings();
//! ```

pub mod loader;
pub mod schema;

pub use loader::{is_sql_identifier, LedgerConfig};
pub use schema::{ConfigFile, SectionConfig};

// ── Tests ─────────────────────────────────────────────────────────────────────
