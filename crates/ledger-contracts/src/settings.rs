//! Ledger settings consumed by the hash engine, stores, and adapters.
//!
//! Settings are plain data. `ledger-config` merges a TOML document onto the
//! per-variant defaults here and runs startup validation; the hash engine
//! re-checks the values it depends on at call time.

use serde::{Deserialize, Serialize};

/// Digest name used when none is configured.
pub const DEFAULT_HASHING_ALGORITHM: &str = "SHA-256";

/// Genesis `prev_hash`: 64 hex zeros, the width of a SHA-256 digest.
pub const DEFAULT_INITIAL_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

pub const DEFAULT_ACTION_TABLE: &str = "audit_event";
pub const DEFAULT_ENTITY_TABLE: &str = "entity_audit_event";

/// Settings for one ledger variant (one table, one family of chains).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSettings {
    /// Capture adapters skip recording entirely when false.
    pub enabled: bool,
    pub table_name: String,
    pub hashing_algorithm: String,
    pub initial_hash_value: String,
    /// Identifies the writing service in persisted rows.
    pub service_name: Option<String>,
    pub source_schema: Option<String>,
    pub source_table: Option<String>,
}

impl LedgerSettings {
    /// Defaults for the global action ledger.
    pub fn action() -> Self {
        Self::with_table(DEFAULT_ACTION_TABLE)
    }

    /// Defaults for the per-record entity ledger.
    pub fn entity() -> Self {
        Self::with_table(DEFAULT_ENTITY_TABLE)
    }

    fn with_table(table_name: &str) -> Self {
        Self {
            enabled: true,
            table_name: table_name.to_string(),
            hashing_algorithm: DEFAULT_HASHING_ALGORITHM.to_string(),
            initial_hash_value: DEFAULT_INITIAL_HASH.to_string(),
            service_name: None,
            source_schema: None,
            source_table: None,
        }
    }
}

/// Settings for both ledger variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditSettings {
    pub action: LedgerSettings,
    pub entity: LedgerSettings,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            action: LedgerSettings::action(),
            entity: LedgerSettings::entity(),
        }
    }
}
