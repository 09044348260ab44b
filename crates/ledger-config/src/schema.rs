//! On-disk configuration schema.
//!
//! Every key is optional. A missing key keeps the per-variant default from
//! `LedgerSettings::action()` / `LedgerSettings::entity()`, so an empty
//! document is a valid configuration.
//!
//! Example:
//! ```toml
//! [action]
//! table_name = "audit_event"
//! hashing_algorithm = "SHA-256"
//!
//! [entity]
//! enabled = true
//! service_name = "billing"
//! source_schema = "public"
//! ```

use serde::{Deserialize, Serialize};

use ledger_contracts::settings::{AuditSettings, LedgerSettings};

/// The `[action]` or `[entity]` table as written in the file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SectionConfig {
    pub enabled: Option<bool>,
    pub table_name: Option<String>,
    pub hashing_algorithm: Option<String>,
    pub initial_hash_value: Option<String>,
    pub service_name: Option<String>,
    pub source_schema: Option<String>,
    pub source_table: Option<String>,
}

/// The whole configuration document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub action: SectionConfig,
    #[serde(default)]
    pub entity: SectionConfig,
}

impl SectionConfig {
    /// Overlay the keys present in this section onto `base`.
    pub fn apply_to(&self, mut base: LedgerSettings) -> LedgerSettings {
        if let Some(enabled) = self.enabled {
            base.enabled = enabled;
        }
        if let Some(table_name) = &self.table_name {
            base.table_name = table_name.clone();
        }
        if let Some(algorithm) = &self.hashing_algorithm {
            base.hashing_algorithm = algorithm.clone();
        }
        if let Some(initial) = &self.initial_hash_value {
            base.initial_hash_value = initial.clone();
        }
        if self.service_name.is_some() {
            base.service_name = self.service_name.clone();
        }
        if self.source_schema.is_some() {
            base.source_schema = self.source_schema.clone();
        }
        if self.source_table.is_some() {
            base.source_table = self.source_table.clone();
        }
        base
    }
}

impl ConfigFile {
    pub fn into_settings(self) -> AuditSettings {
        AuditSettings {
            action: self.action.apply_to(LedgerSettings::action()),
            entity: self.entity.apply_to(LedgerSettings::entity()),
        }
    }
}
