//! Loading and startup validation.
//!
//! `LedgerConfig` reads a TOML document, merges it onto the defaults and
//! checks every value the ledger will depend on later:
//!
//! 1. `hashing_algorithm` names a digest the hash engine supports.
//! 2. `initial_hash_value` is not blank.
//! 3. `table_name` is a plain SQL identifier (it is spliced into statements).
//! 4. The two variants do not share a table.
//!
//! Any failure is a `LedgerError::Config`.

use std::path::Path;

use tracing::{debug, warn};

use ledger_audit::DigestAlgorithm;
use ledger_contracts::{
    error::{LedgerError, LedgerResult},
    settings::{AuditSettings, LedgerSettings},
};

use crate::schema::ConfigFile;

/// Validated settings for both ledger variants.
///
/// ```rust,ignore
/// use ledger_config::LedgerConfig;
///
/// let config = LedgerConfig::from_file(Path::new("ledger.toml"))?;
/// let engine = Sha2HashEngine::new(&config.settings().entity);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerConfig {
    settings: AuditSettings,
}

impl LedgerConfig {
    /// Parse `s` as TOML, merge it onto the defaults and validate.
    pub fn from_toml_str(s: &str) -> LedgerResult<Self> {
        let file: ConfigFile = toml::from_str(s).map_err(|e| LedgerError::Config {
            reason: format!("failed to parse ledger TOML: {}", e),
        })?;
        let config = Self {
            settings: file.into_settings(),
        };
        config.validate()?;
        debug!(
            action_table = %config.settings.action.table_name,
            entity_table = %config.settings.entity.table_name,
            "ledger configuration loaded"
        );
        Ok(config)
    }

    /// Read the file at `path` and load it with `from_toml_str`.
    pub fn from_file(path: &Path) -> LedgerResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| LedgerError::Config {
            reason: format!("failed to read ledger config '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Wrap already-built settings, validating them.
    pub fn from_settings(settings: AuditSettings) -> LedgerResult<Self> {
        let config = Self { settings };
        config.validate()?;
        Ok(config)
    }

    pub fn settings(&self) -> &AuditSettings {
        &self.settings
    }

    pub fn into_settings(self) -> AuditSettings {
        self.settings
    }

    /// Check both variants. Returns the first problem found.
    pub fn validate(&self) -> LedgerResult<()> {
        validate_section("action", &self.settings.action)?;
        validate_section("entity", &self.settings.entity)?;

        if self.settings.action.table_name == self.settings.entity.table_name {
            return Err(LedgerError::config(format!(
                "action and entity ledgers must use different tables, both use '{}'",
                self.settings.action.table_name
            )));
        }
        Ok(())
    }
}

fn validate_section(section: &str, settings: &LedgerSettings) -> LedgerResult<()> {
    if let Err(err) = DigestAlgorithm::from_name(&settings.hashing_algorithm) {
        warn!(section, algorithm = %settings.hashing_algorithm, "unsupported hashing algorithm");
        return Err(err);
    }
    if settings.initial_hash_value.trim().is_empty() {
        return Err(LedgerError::config(format!(
            "[{}] initial_hash_value must not be blank",
            section
        )));
    }
    if !is_sql_identifier(&settings.table_name) {
        return Err(LedgerError::config(format!(
            "[{}] table_name '{}' is not a valid SQL identifier",
            section, settings.table_name
        )));
    }
    Ok(())
}

/// ASCII letter or underscore first, then letters, digits and underscores.
pub fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
