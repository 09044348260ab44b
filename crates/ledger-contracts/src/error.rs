//! Error types for the audit ledger.
//!
//! Every fallible ledger operation returns `LedgerResult<T>`. Variants follow
//! the ledger's failure taxonomy: a rejected request, a fatal configuration
//! problem, or an infrastructure failure on the hash/write path.

use thiserror::Error;

/// Boxed cause carried by persistence failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The unified error type for the audit ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The request is missing a required field or cannot be resolved.
    ///
    /// Raised before any hash or store work happens.
    #[error("invalid audit request: {reason}")]
    Validation { reason: String },

    /// A configuration value is missing or unsupported.
    ///
    /// Not recoverable at runtime.
    #[error("configuration error: {reason}")]
    Config { reason: String },

    /// The ledger store could not read or write an entry.
    ///
    /// The chain is guaranteed to have no new entry when this is returned.
    #[error("ledger persistence failure: {reason}")]
    Persistence {
        reason: String,
        #[source]
        source: Option<BoxError>,
    },

    /// An event payload could not be canonically encoded.
    #[error("failed to serialize audit payload: {reason}")]
    Serialization { reason: String },
}

impl LedgerError {
    /// Shorthand for a validation failure.
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation { reason: reason.into() }
    }

    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config { reason: reason.into() }
    }

    /// A persistence failure with no underlying cause, e.g. a missing
    /// generated key after an otherwise successful insert.
    pub fn persistence(reason: impl Into<String>) -> Self {
        Self::Persistence {
            reason: reason.into(),
            source: None,
        }
    }

    /// A persistence failure wrapping the store's own error.
    pub fn persistence_caused_by<E>(reason: impl Into<String>, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Persistence {
            reason: reason.into(),
            source: Some(Box::new(cause)),
        }
    }

    /// True for errors raised on the hash/write path.
    ///
    /// Serialization failures happen while building the hash input, so
    /// callers handle them the same way as store failures.
    pub fn is_persistence_class(&self) -> bool {
        matches!(self, Self::Persistence { .. } | Self::Serialization { .. })
    }
}

/// Convenience alias used throughout the ledger crates.
pub type LedgerResult<T> = Result<T, LedgerError>;
