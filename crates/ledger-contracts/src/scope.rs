//! Chain scopes.
//!
//! Action events share one chain per deployment; entity changes get one chain
//! per record number. The scope is the key for latest-hash lookups and for
//! the write lock that keeps each chain linear.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainScope {
    /// The single action-audit chain.
    Global,
    /// The entity chain identified by a record number.
    Record(String),
}

impl ChainScope {
    pub fn record(record_number: impl Into<String>) -> Self {
        Self::Record(record_number.into())
    }

    /// The record number for a per-record scope.
    pub fn record_number(&self) -> Option<&str> {
        match self {
            Self::Global => None,
            Self::Record(number) => Some(number),
        }
    }
}

impl fmt::Display for ChainScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("global"),
            Self::Record(number) => write!(f, "record:{number}"),
        }
    }
}
