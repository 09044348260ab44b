//! Verification report types.
//!
//! A `ChainReport` covers one chain scope. A `LedgerReport` collects the
//! reports of every chain in one ledger variant. Only a report with no
//! failures counts as intact.

use std::fmt;

use serde::{Deserialize, Serialize};

use ledger_contracts::scope::ChainScope;

/// The kinds of integrity violations the verifier detects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// The first entry does not link to the genesis hash.
    BadGenesis,
    /// An entry's `prev_hash` is not its predecessor's `hash`.
    BrokenLink,
    /// An entry's stored `hash` does not match its recomputed content hash.
    HashMismatch,
    /// Two entries claim the same predecessor.
    Fork,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadGenesis => "bad-genesis",
            Self::BrokenLink => "broken-link",
            Self::HashMismatch => "hash-mismatch",
            Self::Fork => "fork",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single violation within a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainFailure {
    pub kind: FailureKind,
    /// Zero-based position of the offending entry in chain order.
    pub position: usize,
    /// Store id of the offending entry, when it has one.
    pub entry_id: Option<i64>,
    pub message: String,
}

/// The result of verifying one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainReport {
    pub scope: ChainScope,
    pub entries: usize,
    /// Hash of the last entry in chain order. `None` for an empty chain.
    pub head: Option<String>,
    pub failures: Vec<ChainFailure>,
}

impl ChainReport {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// The result of verifying every chain of one ledger variant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerReport {
    pub chains: Vec<ChainReport>,
}

impl LedgerReport {
    /// True only if every chain passed.
    pub fn passed(&self) -> bool {
        self.chains.iter().all(ChainReport::passed)
    }

    pub fn entries(&self) -> usize {
        self.chains.iter().map(|c| c.entries).sum()
    }

    /// Every failure, paired with the scope it was found in.
    pub fn failures(&self) -> impl Iterator<Item = (&ChainScope, &ChainFailure)> {
        self.chains
            .iter()
            .flat_map(|c| c.failures.iter().map(move |f| (&c.scope, f)))
    }
}
