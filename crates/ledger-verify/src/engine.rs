//! Chain verifier.
//!
//! `ChainVerifier` re-derives every hash of a chain with the same
//! `HashEngine` that wrote it. Each entry is checked in chain order:
//!
//! 1. **Fork** — no other entry in the chain claims the same `prev_hash`.
//! 2. **Link** — `prev_hash` equals the predecessor's `hash`, or the genesis
//!    value for the first entry (`BadGenesis` otherwise).
//! 3. **Content** — recomputing the hash from the stored fields and
//!    `prev_hash` reproduces the stored `hash`.
//!
//! All failures are collected before returning so one run shows the full
//! damage. Engine configuration errors and store read errors are returned
//! as `Err`, not folded into the report.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use ledger_contracts::{
    entry::{ActionEntry, ChangeEntry},
    error::LedgerResult,
    scope::ChainScope,
};
use ledger_core::traits::{ActionStore, ChangeStore, HashEngine};

use crate::report::{ChainFailure, ChainReport, FailureKind, LedgerReport};

/// What the verifier needs to know about a stored entry.
trait Linked {
    fn entry_id(&self) -> Option<i64>;
    fn prev_hash(&self) -> &str;
    fn hash(&self) -> &str;
    fn recompute(&self, engine: &dyn HashEngine) -> LedgerResult<String>;
}

impl Linked for ActionEntry {
    fn entry_id(&self) -> Option<i64> {
        self.id
    }
    fn prev_hash(&self) -> &str {
        &self.prev_hash
    }
    fn hash(&self) -> &str {
        &self.hash
    }
    fn recompute(&self, engine: &dyn HashEngine) -> LedgerResult<String> {
        engine.compute_action_hash(&self.prev_hash, &self.to_request())
    }
}

impl Linked for ChangeEntry {
    fn entry_id(&self) -> Option<i64> {
        self.id
    }
    fn prev_hash(&self) -> &str {
        &self.prev_hash
    }
    fn hash(&self) -> &str {
        &self.hash
    }
    fn recompute(&self, engine: &dyn HashEngine) -> LedgerResult<String> {
        engine.compute_change_hash(&self.prev_hash, &self.to_request())
    }
}

/// Offline integrity checker for both ledger variants.
pub struct ChainVerifier {
    engine: Arc<dyn HashEngine>,
}

impl ChainVerifier {
    /// The engine must carry the same settings the chain was written with.
    pub fn new(engine: Arc<dyn HashEngine>) -> Self {
        Self { engine }
    }

    /// Verify the global action chain, given in `(occurred_at, id)` order.
    pub fn verify_actions(&self, chain: &[ActionEntry]) -> LedgerResult<ChainReport> {
        self.verify_chain(ChainScope::Global, chain)
    }

    /// Verify one record number's chain, given in `(occurred_at, id)` order.
    pub fn verify_changes(&self, record_number: &str, chain: &[ChangeEntry]) -> LedgerResult<ChainReport> {
        self.verify_chain(ChainScope::record(record_number), chain)
    }

    /// Load and verify the whole action ledger.
    pub fn verify_action_store(&self, store: &dyn ActionStore) -> LedgerResult<LedgerReport> {
        let chain = store.load_chain()?;
        let report = self.verify_actions(&chain)?;
        Ok(LedgerReport { chains: vec![report] })
    }

    /// Load and verify every record chain of the entity ledger.
    pub fn verify_change_store(&self, store: &dyn ChangeStore) -> LedgerResult<LedgerReport> {
        let mut chains = Vec::new();
        for record_number in store.record_numbers()? {
            let chain = store.load_chain(&record_number)?;
            chains.push(self.verify_changes(&record_number, &chain)?);
        }
        let report = LedgerReport { chains };
        info!(
            chains = report.chains.len(),
            entries = report.entries(),
            passed = report.passed(),
            "entity ledger verified"
        );
        Ok(report)
    }

    fn verify_chain<E: Linked>(&self, scope: ChainScope, chain: &[E]) -> LedgerResult<ChainReport> {
        let genesis = self.engine.initial_hash_value()?;
        let mut failures = Vec::new();

        let mut claimants: HashMap<&str, usize> = HashMap::new();
        for entry in chain {
            *claimants.entry(entry.prev_hash()).or_default() += 1;
        }

        for (position, entry) in chain.iter().enumerate() {
            let mut fail = |kind: FailureKind, message: String| {
                warn!(scope = %scope, position, kind = %kind, %message, "chain integrity failure");
                failures.push(ChainFailure {
                    kind,
                    position,
                    entry_id: entry.entry_id(),
                    message,
                });
            };

            let forked = claimants.get(entry.prev_hash()).copied().unwrap_or(0) > 1;
            if forked {
                fail(
                    FailureKind::Fork,
                    format!("prev_hash {} is claimed by more than one entry", entry.prev_hash()),
                );
            }

            let expected_prev = match position {
                0 => genesis.as_str(),
                _ => chain[position - 1].hash(),
            };
            if entry.prev_hash() != expected_prev && !forked {
                let kind = if position == 0 {
                    FailureKind::BadGenesis
                } else {
                    FailureKind::BrokenLink
                };
                fail(
                    kind,
                    format!("prev_hash {} does not match expected {}", entry.prev_hash(), expected_prev),
                );
            }

            let recomputed = entry.recompute(self.engine.as_ref())?;
            if recomputed != entry.hash() {
                fail(
                    FailureKind::HashMismatch,
                    format!("stored hash {} but content hashes to {}", entry.hash(), recomputed),
                );
            }
        }

        debug!(scope = %scope, entries = chain.len(), failures = failures.len(), "chain verified");

        Ok(ChainReport {
            scope,
            entries: chain.len(),
            head: chain.last().map(|e| e.hash().to_string()),
            failures,
        })
    }
}
