//! # ledger-verify
//!
//! Offline integrity verification for the audit ledger.
//!
//! [`ChainVerifier`] walks a chain in `(occurred_at, id)` order, recomputes
//! each entry's hash and checks its link to the predecessor. The result is a
//! [`ChainReport`] listing every broken link, hash mismatch, fork and bad
//! genesis it found.
//!
//! ```rust,ignore
//! use ledger_verify::ChainVerifier;
//!
//! let verifier = ChainVerifier::new(engine);
//! let report = verifier.verify_change_store(&store)?;
//! assert!(report.passed());
//! ```

pub mod engine;
pub mod report;

pub use engine::ChainVerifier;
pub use report::{ChainFailure, ChainReport, FailureKind, LedgerReport};

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;

    use ledger_audit::{InMemoryLedger, Sha2HashEngine};
    use ledger_contracts::{
        entry::{ActionEntry, ChangeEntry},
        error::LedgerError,
        request::{ActionRequest, ChangeRequest},
        scope::ChainScope,
        settings::LedgerSettings,
    };
    use ledger_core::{
        clock::ManualClock,
        traits::{ActionStore, ChangeStore},
        ActionTrail, ChangeTrail,
    };

    use super::{ChainVerifier, FailureKind};

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn engine() -> Arc<Sha2HashEngine> {
        Arc::new(Sha2HashEngine::new(&LedgerSettings::action()))
    }

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap()))
    }

    /// Three recorded actions, returned in chain order.
    fn action_chain() -> Vec<ActionEntry> {
        let store = Arc::new(InMemoryLedger::new());
        let clock = clock();
        let trail = ActionTrail::new(store.clone(), engine(), clock.clone());
        for n in 0..3 {
            let mut details = serde_json::Map::new();
            details.insert("n".into(), json!(n));
            trail
                .record_event(ActionRequest::new("t", "u", "VIEWED", "REPORT", "SUCCESS").with_details(details))
                .unwrap();
            clock.advance(Duration::seconds(1));
        }
        ActionStore::load_chain(store.as_ref()).unwrap()
    }

    fn kinds(report: &super::ChainReport) -> Vec<FailureKind> {
        report.failures.iter().map(|f| f.kind).collect()
    }

    // ── Intact chains ─────────────────────────────────────────────────────────

    #[test]
    fn intact_chain_passes() {
        let chain = action_chain();
        let report = ChainVerifier::new(engine()).verify_actions(&chain).unwrap();

        assert!(report.passed());
        assert_eq!(report.scope, ChainScope::Global);
        assert_eq!(report.entries, 3);
        assert_eq!(report.head.as_deref(), Some(chain[2].hash.as_str()));
    }

    #[test]
    fn empty_chain_passes() {
        let report = ChainVerifier::new(engine()).verify_actions(&[]).unwrap();
        assert!(report.passed());
        assert_eq!(report.head, None);
    }

    // ── Tampering ─────────────────────────────────────────────────────────────

    #[test]
    fn edited_field_is_a_hash_mismatch() {
        let mut chain = action_chain();
        chain[1].outcome = "FAILURE".into();

        let report = ChainVerifier::new(engine()).verify_actions(&chain).unwrap();
        assert_eq!(kinds(&report), vec![FailureKind::HashMismatch]);
        assert_eq!(report.failures[0].position, 1);
        assert_eq!(report.failures[0].entry_id, chain[1].id);
    }

    /// Rewriting an entry's hash to hide an edit breaks the next link.
    #[test]
    fn rehashed_entry_breaks_the_next_link() {
        let mut chain = action_chain();
        chain[1].user_id = "mallory".into();
        chain[1].hash = engine_hash(&chain[1]);

        let report = ChainVerifier::new(engine()).verify_actions(&chain).unwrap();
        assert_eq!(kinds(&report), vec![FailureKind::BrokenLink]);
        assert_eq!(report.failures[0].position, 2);
    }

    fn engine_hash(entry: &ActionEntry) -> String {
        use ledger_core::traits::HashEngine;
        engine()
            .compute_action_hash(&entry.prev_hash, &entry.to_request())
            .unwrap()
    }

    #[test]
    fn deleted_entry_breaks_the_link() {
        let mut chain = action_chain();
        chain.remove(1);

        let report = ChainVerifier::new(engine()).verify_actions(&chain).unwrap();
        assert_eq!(kinds(&report), vec![FailureKind::BrokenLink]);
    }

    #[test]
    fn wrong_first_link_is_bad_genesis() {
        let mut chain = action_chain();
        chain.remove(0);

        let report = ChainVerifier::new(engine()).verify_actions(&chain).unwrap();
        assert_eq!(kinds(&report), vec![FailureKind::BadGenesis]);
    }

    #[test]
    fn shared_predecessor_is_a_fork() {
        let mut chain = action_chain();
        let mut sibling = chain[1].clone();
        sibling.id = Some(99);
        sibling.trace_id = "other".into();
        sibling.hash = engine_hash(&sibling);
        chain.insert(2, sibling);

        let report = ChainVerifier::new(engine()).verify_actions(&chain).unwrap();
        let forks = report.failures.iter().filter(|f| f.kind == FailureKind::Fork).count();
        assert_eq!(forks, 2);
        assert!(!report.passed());
    }

    #[test]
    fn misconfigured_engine_is_an_error() {
        let mut settings = LedgerSettings::action();
        settings.hashing_algorithm = "CRC32".into();
        let verifier = ChainVerifier::new(Arc::new(Sha2HashEngine::new(&settings)));

        let err = verifier.verify_actions(&action_chain()).unwrap_err();
        assert!(matches!(err, LedgerError::Config { .. }));
    }

    // ── Entity ledger ─────────────────────────────────────────────────────────

    #[test]
    fn verifies_every_record_chain_in_a_store() {
        let store = Arc::new(InMemoryLedger::new());
        let clock = clock();
        let trail = ChangeTrail::new(store.clone(), engine(), clock.clone());
        for (id, op) in [("a", "CREATE"), ("b", "CREATE"), ("a", "UPDATE"), ("a", "DELETE")] {
            trail.record_change(ChangeRequest::new("ORDER", id, op)).unwrap();
            clock.advance(Duration::seconds(1));
        }

        let verifier = ChainVerifier::new(engine());
        let report = verifier.verify_change_store(store.as_ref()).unwrap();
        assert!(report.passed());
        assert_eq!(report.chains.len(), 2);
        assert_eq!(report.entries(), 4);

        let mut chain: Vec<ChangeEntry> = ChangeStore::load_chain(store.as_ref(), "20240315000001").unwrap();
        let mut forged = serde_json::Map::new();
        forged.insert("status".into(), json!("SHIPPED"));
        chain[2].new_values = Some(forged);
        let tampered = verifier.verify_changes("20240315000001", &chain).unwrap();
        assert_eq!(kinds(&tampered), vec![FailureKind::HashMismatch]);
        assert_eq!(tampered.scope, ChainScope::record("20240315000001"));
    }
}
