//! In-memory implementation of `ActionStore` and `ChangeStore`.
//!
//! `InMemoryLedger` is the reference store. It keeps both tables in `Vec`s
//! behind one `Mutex`, assigns ids from a shared counter, and answers the
//! ordering queries the same way the SQL store does: "latest" means the
//! greatest `(occurred_at, id)`.
//!
//! `append` holds the table lock while the entry is built, so every writer
//! sharing the store (clones included) is serialized.
//!
//! Useful for tests and for embedding the ledger in a process that exports
//! its chains some other way.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use ledger_contracts::{
    entry::{ActionEntry, ChainHead, ChangeEntry},
    error::{LedgerError, LedgerResult},
};
use ledger_core::traits::{ActionStore, BuildAction, BuildChange, ChangeLookup, ChangeStore};

// ── Internal mutable state ────────────────────────────────────────────────────

#[derive(Default)]
struct LedgerTables {
    actions: Vec<ActionEntry>,
    changes: Vec<ChangeEntry>,
    next_id: i64,
}

// ── Public store ─────────────────────────────────────────────────────────────

/// An append-only, in-memory home for both ledger variants.
///
/// Clones share the same tables.
#[derive(Clone, Default)]
pub struct InMemoryLedger {
    tables: Arc<Mutex<LedgerTables>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of action entries saved so far.
    pub fn action_count(&self) -> usize {
        self.tables.lock().map(|t| t.actions.len()).unwrap_or(0)
    }

    /// Number of change entries saved so far, across all records.
    pub fn change_count(&self) -> usize {
        self.tables.lock().map(|t| t.changes.len()).unwrap_or(0)
    }

    fn lock(&self) -> LedgerResult<MutexGuard<'_, LedgerTables>> {
        self.tables
            .lock()
            .map_err(|e| LedgerError::persistence(format!("in-memory ledger lock poisoned: {e}")))
    }
}

impl LedgerTables {
    fn assign_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn action_head(&self) -> Option<ChainHead> {
        self.actions.iter().max_by_key(|e| (e.occurred_at, e.id)).map(|e| ChainHead {
            hash: e.hash.clone(),
            occurred_at: e.occurred_at,
        })
    }

    fn insert_action(&mut self, entry: &ActionEntry) -> i64 {
        let id = self.assign_id();
        let mut stored = entry.clone();
        stored.id = Some(id);
        self.actions.push(stored);
        debug!(id, hash = %entry.hash, "action entry stored in memory");
        id
    }

    fn insert_change(&mut self, entry: &ChangeEntry) -> i64 {
        let id = self.assign_id();
        let mut stored = entry.clone();
        stored.id = Some(id);
        self.changes.push(stored);
        debug!(
            id,
            record_number = %entry.record_number,
            hash = %entry.hash,
            "change entry stored in memory"
        );
        id
    }
}

impl ChangeLookup for LedgerTables {
    fn find_head(&self, record_number: &str) -> LedgerResult<Option<ChainHead>> {
        Ok(self
            .changes
            .iter()
            .filter(|e| e.record_number == record_number)
            .max_by_key(|e| (e.occurred_at, e.id))
            .map(|e| ChainHead {
                hash: e.hash.clone(),
                occurred_at: e.occurred_at,
            }))
    }

    fn find_record_number_for(&self, entity_type: &str, entity_id: &str) -> LedgerResult<Option<String>> {
        Ok(self
            .changes
            .iter()
            .filter(|e| e.entity_type == entity_type && e.entity_id.as_deref() == Some(entity_id))
            .min_by_key(|e| (e.occurred_at, e.id))
            .map(|e| e.record_number.clone()))
    }

    fn find_latest_record_number_with_prefix(&self, prefix: &str) -> LedgerResult<Option<String>> {
        Ok(self
            .changes
            .iter()
            .map(|e| &e.record_number)
            .filter(|n| n.starts_with(prefix))
            .max()
            .cloned())
    }
}

impl ActionStore for InMemoryLedger {
    fn find_head(&self) -> LedgerResult<Option<ChainHead>> {
        Ok(self.lock()?.action_head())
    }

    fn save(&self, entry: &ActionEntry) -> LedgerResult<i64> {
        Ok(self.lock()?.insert_action(entry))
    }

    fn append(&self, build: &mut BuildAction<'_>) -> LedgerResult<ActionEntry> {
        let mut tables = self.lock()?;
        let mut entry = build(tables.action_head())?;
        entry.id = Some(tables.insert_action(&entry));
        Ok(entry)
    }

    fn load_chain(&self) -> LedgerResult<Vec<ActionEntry>> {
        let tables = self.lock()?;
        let mut chain = tables.actions.clone();
        chain.sort_by_key(|e| (e.occurred_at, e.id));
        Ok(chain)
    }
}

impl ChangeLookup for InMemoryLedger {
    fn find_head(&self, record_number: &str) -> LedgerResult<Option<ChainHead>> {
        self.lock()?.find_head(record_number)
    }

    fn find_record_number_for(&self, entity_type: &str, entity_id: &str) -> LedgerResult<Option<String>> {
        self.lock()?.find_record_number_for(entity_type, entity_id)
    }

    fn find_latest_record_number_with_prefix(&self, prefix: &str) -> LedgerResult<Option<String>> {
        self.lock()?.find_latest_record_number_with_prefix(prefix)
    }
}

impl ChangeStore for InMemoryLedger {
    fn save(&self, entry: &ChangeEntry) -> LedgerResult<i64> {
        Ok(self.lock()?.insert_change(entry))
    }

    fn append(&self, build: &mut BuildChange<'_>) -> LedgerResult<ChangeEntry> {
        let mut tables = self.lock()?;
        let mut entry = build(&*tables)?;
        entry.id = Some(tables.insert_change(&entry));
        Ok(entry)
    }

    fn load_chain(&self, record_number: &str) -> LedgerResult<Vec<ChangeEntry>> {
        let tables = self.lock()?;
        let mut chain: Vec<ChangeEntry> = tables
            .changes
            .iter()
            .filter(|e| e.record_number == record_number)
            .cloned()
            .collect();
        chain.sort_by_key(|e| (e.occurred_at, e.id));
        Ok(chain)
    }

    fn record_numbers(&self) -> LedgerResult<Vec<String>> {
        let tables = self.lock()?;
        let mut numbers: Vec<String> = tables.changes.iter().map(|e| e.record_number.clone()).collect();
        numbers.sort();
        numbers.dedup();
        Ok(numbers)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use ledger_contracts::{
        entry::{ActionEntry, ChainHead, ChangeEntry},
        error::{LedgerError, LedgerResult},
    };
    use ledger_core::traits::{ActionStore, ChangeLookup, ChangeStore};

    use super::InMemoryLedger;

    fn action(hash: &str, secs: i64) -> ActionEntry {
        ActionEntry {
            id: None,
            occurred_at: Utc.timestamp_opt(secs, 0).unwrap(),
            trace_id: "t".into(),
            user_id: "u".into(),
            action: "a".into(),
            resource_type: "r".into(),
            resource_id: None,
            outcome: "SUCCESS".into(),
            client_ip: None,
            user_agent: None,
            referer: None,
            client_source: None,
            requested_with: None,
            details: None,
            old_values: None,
            new_values: None,
            response_hash: None,
            prev_hash: "p".into(),
            hash: hash.into(),
        }
    }

    fn change(record: &str, entity_id: &str, hash: &str, secs: i64) -> ChangeEntry {
        ChangeEntry {
            id: None,
            occurred_at: Utc.timestamp_opt(secs, 0).unwrap(),
            audit_number: format!("aud-{hash}"),
            record_number: record.into(),
            entity_type: "INVOICE".into(),
            entity_id: Some(entity_id.into()),
            operation: "UPDATE".into(),
            performed_by: None,
            trace_id: None,
            metadata: None,
            old_values: None,
            new_values: None,
            change_summary: None,
            client_ip: None,
            user_agent: None,
            prev_hash: "p".into(),
            hash: hash.into(),
        }
    }

    #[test]
    fn empty_store_has_no_head() {
        let store = InMemoryLedger::new();
        assert_eq!(ActionStore::find_latest_hash(&store).unwrap(), None);
        assert_eq!(ChangeStore::find_latest_hash(&store, "D1").unwrap(), None);
        assert!(store.record_numbers().unwrap().is_empty());
    }

    #[test]
    fn ids_are_assigned_in_save_order() {
        let store = InMemoryLedger::new();
        assert_eq!(ActionStore::save(&store, &action("h1", 10)).unwrap(), 1);
        assert_eq!(ChangeStore::save(&store, &change("D1", "e", "c1", 10)).unwrap(), 2);
        assert_eq!(ActionStore::save(&store, &action("h2", 10)).unwrap(), 3);
        assert_eq!(store.action_count(), 2);
        assert_eq!(store.change_count(), 1);
    }

    /// Latest is by occurred_at first, id second.
    #[test]
    fn latest_hash_orders_by_time_then_id() {
        let store = InMemoryLedger::new();
        ActionStore::save(&store, &action("late", 20)).unwrap();
        ActionStore::save(&store, &action("early", 10)).unwrap();
        assert_eq!(ActionStore::find_latest_hash(&store).unwrap().as_deref(), Some("late"));

        ActionStore::save(&store, &action("tie", 20)).unwrap();
        assert_eq!(ActionStore::find_latest_hash(&store).unwrap().as_deref(), Some("tie"));

        let chain = ActionStore::load_chain(&store).unwrap();
        let hashes: Vec<&str> = chain.iter().map(|e| e.hash.as_str()).collect();
        assert_eq!(hashes, vec!["early", "late", "tie"]);
    }

    #[test]
    fn change_queries_are_scoped_by_record_number() {
        let store = InMemoryLedger::new();
        ChangeStore::save(&store, &change("20240315000001", "a", "a1", 10)).unwrap();
        ChangeStore::save(&store, &change("20240315000002", "b", "b1", 11)).unwrap();
        ChangeStore::save(&store, &change("20240315000001", "a", "a2", 12)).unwrap();

        assert_eq!(
            ChangeStore::find_latest_hash(&store, "20240315000001").unwrap().as_deref(),
            Some("a2")
        );
        assert_eq!(ChangeStore::load_chain(&store, "20240315000002").unwrap().len(), 1);
        assert_eq!(
            store.record_numbers().unwrap(),
            vec!["20240315000001".to_string(), "20240315000002".to_string()]
        );
    }

    #[test]
    fn record_number_lookup_returns_earliest_binding() {
        let store = InMemoryLedger::new();
        ChangeStore::save(&store, &change("20240316000001", "a", "x", 20)).unwrap();
        ChangeStore::save(&store, &change("20240315000001", "a", "y", 10)).unwrap();

        assert_eq!(
            store.find_record_number_for("INVOICE", "a").unwrap().as_deref(),
            Some("20240315000001")
        );
        assert_eq!(store.find_record_number_for("INVOICE", "zzz").unwrap(), None);
        assert_eq!(store.find_record_number_for("ORDER", "a").unwrap(), None);
    }

    #[test]
    fn prefix_lookup_is_lexicographic_max() {
        let store = InMemoryLedger::new();
        ChangeStore::save(&store, &change("20240315000009", "a", "x", 10)).unwrap();
        ChangeStore::save(&store, &change("20240315000010", "b", "y", 11)).unwrap();
        ChangeStore::save(&store, &change("20240316000001", "c", "z", 12)).unwrap();

        assert_eq!(
            store.find_latest_record_number_with_prefix("20240315").unwrap().as_deref(),
            Some("20240315000010")
        );
        assert_eq!(store.find_latest_record_number_with_prefix("20240317").unwrap(), None);
    }

    #[test]
    fn clones_share_tables() {
        let store = InMemoryLedger::new();
        let other = store.clone();
        ActionStore::save(&other, &action("h", 1)).unwrap();
        assert_eq!(store.action_count(), 1);
    }

    #[test]
    fn append_builds_from_the_current_head() {
        let store = InMemoryLedger::new();
        ActionStore::save(&store, &action("h1", 10)).unwrap();

        let stored = ActionStore::append(&store, &mut |head: Option<ChainHead>| -> LedgerResult<ActionEntry> {
            let head = head.expect("chain has a head");
            assert_eq!(head.hash, "h1");
            let mut next = action("h2", 11);
            next.prev_hash = head.hash;
            Ok(next)
        })
        .unwrap();

        assert_eq!(stored.id, Some(2));
        assert_eq!(ActionStore::find_latest_hash(&store).unwrap().as_deref(), Some("h2"));
    }

    #[test]
    fn failed_build_inserts_nothing() {
        let store = InMemoryLedger::new();
        let err = ChangeStore::append(&store, &mut |_lookup: &dyn ChangeLookup| -> LedgerResult<ChangeEntry> {
            Err(LedgerError::validation("rejected"))
        })
        .unwrap_err();

        assert!(matches!(err, LedgerError::Validation { .. }));
        assert_eq!(store.change_count(), 0);
    }
}
