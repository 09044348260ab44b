//! Trait seams of the ledger pipeline.
//!
//! - `HashEngine`   — pure canonical serialization + digest
//! - `ActionStore`  — durable home of the global action chain
//! - `ChangeLookup` — the reads record-number allocation and linking need
//! - `ChangeStore`  — durable home of the per-record entity chains
//! - `Clock`        — injected time source for `occurred_at` and record numbers
//!
//! The trail services wire them together. Implementations live in other
//! crates: `ledger-audit` (SHA-2 engine, in-memory store) and `ledger-sqlite`.
//!
//! Writes go through `append`, which reads the head and inserts the next
//! entry as one serialized unit inside the store. Every writer sharing the
//! store's data, whether another trail, another handle or another process,
//! is ordered by it.

use chrono::{DateTime, Utc};

use ledger_contracts::{
    entry::{ActionEntry, ChainHead, ChangeEntry},
    error::LedgerResult,
    request::{ActionRequest, ChangeRequest},
};

/// Deterministically digests a request together with its chain link.
///
/// Implementations must be pure: identical `(prev_hash, request)` and
/// configuration always yield the identical hex digest.
pub trait HashEngine: Send + Sync {
    /// The `prev_hash` used for the first entry of any chain.
    ///
    /// Returns `LedgerError::Config` when the configured value is blank.
    fn initial_hash_value(&self) -> LedgerResult<String>;

    /// Digest an action request linked to `prev_hash`.
    fn compute_action_hash(&self, prev_hash: &str, request: &ActionRequest) -> LedgerResult<String>;

    /// Digest an entity change request linked to `prev_hash`.
    ///
    /// The request's record number and audit number must already be resolved.
    fn compute_change_hash(&self, prev_hash: &str, request: &ChangeRequest) -> LedgerResult<String>;
}

/// Builds the next action entry from the current head of the global chain.
pub type BuildAction<'a> = dyn FnMut(Option<ChainHead>) -> LedgerResult<ActionEntry> + 'a;

/// Builds the next change entry, resolving what it needs through the lookup.
pub type BuildChange<'a> = dyn FnMut(&dyn ChangeLookup) -> LedgerResult<ChangeEntry> + 'a;

/// Append-only persistence for the global action chain.
///
/// No implementation may update or delete a saved entry.
pub trait ActionStore: Send + Sync {
    /// The entry with the greatest `(occurred_at, id)`, or `None` when the
    /// chain is empty.
    fn find_head(&self) -> LedgerResult<Option<ChainHead>>;

    /// The `hash` of the chain head.
    fn find_latest_hash(&self) -> LedgerResult<Option<String>> {
        Ok(self.find_head()?.map(|head| head.hash))
    }

    /// Insert one entry as given and return its generated id.
    fn save(&self, entry: &ActionEntry) -> LedgerResult<i64>;

    /// Read the head, call `build` with it and insert the result, with no
    /// other append able to run in between. Returns the stored entry with
    /// its id set. Nothing is inserted when `build` fails.
    fn append(&self, build: &mut BuildAction<'_>) -> LedgerResult<ActionEntry>;

    /// Every entry in chain order, `(occurred_at, id)` ascending.
    fn load_chain(&self) -> LedgerResult<Vec<ActionEntry>>;
}

/// Reads over the entity table.
pub trait ChangeLookup {
    /// The entry with the greatest `(occurred_at, id)` in one record's chain.
    fn find_head(&self, record_number: &str) -> LedgerResult<Option<ChainHead>>;

    /// The earliest-created record number already bound to this entity.
    fn find_record_number_for(&self, entity_type: &str, entity_id: &str) -> LedgerResult<Option<String>>;

    /// The lexicographically greatest record number starting with `prefix`.
    fn find_latest_record_number_with_prefix(&self, prefix: &str) -> LedgerResult<Option<String>>;
}

/// Append-only persistence for per-record entity chains.
pub trait ChangeStore: ChangeLookup + Send + Sync {
    /// The latest `hash` within one record number's chain.
    fn find_latest_hash(&self, record_number: &str) -> LedgerResult<Option<String>> {
        Ok(self.find_head(record_number)?.map(|head| head.hash))
    }

    /// Insert one entry as given and return its generated id.
    fn save(&self, entry: &ChangeEntry) -> LedgerResult<i64>;

    /// Call `build` with a lookup that sees a stable view of the table and
    /// insert the entry it returns, with no other append able to run in
    /// between. Record-number allocation and head reads made through the
    /// lookup are therefore consistent with the insert. Returns the stored
    /// entry with its id set. Nothing is inserted when `build` fails.
    fn append(&self, build: &mut BuildChange<'_>) -> LedgerResult<ChangeEntry>;

    /// Entries of one record number's chain, `(occurred_at, id)` ascending.
    fn load_chain(&self, record_number: &str) -> LedgerResult<Vec<ChangeEntry>>;

    /// All record numbers that have at least one entry, ascending.
    fn record_numbers(&self) -> LedgerResult<Vec<String>>;
}

/// Time source injected into the trail services.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
