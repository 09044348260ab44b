//! The change trail: records entity create/update/delete events on the
//! entity's own per-record chain.
//!
//!   Validate → Append[ Allocate → Validate(record) → Head → Hash → Stamp
//!     → Assemble → Insert ] → Receipt
//!
//! Fields that do not depend on allocation (`entityType`, `operation`, and
//! `entityId` when no record number is supplied) are checked before the
//! store is touched. Allocation runs inside the store's `append`, so the
//! record-number lookup, any mint and the first write of an entity form one
//! unit: one entity stays on one chain and minted numbers stay unique across
//! every writer of the store.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use ledger_contracts::{
    entry::{ChangeEntry, ChangeReceipt},
    error::{LedgerError, LedgerResult},
    request::{has_text, ChangeRequest},
    scope::ChainScope,
};

use crate::{
    action_trail::stamp,
    allocator::{ensure_audit_number, resolvable_entity_id, RecordNumberAllocator},
    traits::{ChangeLookup, ChangeStore, Clock, HashEngine},
};

/// Entry point for recording entity change events.
pub struct ChangeTrail {
    store: Arc<dyn ChangeStore>,
    engine: Arc<dyn HashEngine>,
    clock: Arc<dyn Clock>,
    allocator: RecordNumberAllocator,
}

impl ChangeTrail {
    pub fn new(store: Arc<dyn ChangeStore>, engine: Arc<dyn HashEngine>, clock: Arc<dyn Clock>) -> Self {
        let allocator = RecordNumberAllocator::new(Arc::clone(&clock));
        Self {
            store,
            engine,
            clock,
            allocator,
        }
    }

    /// Record one entity change and return its receipt.
    ///
    /// `occurred_at` is the caller's value or the clock's, moved forward to
    /// the record chain's head time if it is earlier.
    ///
    /// # Errors
    ///
    /// - `Validation` when `entityType` or `operation` is blank, or when no
    ///   record number is supplied and `entityId` is blank.
    /// - `Config` when the hash engine's algorithm or genesis value is unusable.
    /// - `Persistence` / `Serialization` from the hash/write path, unchanged,
    ///   including an exhausted daily record-number sequence.
    pub fn record_change(&self, request: ChangeRequest) -> LedgerResult<ChangeReceipt> {
        if let Err(err) = validate_fields(&request) {
            warn!(
                entity_type = %request.entity_type,
                operation = %request.operation,
                error = %err,
                "rejected entity audit request"
            );
            return Err(err);
        }

        let entry = self
            .store
            .append(&mut |lookup: &dyn ChangeLookup| self.build_entry(lookup, request.clone()))?;
        let id = entry
            .id
            .ok_or_else(|| LedgerError::persistence("change store returned no generated key"))?;

        info!(
            scope = %ChainScope::record(entry.record_number.clone()),
            id,
            entity_type = %entry.entity_type,
            operation = %entry.operation,
            hash = %entry.hash,
            "entity audit entry appended"
        );

        Ok(ChangeReceipt {
            id,
            occurred_at: entry.occurred_at,
            audit_number: entry.audit_number,
            record_number: entry.record_number,
            hash: entry.hash,
            prev_hash: entry.prev_hash,
        })
    }

    fn build_entry(&self, lookup: &dyn ChangeLookup, mut request: ChangeRequest) -> LedgerResult<ChangeEntry> {
        let allocation = self.allocator.ensure_record_number(lookup, &mut request)?;
        let record_number = match request.record_number.as_deref() {
            Some(number) if has_text(Some(number)) => number.to_string(),
            _ => return Err(LedgerError::validation("recordNumber must not be blank")),
        };
        debug!(record_number = %record_number, ?allocation, "record number resolved");

        let audit_number = ensure_audit_number(&mut request);

        let scope = ChainScope::record(record_number.clone());
        let head = lookup.find_head(&record_number)?;
        let prev_hash = match &head {
            Some(head) => head.hash.clone(),
            None => {
                debug!(scope = %scope, "empty chain, linking to genesis");
                self.engine.initial_hash_value()?
            }
        };

        let hash = self.engine.compute_change_hash(&prev_hash, &request)?;
        let occurred_at = stamp(request.occurred_at, head.as_ref(), self.clock.as_ref(), &scope);

        Ok(assemble(request, occurred_at, audit_number, record_number, prev_hash, hash))
    }
}

fn validate_fields(request: &ChangeRequest) -> LedgerResult<()> {
    if !has_text(Some(&request.entity_type)) {
        return Err(LedgerError::validation("entityType must not be blank"));
    }
    if !has_text(Some(&request.operation)) {
        return Err(LedgerError::validation("operation must not be blank"));
    }
    resolvable_entity_id(request)?;
    Ok(())
}

fn assemble(
    request: ChangeRequest,
    occurred_at: DateTime<Utc>,
    audit_number: String,
    record_number: String,
    prev_hash: String,
    hash: String,
) -> ChangeEntry {
    ChangeEntry {
        id: None,
        occurred_at,
        audit_number,
        record_number,
        entity_type: request.entity_type,
        entity_id: request.entity_id,
        operation: request.operation,
        performed_by: request.performed_by,
        trace_id: request.trace_id,
        metadata: request.metadata,
        old_values: request.old_values,
        new_values: request.new_values,
        change_summary: request.change_summary,
        client_ip: request.client_ip,
        user_agent: request.user_agent,
        prev_hash,
        hash,
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
