//! The action trail: records free-form action events on the global chain.
//!
//!   Validate → Append[ Head → Hash → Stamp → Assemble → Insert ] → Receipt
//!
//! Validation runs before any store or hash call. Everything inside
//! `append` runs as one unit in the store, so concurrent writers always
//! produce a linear chain. The stamp never precedes the head's, so the new
//! entry also sorts directly after the entry it links to.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use ledger_contracts::{
    entry::{ActionEntry, ActionReceipt, ChainHead},
    error::{LedgerError, LedgerResult},
    request::{has_text, ActionRequest},
    scope::ChainScope,
};

use crate::traits::{ActionStore, Clock, HashEngine};

/// Entry point for recording action events.
pub struct ActionTrail {
    store: Arc<dyn ActionStore>,
    engine: Arc<dyn HashEngine>,
    clock: Arc<dyn Clock>,
}

impl ActionTrail {
    pub fn new(store: Arc<dyn ActionStore>, engine: Arc<dyn HashEngine>, clock: Arc<dyn Clock>) -> Self {
        Self { store, engine, clock }
    }

    /// Record one action event and return its receipt.
    ///
    /// `occurred_at` is the caller's value or the clock's, moved forward to
    /// the chain head's time if it is earlier.
    ///
    /// # Errors
    ///
    /// - `Validation` when `traceId`, `userId`, `action`, `resourceType` or
    ///   `outcome` is blank. Nothing is read or written in that case.
    /// - `Config` when the hash engine's algorithm or genesis value is unusable.
    /// - `Persistence` / `Serialization` from the hash/write path, unchanged.
    pub fn record_event(&self, request: ActionRequest) -> LedgerResult<ActionReceipt> {
        if let Err(err) = validate(&request) {
            warn!(
                action = %request.action,
                error = %err,
                "rejected action audit request"
            );
            return Err(err);
        }

        let scope = ChainScope::Global;
        let entry = self.store.append(&mut |head: Option<ChainHead>| {
            let prev_hash = match &head {
                Some(head) => head.hash.clone(),
                None => {
                    debug!(scope = %scope, "empty chain, linking to genesis");
                    self.engine.initial_hash_value()?
                }
            };
            let hash = self.engine.compute_action_hash(&prev_hash, &request)?;
            let occurred_at = stamp(request.occurred_at, head.as_ref(), self.clock.as_ref(), &scope);
            Ok(assemble(&request, occurred_at, prev_hash, hash))
        })?;
        let id = entry
            .id
            .ok_or_else(|| LedgerError::persistence("action store returned no generated key"))?;

        info!(
            scope = %scope,
            id,
            action = %entry.action,
            hash = %entry.hash,
            "action audit entry appended"
        );

        Ok(ActionReceipt {
            id,
            occurred_at: entry.occurred_at,
            hash: entry.hash,
            prev_hash: entry.prev_hash,
        })
    }
}

/// The entry's `occurred_at`: the caller's value or the clock's, never
/// earlier than the head it links to.
pub(crate) fn stamp(
    supplied: Option<DateTime<Utc>>,
    head: Option<&ChainHead>,
    clock: &dyn Clock,
    scope: &ChainScope,
) -> DateTime<Utc> {
    let at = supplied.unwrap_or_else(|| clock.now());
    match head {
        Some(head) if at < head.occurred_at => {
            debug!(scope = %scope, requested = %at, head = %head.occurred_at, "occurred_at moved up to chain head");
            head.not_before(at)
        }
        _ => at,
    }
}

fn validate(request: &ActionRequest) -> LedgerResult<()> {
    let required = [
        ("traceId", &request.trace_id),
        ("userId", &request.user_id),
        ("action", &request.action),
        ("resourceType", &request.resource_type),
        ("outcome", &request.outcome),
    ];
    for (field, value) in required {
        if !has_text(Some(value)) {
            return Err(LedgerError::validation(format!("{field} must not be blank")));
        }
    }
    Ok(())
}

fn assemble(request: &ActionRequest, occurred_at: DateTime<Utc>, prev_hash: String, hash: String) -> ActionEntry {
    ActionEntry {
        id: None,
        occurred_at,
        trace_id: request.trace_id.clone(),
        user_id: request.user_id.clone(),
        action: request.action.clone(),
        resource_type: request.resource_type.clone(),
        resource_id: request.resource_id.clone(),
        outcome: request.outcome.clone(),
        client_ip: request.client_ip.clone(),
        user_agent: request.user_agent.clone(),
        referer: request.referer.clone(),
        client_source: request.client_source.clone(),
        requested_with: request.requested_with.clone(),
        details: request.details.clone(),
        old_values: request.old_values.clone(),
        new_values: request.new_values.clone(),
        response_hash: request.response_hash.clone(),
        prev_hash,
        hash,
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
