//! Immutable ledger entries and the receipts returned to callers.
//!
//! An entry is assembled once by a trail service from a validated request
//! plus its chain link (`prev_hash`, `hash`). Stores persist entries and hand
//! them back on the read side; nothing in the ledger mutates one afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::request::{ActionRequest, ChangeRequest, ValueMap};

/// One persisted entry of the global action chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionEntry {
    /// Store-assigned primary key. `None` until the entry has been saved.
    pub id: Option<i64>,
    pub occurred_at: DateTime<Utc>,
    pub trace_id: String,
    pub user_id: String,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub outcome: String,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    pub client_source: Option<String>,
    pub requested_with: Option<String>,
    pub details: Option<ValueMap>,
    pub old_values: Option<ValueMap>,
    pub new_values: Option<ValueMap>,
    pub response_hash: Option<String>,
    /// Hash of the chain's previous entry, or the genesis value.
    pub prev_hash: String,
    /// Digest over this entry's canonical payload and `prev_hash`.
    pub hash: String,
}

/// One persisted entry of a per-record entity chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEntry {
    pub id: Option<i64>,
    pub occurred_at: DateTime<Utc>,
    pub audit_number: String,
    pub record_number: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub operation: String,
    pub performed_by: Option<String>,
    pub trace_id: Option<String>,
    pub metadata: Option<ValueMap>,
    pub old_values: Option<ValueMap>,
    pub new_values: Option<ValueMap>,
    pub change_summary: Option<String>,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub prev_hash: String,
    pub hash: String,
}

/// Returned synchronously after an action entry is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionReceipt {
    pub id: i64,
    pub occurred_at: DateTime<Utc>,
    pub hash: String,
    pub prev_hash: String,
}

/// Returned synchronously after a change entry is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeReceipt {
    pub id: i64,
    pub occurred_at: DateTime<Utc>,
    pub audit_number: String,
    pub record_number: String,
    pub hash: String,
    pub prev_hash: String,
}

/// The newest entry of one chain, as seen by the writer appending to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainHead {
    pub hash: String,
    pub occurred_at: DateTime<Utc>,
}

impl ChainHead {
    /// `at`, moved forward to the head's time if it is earlier.
    ///
    /// Chains are ordered by `(occurred_at, id)`, so an entry stamped before
    /// the head it links to would sort ahead of its own predecessor.
    pub fn not_before(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        at.max(self.occurred_at)
    }
}

impl ActionEntry {
    /// The request this entry was built from, as the hash engine saw it.
    pub fn to_request(&self) -> ActionRequest {
        ActionRequest {
            occurred_at: Some(self.occurred_at),
            trace_id: self.trace_id.clone(),
            user_id: self.user_id.clone(),
            action: self.action.clone(),
            resource_type: self.resource_type.clone(),
            resource_id: self.resource_id.clone(),
            outcome: self.outcome.clone(),
            client_ip: self.client_ip.clone(),
            user_agent: self.user_agent.clone(),
            referer: self.referer.clone(),
            client_source: self.client_source.clone(),
            requested_with: self.requested_with.clone(),
            details: self.details.clone(),
            old_values: self.old_values.clone(),
            new_values: self.new_values.clone(),
            response_hash: self.response_hash.clone(),
        }
    }
}

impl ChangeEntry {
    /// The request this entry was built from, with its resolved record and
    /// audit numbers.
    pub fn to_request(&self) -> ChangeRequest {
        ChangeRequest {
            occurred_at: Some(self.occurred_at),
            audit_number: Some(self.audit_number.clone()),
            record_number: Some(self.record_number.clone()),
            entity_type: self.entity_type.clone(),
            entity_id: self.entity_id.clone(),
            operation: self.operation.clone(),
            performed_by: self.performed_by.clone(),
            trace_id: self.trace_id.clone(),
            metadata: self.metadata.clone(),
            old_values: self.old_values.clone(),
            new_values: self.new_values.clone(),
            change_summary: self.change_summary.clone(),
            client_ip: self.client_ip.clone(),
            user_agent: self.user_agent.clone(),
        }
    }
}
