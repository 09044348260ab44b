//! Canonical serialization and the SHA-2 hash engine.
//!
//! The hash input is a JSON object with a fixed key set. Absent optional
//! fields are written as explicit `null`s, never omitted, and every object
//! (including nested value maps) has its keys sorted. The object is encoded
//! as compact UTF-8 JSON and digested with the configured algorithm.
//!
//! `occurred_at` and the store-assigned id are not part of the hash input:
//! the hash is computed before either is known.

use serde_json::{Map, Value};

use ledger_contracts::{
    error::{LedgerError, LedgerResult},
    request::{ActionRequest, ChangeRequest, ValueMap},
    settings::LedgerSettings,
};
use ledger_core::traits::HashEngine;

use crate::digest::DigestAlgorithm;

/// Keys of the action hash input.
pub const ACTION_FIELDS: [&str; 16] = [
    "prevHash",
    "traceId",
    "userId",
    "action",
    "resourceType",
    "resourceId",
    "outcome",
    "clientIp",
    "userAgent",
    "referer",
    "clientSource",
    "requestedWith",
    "details",
    "oldValues",
    "newValues",
    "responseHash",
];

/// Keys of the entity change hash input.
pub const CHANGE_FIELDS: [&str; 14] = [
    "prevHash",
    "auditNumber",
    "recordNumber",
    "entityType",
    "entityId",
    "operation",
    "performedBy",
    "traceId",
    "metadata",
    "oldValues",
    "newValues",
    "changeSummary",
    "clientIp",
    "userAgent",
];

/// The canonical hash input for an action request.
pub fn action_payload(prev_hash: &str, request: &ActionRequest) -> Value {
    let values = [
        text(prev_hash),
        text(&request.trace_id),
        text(&request.user_id),
        text(&request.action),
        text(&request.resource_type),
        optional_text(&request.resource_id),
        text(&request.outcome),
        optional_text(&request.client_ip),
        optional_text(&request.user_agent),
        optional_text(&request.referer),
        optional_text(&request.client_source),
        optional_text(&request.requested_with),
        optional_map(&request.details),
        optional_map(&request.old_values),
        optional_map(&request.new_values),
        optional_text(&request.response_hash),
    ];
    object(ACTION_FIELDS.iter().copied().zip(values))
}

/// The canonical hash input for an entity change request.
pub fn change_payload(prev_hash: &str, request: &ChangeRequest) -> Value {
    let values = [
        text(prev_hash),
        optional_text(&request.audit_number),
        optional_text(&request.record_number),
        text(&request.entity_type),
        optional_text(&request.entity_id),
        text(&request.operation),
        optional_text(&request.performed_by),
        optional_text(&request.trace_id),
        optional_map(&request.metadata),
        optional_map(&request.old_values),
        optional_map(&request.new_values),
        optional_text(&request.change_summary),
        optional_text(&request.client_ip),
        optional_text(&request.user_agent),
    ];
    object(CHANGE_FIELDS.iter().copied().zip(values))
}

/// Encode a payload as compact JSON with every object's keys sorted.
pub fn canonical_bytes(payload: &Value) -> LedgerResult<Vec<u8>> {
    serde_json::to_vec(&sorted(payload)).map_err(|e| LedgerError::Serialization {
        reason: e.to_string(),
    })
}

fn text(value: &str) -> Value {
    Value::String(value.to_string())
}

fn optional_text(value: &Option<String>) -> Value {
    value.as_ref().map_or(Value::Null, |v| Value::String(v.clone()))
}

/// Empty maps hash as `null`, the same as absent ones; stores persist both
/// as SQL `NULL`.
fn optional_map(value: &Option<ValueMap>) -> Value {
    match value {
        Some(map) if !map.is_empty() => Value::Object(map.clone()),
        _ => Value::Null,
    }
}

fn object<'a>(pairs: impl Iterator<Item = (&'a str, Value)>) -> Value {
    Value::Object(pairs.map(|(k, v)| (k.to_string(), v)).collect())
}

/// Rebuild `value` with object keys inserted in sorted order.
///
/// `serde_json::Map` is already sorted unless the `preserve_order` feature is
/// enabled somewhere in the build; this keeps the encoding stable either way.
fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::with_capacity(map.len());
            for key in keys {
                out.insert(key.clone(), sorted(&map[key]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

/// `HashEngine` backed by the SHA-2 family.
///
/// One engine serves one ledger variant: it reads that variant's algorithm
/// and genesis value. Both are checked on every call, so a bad configuration
/// surfaces as `LedgerError::Config` on first use.
#[derive(Debug, Clone)]
pub struct Sha2HashEngine {
    hashing_algorithm: String,
    initial_hash_value: String,
}

impl Sha2HashEngine {
    pub fn new(settings: &LedgerSettings) -> Self {
        Self {
            hashing_algorithm: settings.hashing_algorithm.clone(),
            initial_hash_value: settings.initial_hash_value.clone(),
        }
    }

    /// The resolved digest algorithm.
    pub fn algorithm(&self) -> LedgerResult<DigestAlgorithm> {
        DigestAlgorithm::from_name(&self.hashing_algorithm)
    }

    fn digest(&self, payload: &Value) -> LedgerResult<String> {
        let algorithm = self.algorithm()?;
        let bytes = canonical_bytes(payload)?;
        Ok(algorithm.hex_digest(&bytes))
    }
}

impl HashEngine for Sha2HashEngine {
    fn initial_hash_value(&self) -> LedgerResult<String> {
        if self.initial_hash_value.trim().is_empty() {
            return Err(LedgerError::config("initial_hash_value must not be blank"));
        }
        Ok(self.initial_hash_value.clone())
    }

    fn compute_action_hash(&self, prev_hash: &str, request: &ActionRequest) -> LedgerResult<String> {
        self.digest(&action_payload(prev_hash, request))
    }

    fn compute_change_hash(&self, prev_hash: &str, request: &ChangeRequest) -> LedgerResult<String> {
        self.digest(&change_payload(prev_hash, request))
    }
}
