//! Event requests submitted by capture adapters.
//!
//! A request is mutable until it is recorded: adapters fill in defaults
//! (actor, trace id, HTTP correlation fields) and the trail services fill in
//! allocator-owned fields (record number, audit number) before hashing.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A JSON object whose keys are kept in sorted order.
pub type ValueMap = Map<String, Value>;

/// A free-form user action destined for the global action chain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    /// Caller-supplied event time. The trail service stamps its clock's time
    /// when absent.
    pub occurred_at: Option<DateTime<Utc>>,
    pub trace_id: String,
    /// The acting principal.
    pub user_id: String,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    /// Free-form result label, e.g. `SUCCESS` or `FAILURE`.
    pub outcome: String,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    pub client_source: Option<String>,
    pub requested_with: Option<String>,
    pub details: Option<ValueMap>,
    pub old_values: Option<ValueMap>,
    pub new_values: Option<ValueMap>,
    /// Hex digest of the response body, when the adapter captured one.
    pub response_hash: Option<String>,
}

impl ActionRequest {
    /// Build a request carrying only the required fields.
    pub fn new(
        trace_id: impl Into<String>,
        user_id: impl Into<String>,
        action: impl Into<String>,
        resource_type: impl Into<String>,
        outcome: impl Into<String>,
    ) -> Self {
        Self {
            trace_id: trace_id.into(),
            user_id: user_id.into(),
            action: action.into(),
            resource_type: resource_type.into(),
            outcome: outcome.into(),
            ..Self::default()
        }
    }

    pub fn with_resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn with_details(mut self, details: ValueMap) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(occurred_at);
        self
    }
}

/// A structured create/update/delete of one entity, destined for that
/// entity's per-record chain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRequest {
    pub occurred_at: Option<DateTime<Utc>>,
    /// Per-entry correlation token. Generated when absent.
    pub audit_number: Option<String>,
    /// Chain scope key. Resolved or minted when absent.
    pub record_number: Option<String>,
    pub entity_type: String,
    pub entity_id: Option<String>,
    /// Usually one of [`EntityOperation`]'s names, but any label is accepted.
    pub operation: String,
    pub performed_by: Option<String>,
    pub trace_id: Option<String>,
    pub metadata: Option<ValueMap>,
    pub old_values: Option<ValueMap>,
    pub new_values: Option<ValueMap>,
    pub change_summary: Option<String>,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
}

impl ChangeRequest {
    pub fn new(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        operation: impl Into<String>,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: Some(entity_id.into()),
            operation: operation.into(),
            ..Self::default()
        }
    }

    pub fn with_record_number(mut self, record_number: impl Into<String>) -> Self {
        self.record_number = Some(record_number.into());
        self
    }

    pub fn with_values(mut self, old_values: Option<ValueMap>, new_values: Option<ValueMap>) -> Self {
        self.old_values = old_values;
        self.new_values = new_values;
        self
    }

    pub fn with_occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(occurred_at);
        self
    }
}

/// Lifecycle operations emitted by entity capture adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntityOperation {
    Create,
    Update,
    Delete,
}

impl EntityOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for EntityOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// True when `value` is present and contains a non-whitespace character.
pub fn has_text(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}
