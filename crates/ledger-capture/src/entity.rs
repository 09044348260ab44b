//! Entity change capture.
//!
//! Domain types opt in by implementing [`AuditableEntity`]. The helper turns
//! a lifecycle event on such a value into a `ChangeRequest`:
//!
//! - `CREATE` records the new state, `DELETE` the old one.
//! - `UPDATE` records only the fields that differ between the two states,
//!   and records nothing when no field changed.
//! - Metadata starts from the entity's own `audit_metadata`, then gains
//!   `entityClass` and `tableName` unless the entity already set them.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use ledger_contracts::{
    entry::ChangeReceipt,
    error::LedgerResult,
    request::{has_text, ChangeRequest, EntityOperation, ValueMap},
    settings::LedgerSettings,
};
use ledger_core::ChangeTrail;

use crate::context::{non_blank, RequestContext};

pub const ENTITY_CLASS_KEY: &str = "entityClass";
pub const TABLE_NAME_KEY: &str = "tableName";
pub const FIELD_KEY: &str = "field";
pub const REFERER_KEY: &str = "referer";
pub const REQUESTED_WITH_KEY: &str = "requestedWith";

/// Key used by single-value changes when no field name is given.
pub const VALUE_KEY: &str = "value";

/// A domain value whose lifecycle is recorded on the entity ledger.
pub trait AuditableEntity {
    /// Stable type label, e.g. `"INVOICE"`.
    fn entity_type(&self) -> String;

    /// `None` for values that have no identity yet.
    fn entity_id(&self) -> Option<String>;

    /// The fields to record, keyed by name.
    fn audit_state(&self) -> ValueMap;

    fn audit_metadata(&self) -> Option<ValueMap> {
        None
    }

    fn table_name(&self) -> Option<String> {
        None
    }

    fn change_summary(
        &self,
        _operation: EntityOperation,
        _old: Option<&ValueMap>,
        _new: Option<&ValueMap>,
    ) -> Option<String> {
        None
    }
}

pub struct EntityAuditHelper {
    trail: Arc<ChangeTrail>,
    enabled: bool,
}

impl EntityAuditHelper {
    pub fn new(trail: Arc<ChangeTrail>, settings: &LedgerSettings) -> Self {
        Self {
            trail,
            enabled: settings.enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record a change request after filling context defaults.
    ///
    /// `performedBy` falls back to the context actor (or `SYSTEM`), the trace
    /// id to the context's (or a new UUID). Client IP and user agent are
    /// copied when the request has none; referer and requested-with go into
    /// metadata unless it already has them.
    pub fn record_change(
        &self,
        ctx: &RequestContext,
        mut request: ChangeRequest,
    ) -> LedgerResult<Option<ChangeReceipt>> {
        if !self.enabled {
            debug!(entity_type = %request.entity_type, "entity ledger disabled, skipping");
            return Ok(None);
        }

        if !has_text(request.performed_by.as_deref()) {
            request.performed_by = Some(ctx.resolve_actor());
        }
        if !has_text(request.trace_id.as_deref()) {
            request.trace_id = Some(ctx.resolve_trace_id());
        }
        if request.client_ip.is_none() {
            request.client_ip.clone_from(&ctx.client_ip);
        }
        if request.user_agent.is_none() {
            request.user_agent.clone_from(&ctx.user_agent);
        }

        let mut metadata = request.metadata.take().unwrap_or_default();
        put_if_absent(&mut metadata, REFERER_KEY, ctx.referer.as_deref());
        put_if_absent(&mut metadata, REQUESTED_WITH_KEY, ctx.requested_with.as_deref());
        request.metadata = non_empty(metadata);

        self.trail.record_change(request).map(Some)
    }

    /// Record a change of one value. Old and new values are stored under
    /// `field` (or `value` when no field name is given), and `field` is
    /// added to metadata.
    pub fn record_value_change(
        &self,
        ctx: &RequestContext,
        change: ValueChange,
    ) -> LedgerResult<Option<ChangeReceipt>> {
        let field = non_blank(change.field.as_deref());
        let key = field.clone().unwrap_or_else(|| VALUE_KEY.to_string());

        let mut metadata = change.metadata.unwrap_or_default();
        put_if_absent(&mut metadata, FIELD_KEY, field.as_deref());

        let request = ChangeRequest {
            entity_type: change.entity_type,
            entity_id: Some(change.entity_id),
            operation: change.operation,
            old_values: Some(single_value(&key, change.old_value)),
            new_values: Some(single_value(&key, change.new_value)),
            metadata: Some(metadata),
            change_summary: change.change_summary,
            audit_number: change.audit_number,
            ..ChangeRequest::default()
        };
        self.record_change(ctx, request)
    }

    /// Record a lifecycle event of `entity`.
    ///
    /// `before` is the state captured before the change (ignored for
    /// `CREATE`). Returns `Ok(None)` for an `UPDATE` that changed nothing.
    pub fn record_entity<E: AuditableEntity>(
        &self,
        ctx: &RequestContext,
        entity: &E,
        operation: EntityOperation,
        before: Option<&ValueMap>,
    ) -> LedgerResult<Option<ChangeReceipt>> {
        let (old_values, new_values) = match operation {
            EntityOperation::Create => (None, non_empty(entity.audit_state())),
            EntityOperation::Delete => (
                before.cloned().or_else(|| Some(entity.audit_state())).and_then(non_empty),
                None,
            ),
            EntityOperation::Update => {
                let after = entity.audit_state();
                let empty = ValueMap::new();
                let (old, new) = diff_states(before.unwrap_or(&empty), &after);
                if old.is_empty() && new.is_empty() {
                    debug!(entity_type = %entity.entity_type(), "update changed no audited field");
                    return Ok(None);
                }
                (Some(old), Some(new))
            }
        };

        let mut metadata = entity.audit_metadata().unwrap_or_default();
        put_if_absent(&mut metadata, ENTITY_CLASS_KEY, Some(std::any::type_name::<E>()));
        put_if_absent(&mut metadata, TABLE_NAME_KEY, entity.table_name().as_deref());

        let summary = entity
            .change_summary(operation, old_values.as_ref(), new_values.as_ref())
            .filter(|s| has_text(Some(s)));

        let request = ChangeRequest {
            entity_type: entity.entity_type(),
            entity_id: entity.entity_id(),
            operation: operation.to_string(),
            old_values,
            new_values,
            metadata: non_empty(metadata),
            change_summary: summary,
            ..ChangeRequest::default()
        };

        info!(
            entity_type = %request.entity_type,
            entity_id = ?request.entity_id,
            operation = %operation,
            "recording entity change"
        );
        self.record_change(ctx, request)
    }
}

/// Inputs of [`EntityAuditHelper::record_value_change`].
#[derive(Debug, Clone, Default)]
pub struct ValueChange {
    pub entity_type: String,
    pub entity_id: String,
    pub operation: String,
    pub field: Option<String>,
    pub old_value: Value,
    pub new_value: Value,
    pub change_summary: Option<String>,
    pub metadata: Option<ValueMap>,
    pub audit_number: Option<String>,
}

/// The fields whose values differ between `before` and `after`.
///
/// Returns `(old, new)`: a key present on only one side appears as `null` on
/// the other.
pub fn diff_states(before: &ValueMap, after: &ValueMap) -> (ValueMap, ValueMap) {
    let mut old = ValueMap::new();
    let mut new = ValueMap::new();
    for key in before.keys().chain(after.keys()) {
        if old.contains_key(key) {
            continue;
        }
        let was = before.get(key).unwrap_or(&Value::Null);
        let now = after.get(key).unwrap_or(&Value::Null);
        if was != now {
            old.insert(key.clone(), was.clone());
            new.insert(key.clone(), now.clone());
        }
    }
    (old, new)
}

fn single_value(key: &str, value: Value) -> ValueMap {
    let mut map = ValueMap::new();
    map.insert(key.to_string(), value);
    map
}

fn put_if_absent(map: &mut ValueMap, key: &str, value: Option<&str>) {
    if let Some(value) = value {
        map.entry(key.to_string())
            .or_insert_with(|| Value::String(value.to_string()));
    }
}

fn non_empty(map: ValueMap) -> Option<ValueMap> {
    (!map.is_empty()).then_some(map)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use serde_json::{json, Value};

    use ledger_audit::{InMemoryLedger, Sha2HashEngine};
    use ledger_contracts::{
        request::{ChangeRequest, EntityOperation, ValueMap},
        settings::LedgerSettings,
    };
    use ledger_core::{clock::ManualClock, traits::ChangeStore, ChangeTrail};

    use super::{diff_states, AuditableEntity, EntityAuditHelper, ValueChange};
    use crate::context::{RequestContext, SYSTEM_ACTOR};

    // ── Helpers ───────────────────────────────────────────────────────────────

    struct Invoice {
        id: String,
        status: String,
        amount: i64,
    }

    impl AuditableEntity for Invoice {
        fn entity_type(&self) -> String {
            "INVOICE".into()
        }
        fn entity_id(&self) -> Option<String> {
            Some(self.id.clone())
        }
        fn audit_state(&self) -> ValueMap {
            map(json!({ "status": self.status, "amount": self.amount }))
        }
        fn table_name(&self) -> Option<String> {
            Some("billing.invoice".into())
        }
        fn change_summary(
            &self,
            operation: EntityOperation,
            _old: Option<&ValueMap>,
            _new: Option<&ValueMap>,
        ) -> Option<String> {
            Some(format!("{} invoice {}", operation, self.id))
        }
    }

    fn map(value: Value) -> ValueMap {
        match value {
            Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    fn helper(enabled: bool) -> (EntityAuditHelper, Arc<InMemoryLedger>) {
        let mut settings = LedgerSettings::entity();
        settings.enabled = enabled;
        let store = Arc::new(InMemoryLedger::new());
        let trail = ChangeTrail::new(
            store.clone(),
            Arc::new(Sha2HashEngine::new(&settings)),
            Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).unwrap())),
        );
        (EntityAuditHelper::new(Arc::new(trail), &settings), store)
    }

    fn invoice(status: &str) -> Invoice {
        Invoice {
            id: "inv-1".into(),
            status: status.into(),
            amount: 120,
        }
    }

    // ── Diffing ───────────────────────────────────────────────────────────────

    #[test]
    fn diff_keeps_only_changed_fields() {
        let before = map(json!({ "status": "PENDING", "amount": 120, "note": "x" }));
        let after = map(json!({ "status": "PAID", "amount": 120, "paid_by": "alice" }));
        let (old, new) = diff_states(&before, &after);

        assert_eq!(old, map(json!({ "status": "PENDING", "note": "x", "paid_by": null })));
        assert_eq!(new, map(json!({ "status": "PAID", "note": null, "paid_by": "alice" })));
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    #[test]
    fn entity_lifecycle_lands_on_one_chain() {
        let (helper, store) = helper(true);
        let ctx = RequestContext::system();

        let created = helper
            .record_entity(&ctx, &invoice("PENDING"), EntityOperation::Create, None)
            .unwrap()
            .unwrap();
        let before = invoice("PENDING").audit_state();
        let updated = helper
            .record_entity(&ctx, &invoice("PAID"), EntityOperation::Update, Some(&before))
            .unwrap()
            .unwrap();
        assert_eq!(updated.record_number, created.record_number);
        assert_eq!(updated.prev_hash, created.hash);

        let chain = store.load_chain(&created.record_number).unwrap();
        assert_eq!(chain[0].old_values, None);
        assert_eq!(chain[0].new_values, Some(invoice("PENDING").audit_state()));
        assert_eq!(chain[1].old_values, Some(map(json!({ "status": "PENDING" }))));
        assert_eq!(chain[1].new_values, Some(map(json!({ "status": "PAID" }))));
        assert_eq!(chain[1].change_summary.as_deref(), Some("UPDATE invoice inv-1"));
        assert_eq!(chain[1].performed_by.as_deref(), Some(SYSTEM_ACTOR));

        let metadata = chain[1].metadata.as_ref().unwrap();
        assert_eq!(metadata["tableName"], json!("billing.invoice"));
        assert!(metadata["entityClass"].as_str().unwrap().ends_with("Invoice"));
    }

    #[test]
    fn no_op_update_records_nothing() {
        let (helper, store) = helper(true);
        let before = invoice("PAID").audit_state();
        let receipt = helper
            .record_entity(&RequestContext::system(), &invoice("PAID"), EntityOperation::Update, Some(&before))
            .unwrap();
        assert!(receipt.is_none());
        assert_eq!(store.change_count(), 0);
    }

    #[test]
    fn delete_records_old_state_only() {
        let (helper, store) = helper(true);
        let receipt = helper
            .record_entity(&RequestContext::system(), &invoice("VOID"), EntityOperation::Delete, None)
            .unwrap()
            .unwrap();
        let chain = store.load_chain(&receipt.record_number).unwrap();
        assert_eq!(chain[0].old_values, Some(invoice("VOID").audit_state()));
        assert_eq!(chain[0].new_values, None);
        assert_eq!(chain[0].operation, "DELETE");
    }

    // ── Value changes and context ─────────────────────────────────────────────

    #[test]
    fn value_change_is_keyed_by_field() {
        let (helper, store) = helper(true);
        let ctx = RequestContext::from_http(Some("10.0.0.1"), [("Referer", "https://admin")]).with_actor("ops");
        let receipt = helper
            .record_value_change(
                &ctx,
                ValueChange {
                    entity_type: "ACCOUNT".into(),
                    entity_id: "acc-9".into(),
                    operation: "UPDATE".into(),
                    field: Some("limit".into()),
                    old_value: json!(100),
                    new_value: json!(250),
                    ..ValueChange::default()
                },
            )
            .unwrap()
            .unwrap();

        let entry = &store.load_chain(&receipt.record_number).unwrap()[0];
        assert_eq!(entry.old_values, Some(map(json!({ "limit": 100 }))));
        assert_eq!(entry.new_values, Some(map(json!({ "limit": 250 }))));
        assert_eq!(entry.performed_by.as_deref(), Some("ops"));
        assert_eq!(entry.client_ip.as_deref(), Some("10.0.0.1"));
        let metadata = entry.metadata.as_ref().unwrap();
        assert_eq!(metadata["field"], json!("limit"));
        assert_eq!(metadata["referer"], json!("https://admin"));
    }

    #[test]
    fn unnamed_value_change_uses_value_key() {
        let (helper, store) = helper(true);
        let receipt = helper
            .record_value_change(
                &RequestContext::system(),
                ValueChange {
                    entity_type: "FLAG".into(),
                    entity_id: "f".into(),
                    operation: "UPDATE".into(),
                    old_value: json!(false),
                    new_value: json!(true),
                    ..ValueChange::default()
                },
            )
            .unwrap()
            .unwrap();
        let entry = &store.load_chain(&receipt.record_number).unwrap()[0];
        assert_eq!(entry.new_values, Some(map(json!({ "value": true }))));
        assert_eq!(entry.metadata, None);
    }

    #[test]
    fn explicit_performer_and_trace_are_kept() {
        let (helper, store) = helper(true);
        let mut request = ChangeRequest::new("ORDER", "o-1", "CREATE");
        request.performed_by = Some("importer".into());
        request.trace_id = Some("batch-42".into());
        let receipt = helper
            .record_change(&RequestContext::system().with_actor("alice"), request)
            .unwrap()
            .unwrap();

        let entry = &store.load_chain(&receipt.record_number).unwrap()[0];
        assert_eq!(entry.performed_by.as_deref(), Some("importer"));
        assert_eq!(entry.trace_id.as_deref(), Some("batch-42"));
    }

    #[test]
    fn disabled_ledger_records_nothing() {
        let (helper, store) = helper(false);
        let receipt = helper
            .record_entity(&RequestContext::system(), &invoice("PENDING"), EntityOperation::Create, None)
            .unwrap();
        assert!(receipt.is_none());
        assert_eq!(store.change_count(), 0);
    }
}
