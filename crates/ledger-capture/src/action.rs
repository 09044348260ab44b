//! Action capture helper.
//!
//! `ActionAuditHelper` builds an `ActionRequest` from a call's context and
//! records it on the global action chain. When the ledger is disabled in
//! settings, nothing is recorded and `Ok(None)` is returned.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use ledger_audit::DigestAlgorithm;
use ledger_contracts::{
    entry::ActionReceipt,
    error::LedgerResult,
    request::{has_text, ActionRequest, ValueMap},
    settings::LedgerSettings,
};
use ledger_core::ActionTrail;

use crate::context::RequestContext;

/// Details key whose value is digested into `responseHash`.
pub const RESULT_KEY: &str = "result";

pub struct ActionAuditHelper {
    trail: Arc<ActionTrail>,
    enabled: bool,
}

/// The fields of one action event, before context defaults are applied.
#[derive(Debug, Clone, Default)]
pub struct ActionEvent {
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub outcome: String,
    pub details: Option<ValueMap>,
    pub old_values: Option<ValueMap>,
    pub new_values: Option<ValueMap>,
}

impl ActionAuditHelper {
    pub fn new(trail: Arc<ActionTrail>, settings: &LedgerSettings) -> Self {
        Self {
            trail,
            enabled: settings.enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record `event` with actor, trace id and HTTP fields taken from `ctx`.
    pub fn record(&self, ctx: &RequestContext, event: ActionEvent) -> LedgerResult<Option<ActionReceipt>> {
        if !self.enabled {
            debug!(action = %event.action, "action ledger disabled, skipping");
            return Ok(None);
        }
        let request = build_request(ctx, event);
        self.trail.record_event(request).map(Some)
    }

    /// Record a fully built request, filling only the fields it leaves blank.
    pub fn record_request(
        &self,
        ctx: &RequestContext,
        mut request: ActionRequest,
    ) -> LedgerResult<Option<ActionReceipt>> {
        if !self.enabled {
            return Ok(None);
        }
        apply_context(ctx, &mut request);
        if request.response_hash.is_none() {
            request.response_hash = request.details.as_ref().and_then(response_hash);
        }
        self.trail.record_event(request).map(Some)
    }
}

fn build_request(ctx: &RequestContext, event: ActionEvent) -> ActionRequest {
    let details = event.details.filter(|d| !d.is_empty());
    let response_hash = details.as_ref().and_then(response_hash);
    let mut request = ActionRequest {
        action: event.action,
        resource_type: event.resource_type,
        resource_id: event.resource_id,
        outcome: event.outcome,
        details,
        old_values: event.old_values,
        new_values: event.new_values,
        response_hash,
        ..ActionRequest::default()
    };
    apply_context(ctx, &mut request);
    request
}

fn apply_context(ctx: &RequestContext, request: &mut ActionRequest) {
    if !has_text(Some(&request.user_id)) {
        request.user_id = ctx.resolve_actor();
    }
    if !has_text(Some(&request.trace_id)) {
        request.trace_id = ctx.resolve_trace_id();
    }
    fill(&mut request.client_ip, &ctx.client_ip);
    fill(&mut request.user_agent, &ctx.user_agent);
    fill(&mut request.referer, &ctx.referer);
    fill(&mut request.requested_with, &ctx.requested_with);
    fill(&mut request.client_source, &ctx.client_source);
}

fn fill(slot: &mut Option<String>, from: &Option<String>) {
    if slot.is_none() {
        slot.clone_from(from);
    }
}

/// SHA-256 of the JSON encoding of `details["result"]`, if present.
pub fn response_hash(details: &ValueMap) -> Option<String> {
    let result: &Value = details.get(RESULT_KEY)?;
    let bytes = serde_json::to_vec(result).ok()?;
    Some(DigestAlgorithm::Sha256.hex_digest(&bytes))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use serde_json::json;

    use ledger_audit::{DigestAlgorithm, InMemoryLedger, Sha2HashEngine};
    use ledger_contracts::{
        request::{ActionRequest, ValueMap},
        settings::LedgerSettings,
    };
    use ledger_core::{clock::ManualClock, traits::ActionStore, ActionTrail};

    use super::{response_hash, ActionAuditHelper, ActionEvent};
    use crate::context::{RequestContext, SYSTEM_ACTOR};

    fn helper(settings: &LedgerSettings) -> (ActionAuditHelper, Arc<InMemoryLedger>) {
        let store = Arc::new(InMemoryLedger::new());
        let trail = ActionTrail::new(
            store.clone(),
            Arc::new(Sha2HashEngine::new(settings)),
            Arc::new(ManualClock::new(Utc::now())),
        );
        (ActionAuditHelper::new(Arc::new(trail), settings), store)
    }

    fn event(details: Option<ValueMap>) -> ActionEvent {
        ActionEvent {
            action: "EXPORTED".into(),
            resource_type: "REPORT".into(),
            resource_id: Some("r-1".into()),
            outcome: "SUCCESS".into(),
            details,
            ..ActionEvent::default()
        }
    }

    #[test]
    fn defaults_actor_and_trace_id() {
        let (helper, store) = helper(&LedgerSettings::action());
        helper.record(&RequestContext::system(), event(None)).unwrap().unwrap();

        let entry = &ActionStore::load_chain(store.as_ref()).unwrap()[0];
        assert_eq!(entry.user_id, SYSTEM_ACTOR);
        assert_eq!(entry.trace_id.len(), 36);
        assert_eq!(entry.details, None);
    }

    #[test]
    fn copies_http_fields_and_principal() {
        let (helper, store) = helper(&LedgerSettings::action());
        let ctx = RequestContext::from_http(
            Some("192.0.2.10"),
            [("User-Agent", "curl/8"), ("Referer", "https://app"), ("X-Requested-With", "XMLHttpRequest")],
        )
        .with_actor("alice")
        .with_trace_id("TRACE-7");
        helper.record(&ctx, event(None)).unwrap();

        let entry = &ActionStore::load_chain(store.as_ref()).unwrap()[0];
        assert_eq!(entry.user_id, "alice");
        assert_eq!(entry.trace_id, "TRACE-7");
        assert_eq!(entry.client_ip.as_deref(), Some("192.0.2.10"));
        assert_eq!(entry.user_agent.as_deref(), Some("curl/8"));
        assert_eq!(entry.referer.as_deref(), Some("https://app"));
        assert_eq!(entry.requested_with.as_deref(), Some("XMLHttpRequest"));
    }

    #[test]
    fn result_detail_is_digested_into_response_hash() {
        let mut details = ValueMap::new();
        details.insert("result".into(), json!({ "rows": 3 }));
        let expected = DigestAlgorithm::Sha256.hex_digest(br#"{"rows":3}"#);
        assert_eq!(response_hash(&details).as_deref(), Some(expected.as_str()));

        let (helper, store) = helper(&LedgerSettings::action());
        helper.record(&RequestContext::system(), event(Some(details))).unwrap();
        let entry = &ActionStore::load_chain(store.as_ref()).unwrap()[0];
        assert_eq!(entry.response_hash.as_deref(), Some(expected.as_str()));

        assert_eq!(response_hash(&ValueMap::new()), None);
    }

    #[test]
    fn explicit_request_fields_win_over_context() {
        let (helper, store) = helper(&LedgerSettings::action());
        let mut request = ActionRequest::new("T-1", "bob", "DELETED", "USER", "SUCCESS");
        request.client_ip = Some("10.1.1.1".into());
        let ctx = RequestContext::from_http(Some("10.9.9.9"), Vec::<(&str, &str)>::new()).with_actor("alice");
        helper.record_request(&ctx, request).unwrap();

        let entry = &ActionStore::load_chain(store.as_ref()).unwrap()[0];
        assert_eq!(entry.user_id, "bob");
        assert_eq!(entry.client_ip.as_deref(), Some("10.1.1.1"));
    }

    #[test]
    fn disabled_ledger_records_nothing() {
        let mut settings = LedgerSettings::action();
        settings.enabled = false;
        let (helper, store) = helper(&settings);

        assert!(helper.record(&RequestContext::system(), event(None)).unwrap().is_none());
        assert_eq!(store.action_count(), 0);
    }
}
