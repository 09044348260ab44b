//! Auditing of application calls.
//!
//! A [`CallAudit`] describes how to turn one kind of call into an action
//! event: a fixed action and resource type plus closures that pull the
//! resource id and value maps out of the call's arguments. [`CallAudit::run`]
//! executes the call and records its outcome:
//!
//! - success → `SUCCESS`, the serialized return value under `details.result`
//! - failure → `FAILURE`, the error message under `details.error`
//!
//! The call's own result is handed back unchanged inside the `Ok` of the
//! outer `LedgerResult`; an `Err` there means the audit event could not be
//! recorded, including a success value that cannot be encoded as JSON.

use std::fmt::Display;

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use ledger_contracts::{
    entry::ActionReceipt,
    error::{LedgerError, LedgerResult},
    request::ValueMap,
};

use crate::{
    action::{ActionAuditHelper, ActionEvent, RESULT_KEY},
    context::RequestContext,
};

pub const SUCCESS: &str = "SUCCESS";
pub const FAILURE: &str = "FAILURE";
pub const ERROR_KEY: &str = "error";

type Extract<A, T> = Box<dyn Fn(&A) -> Option<T> + Send + Sync>;

/// How to audit calls taking arguments of type `A`.
pub struct CallAudit<A> {
    action: String,
    resource_type: String,
    resource_id: Option<Extract<A, String>>,
    details: Option<Extract<A, ValueMap>>,
    old_values: Option<Extract<A, ValueMap>>,
    new_values: Option<Extract<A, ValueMap>>,
}

impl<A> CallAudit<A> {
    pub fn new(action: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            resource_type: resource_type.into(),
            resource_id: None,
            details: None,
            old_values: None,
            new_values: None,
        }
    }

    pub fn resource_id(mut self, f: impl Fn(&A) -> Option<String> + Send + Sync + 'static) -> Self {
        self.resource_id = Some(Box::new(f));
        self
    }

    /// Extra details merged over the `result` / `error` entry.
    pub fn details(mut self, f: impl Fn(&A) -> Option<ValueMap> + Send + Sync + 'static) -> Self {
        self.details = Some(Box::new(f));
        self
    }

    pub fn old_values(mut self, f: impl Fn(&A) -> Option<ValueMap> + Send + Sync + 'static) -> Self {
        self.old_values = Some(Box::new(f));
        self
    }

    pub fn new_values(mut self, f: impl Fn(&A) -> Option<ValueMap> + Send + Sync + 'static) -> Self {
        self.new_values = Some(Box::new(f));
        self
    }

    /// Run `call` with `args` and record the outcome through `helper`.
    pub fn run<T, E, F>(
        &self,
        helper: &ActionAuditHelper,
        ctx: &RequestContext,
        args: &A,
        call: F,
    ) -> LedgerResult<Result<T, E>>
    where
        T: Serialize,
        E: Display,
        F: FnOnce(&A) -> Result<T, E>,
    {
        let result = call(args);
        self.record(helper, ctx, args, &result)?;
        Ok(result)
    }

    /// Record the outcome of a call that has already run.
    ///
    /// # Errors
    ///
    /// `Serialization` when a success value cannot be encoded; nothing is
    /// recorded in that case.
    pub fn record<T, E>(
        &self,
        helper: &ActionAuditHelper,
        ctx: &RequestContext,
        args: &A,
        result: &Result<T, E>,
    ) -> LedgerResult<Option<ActionReceipt>>
    where
        T: Serialize,
        E: Display,
    {
        let mut details = ValueMap::new();
        let outcome = match result {
            Ok(value) => {
                let json = serde_json::to_value(value).map_err(|e| {
                    warn!(action = %self.action, error = %e, "call result is not serializable");
                    LedgerError::Serialization {
                        reason: format!("result of {} call: {}", self.action, e),
                    }
                })?;
                if !json.is_null() {
                    details.insert(RESULT_KEY.to_string(), json);
                }
                SUCCESS
            }
            Err(err) => {
                details.insert(ERROR_KEY.to_string(), Value::String(err.to_string()));
                FAILURE
            }
        };
        if let Some(extra) = self.details.as_ref().and_then(|f| f(args)) {
            details.extend(extra);
        }

        let event = ActionEvent {
            action: self.action.clone(),
            resource_type: self.resource_type.clone(),
            resource_id: self.resource_id.as_ref().and_then(|f| f(args)),
            outcome: outcome.to_string(),
            details: Some(details),
            old_values: self.old_values.as_ref().and_then(|f| f(args)),
            new_values: self.new_values.as_ref().and_then(|f| f(args)),
        };
        helper.record(ctx, event)
    }
}
