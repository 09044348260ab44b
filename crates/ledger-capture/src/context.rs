//! Per-call context that capture helpers copy into requests.
//!
//! A `RequestContext` carries what an inbound call knows about who is acting
//! and where the call came from. Every field is optional; helpers fall back
//! to [`SYSTEM_ACTOR`] for the actor and a fresh UUID for the trace id.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ledger_contracts::request::has_text;

/// Actor recorded when no authenticated principal is known.
pub const SYSTEM_ACTOR: &str = "SYSTEM";

pub const USER_AGENT_HEADER: &str = "user-agent";
pub const REFERER_HEADER: &str = "referer";
pub const REQUESTED_WITH_HEADER: &str = "x-requested-with";
pub const CLIENT_SOURCE_HEADER: &str = "x-client-source";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    /// The authenticated principal, if any.
    pub actor: Option<String>,
    pub trace_id: Option<String>,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    pub requested_with: Option<String>,
    pub client_source: Option<String>,
}

impl RequestContext {
    /// A context with nothing known, as for background jobs.
    pub fn system() -> Self {
        Self::default()
    }

    /// Build a context from a remote address and HTTP headers.
    ///
    /// Header names are matched case-insensitively; unknown headers are
    /// ignored and blank values are dropped.
    pub fn from_http<'a>(
        client_ip: Option<&str>,
        headers: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        let mut ctx = Self {
            client_ip: non_blank(client_ip),
            ..Self::default()
        };
        for (name, value) in headers {
            let slot = match name.to_ascii_lowercase().as_str() {
                USER_AGENT_HEADER => &mut ctx.user_agent,
                REFERER_HEADER => &mut ctx.referer,
                REQUESTED_WITH_HEADER => &mut ctx.requested_with,
                CLIENT_SOURCE_HEADER => &mut ctx.client_source,
                _ => continue,
            };
            *slot = non_blank(Some(value));
        }
        ctx
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// The actor to record: the principal, or `SYSTEM`.
    pub fn resolve_actor(&self) -> String {
        non_blank(self.actor.as_deref()).unwrap_or_else(|| SYSTEM_ACTOR.to_string())
    }

    /// The trace id to record: the caller's, or a new UUID v4.
    pub fn resolve_trace_id(&self) -> String {
        non_blank(self.trace_id.as_deref()).unwrap_or_else(|| Uuid::new_v4().to_string())
    }
}

pub(crate) fn non_blank(value: Option<&str>) -> Option<String> {
    value.filter(|v| has_text(Some(v))).map(str::to_string)
}
