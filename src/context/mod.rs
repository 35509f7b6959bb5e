//! Structured context that follows a logical unit of work.
//!
//! A [`LogContext`] is a small map of caller-defined keys (request id,
//! tenant, feature flags...) that every record emitted inside the unit of
//! work carries. Where the context lives depends on the runtime:
//!
//! - [`TaskLocalContext`]: tokio task-local storage. Context follows the
//!   task across `.await` points and concurrent tasks never see each other's
//!   values. Default for server processes.
//! - [`CooperativeContext`]: one mutable slot. Degraded mode for
//!   single-threaded cooperative hosts; see its docs for the interleaving
//!   limitation.
//! - [`RequestContext`]: one slot per inbound request, for one-shot
//!   executions that own their whole lifetime.
//!
//! All three implement [`ContextStore`], which is the only thing the rest of
//! the crate depends on.

mod propagation;
mod slot;
mod task_local;

pub use propagation::{extract, inject, HeaderCarrier, PROPAGATION_HEADERS};
pub use slot::{CooperativeContext, RequestContext};
pub use task_local::TaskLocalContext;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Well-known context keys.
pub mod keys {
    pub const REQUEST_ID: &str = "request_id";
    pub const TRACE_ID: &str = "trace_id";
    pub const CORRELATION_ID: &str = "correlation_id";
    pub const USER_ID: &str = "user_id";
    pub const TENANT_ID: &str = "tenant_id";
    pub const SOURCE: &str = "source";
    pub const ACTION: &str = "action";
    pub const COMPONENT: &str = "component";
    pub const TAGS: &str = "tags";
    pub const FEATURE_FLAGS: &str = "feature_flags";

    pub const ALL: [&str; 10] = [
        REQUEST_ID,
        TRACE_ID,
        CORRELATION_ID,
        USER_ID,
        TENANT_ID,
        SOURCE,
        ACTION,
        COMPONENT,
        TAGS,
        FEATURE_FLAGS,
    ];

    pub fn is_well_known(key: &str) -> bool {
        ALL.contains(&key)
    }
}

/// Mergeable key/value context attached to every record of a unit of work.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogContext(BTreeMap<String, Value>);

impl LogContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Merge `partial` into `self`. Keys present in `partial` win.
    pub fn merge(&mut self, partial: LogContext) {
        self.0.extend(partial.0);
    }

    /// Non-mutating variant of [`merge`](Self::merge).
    pub fn merged(&self, partial: &LogContext) -> LogContext {
        let mut out = self.clone();
        out.0
            .extend(partial.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        out
    }

    pub fn with_request_id(self, id: impl Into<String>) -> Self {
        self.with(keys::REQUEST_ID, id.into())
    }

    pub fn with_trace_id(self, id: impl Into<String>) -> Self {
        self.with(keys::TRACE_ID, id.into())
    }

    pub fn with_correlation_id(self, id: impl Into<String>) -> Self {
        self.with(keys::CORRELATION_ID, id.into())
    }

    pub fn with_user_id(self, id: impl Into<String>) -> Self {
        self.with(keys::USER_ID, id.into())
    }

    pub fn with_tenant_id(self, id: impl Into<String>) -> Self {
        self.with(keys::TENANT_ID, id.into())
    }

    pub fn with_source(self, source: impl Into<String>) -> Self {
        self.with(keys::SOURCE, source.into())
    }

    pub fn with_action(self, action: impl Into<String>) -> Self {
        self.with(keys::ACTION, action.into())
    }

    pub fn with_component(self, component: impl Into<String>) -> Self {
        self.with(keys::COMPONENT, component.into())
    }

    pub fn with_tags<I, S>(self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tags: Vec<Value> = tags.into_iter().map(|t| Value::String(t.into())).collect();
        self.with(keys::TAGS, Value::Array(tags))
    }

    /// Set one feature flag, keeping the others already present.
    pub fn with_feature_flag(mut self, name: impl Into<String>, enabled: bool) -> Self {
        let entry = self
            .0
            .entry(keys::FEATURE_FLAGS.to_string())
            .or_insert_with(|| Value::Object(Default::default()));
        if !entry.is_object() {
            *entry = Value::Object(Default::default());
        }
        if let Value::Object(flags) = entry {
            flags.insert(name.into(), Value::Bool(enabled));
        }
        self
    }

    pub fn request_id(&self) -> Option<&str> {
        self.get_str(keys::REQUEST_ID)
    }

    pub fn trace_id(&self) -> Option<&str> {
        self.get_str(keys::TRACE_ID)
    }

    pub fn user_id(&self) -> Option<&str> {
        self.get_str(keys::USER_ID)
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.get_str(keys::TENANT_ID)
    }

    pub fn tags(&self) -> Vec<&str> {
        match self.0.get(keys::TAGS) {
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        }
    }

    pub(crate) fn into_inner(self) -> BTreeMap<String, Value> {
        self.0
    }

    pub(crate) fn from_inner(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for LogContext {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Execution model a store was built for. Stamped on every record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Runtime {
    /// Multi-threaded process with task-local storage.
    #[default]
    Server,
    /// Single-threaded cooperative host.
    Browser,
    /// One execution per inbound request.
    Edge,
}

impl Runtime {
    pub fn as_str(self) -> &'static str {
        match self {
            Runtime::Server => "server",
            Runtime::Browser => "browser",
            Runtime::Edge => "edge",
        }
    }
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Common contract of the three context stores.
///
/// `merge`, `get` and `clear` never fail. `scope` runs `f` with the current
/// context extended by `partial` and restores the previous context when `f`
/// returns or unwinds. Async scoping is provided by each store as an
/// inherent `scope_async` method, since the way a context crosses `.await`
/// points is exactly what differs between them.
pub trait ContextStore: Send + Sync {
    /// Merge `partial` into the context of the current unit of work only.
    fn merge(&self, partial: LogContext);

    /// Snapshot of the current context, or an empty one.
    fn get(&self) -> LogContext;

    fn clear(&self);

    fn runtime(&self) -> Runtime;

    fn scope<R, F>(&self, partial: LogContext, f: F) -> R
    where
        F: FnOnce() -> R,
        Self: Sized;
}
