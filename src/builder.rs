use crate::categorize::{categorize_error, fingerprint_error, known_code_message};
use crate::context::{keys, ContextStore};
use crate::level::LogLevel;
use crate::record::{CallSite, ErrorInfo, LogRecord, SerializedError};
use crate::sanitize::{to_safe_value, Sanitizer};
use crate::session::SessionIdentity;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Explicit call-site fields.
pub type Fields = BTreeMap<String, Value>;

/// Everything the call site provides for one record.
#[derive(Debug, Clone)]
pub struct RecordDraft {
    pub level: LogLevel,
    pub message: String,
    pub fields: Fields,
    pub error: Option<ErrorInfo>,
    pub location: Option<CallSite>,
}

impl RecordDraft {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        RecordDraft {
            level,
            message: message.into(),
            fields: Fields::new(),
            error: None,
            location: None,
        }
    }

    /// Add one field. Values that cannot be serialized are kept as a
    /// placeholder.
    pub fn field<T: Serialize + ?Sized>(mut self, key: impl Into<String>, value: &T) -> Self {
        self.fields.insert(key.into(), to_safe_value(value));
        self
    }

    pub fn fields(mut self, fields: Fields) -> Self {
        self.fields.extend(fields);
        self
    }

    pub fn error(mut self, error: ErrorInfo) -> Self {
        self.error = Some(error);
        self
    }

    pub fn location(mut self, location: CallSite) -> Self {
        self.location = Some(location);
        self
    }
}

/// Turns a [`RecordDraft`] plus the current context into a [`LogRecord`].
///
/// Sits on the hot path of every log call: no I/O beyond the session id
/// lookup (cached after the first call) and no panics for any input.
pub struct RecordBuilder {
    session: Arc<SessionIdentity>,
    sanitizer: Sanitizer,
}

impl RecordBuilder {
    pub fn new(session: Arc<SessionIdentity>, sanitizer: Sanitizer) -> Self {
        RecordBuilder { session, sanitizer }
    }

    pub fn session(&self) -> &Arc<SessionIdentity> {
        &self.session
    }

    /// Build the record.
    ///
    /// The context is snapshotted from `store`. An explicit field whose key
    /// is already in the context, or is one of the well-known context keys,
    /// overrides the context value; every other field lands in `metadata`.
    pub fn build(&self, store: &dyn ContextStore, draft: RecordDraft) -> LogRecord {
        let mut context = store.get();
        let mut metadata = BTreeMap::new();
        for (key, value) in draft.fields {
            if context.contains_key(&key) || keys::is_well_known(&key) {
                context.insert(key, value);
            } else {
                metadata.insert(key, value);
            }
        }

        let error = draft.error.map(serialize_error);

        let record = LogRecord {
            timestamp: Utc::now(),
            level: draft.level,
            message: draft.message,
            context,
            metadata,
            error,
            session_id: self.session.get_or_create(),
            runtime: store.runtime(),
            location: draft.location,
        };
        self.sanitizer.scrub(record)
    }
}

/// Categorize and fingerprint before scrubbing, so grouping is computed on
/// the original text.
fn serialize_error(error: ErrorInfo) -> SerializedError {
    let category = categorize_error(&error, None, None);
    let fingerprint = fingerprint_error(&error);
    let hint = error
        .code
        .as_deref()
        .and_then(known_code_message)
        .map(str::to_string);
    SerializedError {
        name: error.name,
        message: error.message,
        stack: error.stack,
        code: error.code,
        status_code: error.status_code,
        category,
        fingerprint,
        hint,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categorize::ErrorCategory;
    use crate::context::{CooperativeContext, LogContext, Runtime};
    use crate::sanitize::{SanitizerConfig, REDACTED};
    use crate::session::SessionStorage;

    fn builder() -> RecordBuilder {
        RecordBuilder::new(
            Arc::new(SessionIdentity::new(SessionStorage::Memory)),
            Sanitizer::new(&SanitizerConfig::default()).expect("sanitizer"),
        )
    }

    #[test]
    fn explicit_fields_win_over_context() {
        let store = CooperativeContext::new();
        store.merge(LogContext::new().with_request_id("ctx").with_user_id("u1"));
        let record = builder().build(
            &store,
            RecordDraft::new(LogLevel::Info, "hello")
                .field("request_id", "explicit")
                .field("tenant_id", "t9")
                .field("order", &42),
        );
        assert_eq!(record.context.request_id(), Some("explicit"));
        assert_eq!(record.context.user_id(), Some("u1"));
        assert_eq!(record.context.tenant_id(), Some("t9"));
        assert_eq!(record.metadata["order"], 42);
        assert_eq!(record.runtime, Runtime::Browser);
        // The store itself is not touched.
        assert_eq!(store.get().request_id(), Some("ctx"));
    }

    #[test]
    fn errors_are_categorized_and_fingerprinted() {
        let store = CooperativeContext::new();
        let record = builder().build(
            &store,
            RecordDraft::new(LogLevel::Error, "insert failed")
                .error(ErrorInfo::new("PostgrestError", "duplicate key value").with_code("23505")),
        );
        let error = record.error.expect("error attached");
        assert_eq!(error.category, ErrorCategory::Validation);
        assert_eq!(error.fingerprint.len(), 16);
        assert_eq!(error.hint.as_deref(), Some("Unique constraint violation"));
    }

    #[test]
    fn records_without_error_skip_categorization() {
        let record = builder().build(&CooperativeContext::new(), RecordDraft::new(LogLevel::Debug, "x"));
        assert!(record.error.is_none());
    }

    #[test]
    fn output_is_scrubbed() {
        let record = builder().build(
            &CooperativeContext::new(),
            RecordDraft::new(LogLevel::Warn, "login for bob@example.com")
                .field("password", "hunter2"),
        );
        assert_eq!(record.message, format!("login for {}", REDACTED));
        assert_eq!(record.metadata["password"], REDACTED);
    }

    #[test]
    fn session_id_is_stable_across_records() {
        let b = builder();
        let store = CooperativeContext::new();
        let first = b.build(&store, RecordDraft::new(LogLevel::Info, "a"));
        let second = b.build(&store, RecordDraft::new(LogLevel::Info, "b"));
        assert_eq!(first.session_id, second.session_id);
    }
}
