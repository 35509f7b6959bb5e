use crate::builder::{Fields, RecordDraft};
use crate::level::LogLevel;
use crate::logger::Logger;
use crate::record::{CallSite, ErrorInfo};
use serde_json::Value;
use std::error::Error;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Event field naming a domain level that `tracing` has no macro for.
///
/// ```ignore
/// tracing::info!(log.kind = "user_action", "clicked checkout");
/// ```
pub const KIND_FIELD: &str = "log.kind";

/// `tracing_subscriber` layer that turns every event into a record and
/// hands it to a [`Logger`].
///
/// Events emitted by this crate itself are ignored, so a persister that
/// logs through `tracing` cannot feed its own output back into the queue.
pub struct FanoutLayer {
    logger: Logger,
    /// Total events seen by the layer.
    pub total_events: Arc<AtomicU64>,
}

impl FanoutLayer {
    pub fn new(logger: Logger) -> Self {
        FanoutLayer {
            logger,
            total_events: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }
}

impl<S> Layer<S> for FanoutLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if meta.target().starts_with(env!("CARGO_CRATE_NAME")) {
            return;
        }
        self.total_events.fetch_add(1, Ordering::Relaxed);

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let level = visitor
            .kind
            .as_deref()
            .and_then(|kind| kind.parse().ok())
            .unwrap_or_else(|| LogLevel::from(meta.level()));

        let mut draft = RecordDraft::new(level, visitor.message.unwrap_or_default())
            .fields(visitor.fields)
            .location(CallSite {
                target: meta.target().to_string(),
                module_path: meta.module_path().map(str::to_string),
                file: meta.file().map(str::to_string),
                line: meta.line(),
            });
        if let Some(error) = visitor.error {
            draft = draft.error(error);
        }
        self.logger.log(draft);
    }
}

/// Collects an event's fields. `message` becomes the record message,
/// [`KIND_FIELD`] the level override and the first error-typed field the
/// attached error.
#[derive(Default)]
pub struct FieldVisitor {
    pub fields: Fields,
    pub message: Option<String>,
    pub kind: Option<String>,
    pub error: Option<ErrorInfo>,
}

impl FieldVisitor {
    fn insert(&mut self, field: &Field, value: Value) {
        self.fields.insert(field.name().to_string(), value);
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = Some(value.to_string()),
            KIND_FIELD => self.kind = Some(value.to_string()),
            _ => self.insert(field, Value::String(value.to_string())),
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::from(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn Error + 'static)) {
        if self.error.is_none() {
            self.error = Some(ErrorInfo::from_error(value));
        } else {
            self.insert(field, Value::String(value.to_string()));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        match field.name() {
            "message" => self.message = Some(format!("{:?}", value)),
            KIND_FIELD => self.kind = Some(format!("{:?}", value).trim_matches('"').to_string()),
            _ => self.insert(field, Value::String(format!("{:?}", value))),
        }
    }
}
