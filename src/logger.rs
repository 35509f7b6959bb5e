//! The call-site facing logger: sampler gate, record builder, dispatcher.

use crate::builder::{RecordBuilder, RecordDraft};
use crate::context::{
    ContextStore, CooperativeContext, HeaderCarrier, LogContext, RequestContext, Runtime,
    TaskLocalContext,
};
use crate::destination::{
    ConsoleFormat, ConsoleSink, Destination, DestinationStats, Dispatcher, Route,
};
use crate::error::ConfigError;
use crate::init::{Environment, LoggerConfig};
use crate::level::LogLevel;
use crate::persist::Persist;
use crate::queue::{BatchQueue, FailureHook, QueueStats};
use crate::record::ErrorInfo;
use crate::sampler::Sampler;
use crate::sanitize::Sanitizer;
use crate::session::SessionIdentity;
use serde::Serialize;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

/// Snapshot of the logger's counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoggerStats {
    /// Records suppressed by sampling.
    pub sampled_out: u64,
    pub destinations: Vec<DestinationStats>,
    /// `None` when the database destination is disabled.
    pub queue: Option<QueueStats>,
}

struct LoggerCore {
    environment: Environment,
    sampler: Sampler,
    builder: RecordBuilder,
    dispatcher: Dispatcher,
    shutdown_timeout: Duration,
}

/// Handle used by application code to emit records.
///
/// Cheap to clone. Clones share destinations, sampler and session; each
/// handle reads context from its own [`ContextStore`], see
/// [`with_context_store`](Self::with_context_store).
#[derive(Clone)]
pub struct Logger {
    core: Arc<LoggerCore>,
    context: Arc<dyn ContextStore>,
}

macro_rules! level_methods {
    ($($name:ident => $level:ident),* $(,)?) => {
        $(
            #[doc = concat!("Emit a `", stringify!($name), "` record.")]
            pub fn $name(&self, message: impl Into<String>) {
                self.log(RecordDraft::new(LogLevel::$level, message));
            }
        )*
    };
}

impl Logger {
    /// Validate `config` and build every enabled destination.
    ///
    /// `persist` is required when the database destination is enabled; that
    /// destination also needs a running tokio runtime for its flusher.
    pub fn new(config: LoggerConfig, persist: Option<Arc<dyn Persist>>) -> Result<Self, ConfigError> {
        config.validate()?;

        let session = Arc::new(SessionIdentity::new(config.session_storage()));
        // Warm the cache so the first record does no storage I/O.
        session.get_or_create();
        let sanitizer = Sanitizer::new(&config.sanitizer)?;
        let development = config.environment.is_development();

        let mut routes = Vec::new();
        let mut console = None;
        if config.console.enabled {
            let format = config.console.format.unwrap_or(if development {
                ConsoleFormat::Pretty
            } else {
                ConsoleFormat::Json
            });
            let sink = ConsoleSink::new(format, config.console.color);
            console = Some(sink.clone());
            routes.push(Route::new(Destination::Console(sink), config.console.min_level));
        }

        if config.file.enabled {
            #[cfg(feature = "file")]
            {
                let directory = config
                    .file
                    .directory
                    .as_deref()
                    .ok_or(ConfigError::MissingFileDirectory)?;
                let sink = crate::destination::FileSink::open(directory, &session.get_or_create())?;
                routes.push(Route::new(Destination::File(sink), config.file.min_level));
            }
            #[cfg(not(feature = "file"))]
            return Err(ConfigError::FileDestinationUnavailable);
        }

        if config.database.enabled {
            let persist = persist.ok_or(ConfigError::MissingPersist)?;
            let hook: Option<FailureHook> = match (development, console) {
                (true, Some(console)) => Some(Arc::new(move |message: &str| {
                    console.echo_failure(message)
                })),
                (true, None) => Some(Arc::new(|message: &str| {
                    eprintln!("[log-fanout] {}", message)
                })),
                (false, _) => None,
            };
            let queue = BatchQueue::spawn_with_hook(config.database.queue.clone(), persist, hook)?;
            routes.push(Route::new(Destination::Database(queue), config.database.min_level));
        }

        let context: Arc<dyn ContextStore> = match config.runtime {
            Runtime::Server => Arc::new(TaskLocalContext::new()),
            Runtime::Browser => Arc::new(CooperativeContext::new()),
            Runtime::Edge => Arc::new(RequestContext::new()),
        };

        Ok(Logger {
            core: Arc::new(LoggerCore {
                environment: config.environment,
                sampler: Sampler::new(&config.sampling),
                builder: RecordBuilder::new(session, sanitizer),
                dispatcher: Dispatcher::new(routes, development),
                shutdown_timeout: config.database.queue.shutdown_timeout,
            }),
            context,
        })
    }

    /// A handle sharing everything with `self` except the context store.
    pub fn with_context_store(&self, context: Arc<dyn ContextStore>) -> Logger {
        Logger {
            core: Arc::clone(&self.core),
            context,
        }
    }

    /// A handle for one inbound request, seeded from its propagation
    /// headers.
    pub fn for_request(&self, headers: &impl HeaderCarrier) -> Logger {
        self.with_context_store(Arc::new(RequestContext::from_headers(headers)))
    }

    pub fn context(&self) -> &Arc<dyn ContextStore> {
        &self.context
    }

    /// Merge into the current unit of work's context.
    pub fn merge_context(&self, partial: LogContext) {
        self.context.merge(partial);
    }

    pub fn environment(&self) -> Environment {
        self.core.environment
    }

    pub fn session_id(&self) -> String {
        self.core.builder.session().get_or_create()
    }

    /// Emit one record: sample, build, dispatch.
    pub fn log(&self, draft: RecordDraft) {
        let core = &self.core;
        if !core.sampler.should_emit(draft.level) {
            return;
        }
        let record = core.builder.build(&*self.context, draft);
        core.dispatcher.dispatch(Arc::new(record));
    }

    level_methods! {
        trace => Trace,
        debug => Debug,
        info => Info,
        notice => Notice,
        user_action => UserAction,
        success => Success,
        warn => Warn,
        failure => Failure,
        error => Error,
        fatal => Fatal,
    }

    /// Emit an `error` record carrying `err`, categorized and fingerprinted.
    pub fn log_error(&self, message: impl Into<String>, err: &(dyn Error + 'static)) {
        self.log(RecordDraft::new(LogLevel::Error, message).error(ErrorInfo::from_error(err)));
    }

    /// Ask the database queue to flush now instead of waiting for a trigger.
    pub fn flush(&self) {
        if let Some(queue) = self.core.dispatcher.queue() {
            queue.request_flush();
        }
    }

    pub fn stats(&self) -> LoggerStats {
        let dispatcher = &self.core.dispatcher;
        LoggerStats {
            sampled_out: self.core.sampler.sampled_out(),
            destinations: dispatcher.stats(),
            queue: dispatcher.queue().map(BatchQueue::stats),
        }
    }

    /// Drain the database queue within the configured shutdown timeout.
    pub async fn shutdown(&self) -> LoggerStats {
        self.core
            .dispatcher
            .shutdown(self.core.shutdown_timeout)
            .await;
        self.stats()
    }
}
