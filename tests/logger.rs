use std::error::Error;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing_log_fanout::categorize::ErrorCategory;
use tracing_log_fanout::session::SessionStorage;
use tracing_log_fanout::{
    ContextStore, Environment, LogContext, LogLevel, LogRecord, Logger, LoggerConfig, Persist,
    PersistError, RecordDraft, TaskLocalContext,
};

#[derive(Default)]
struct Recorder(Mutex<Vec<Arc<LogRecord>>>);

impl Recorder {
    fn messages(&self) -> Vec<String> {
        self.0.lock().iter().map(|r| r.message.clone()).collect()
    }
}

#[async_trait]
impl Persist for Recorder {
    async fn persist(&self, batch: &[Arc<LogRecord>]) -> Result<(), PersistError> {
        self.0.lock().extend(batch.iter().cloned());
        Ok(())
    }
}

struct AlwaysDown;

#[async_trait]
impl Persist for AlwaysDown {
    async fn persist(&self, _batch: &[Arc<LogRecord>]) -> Result<(), PersistError> {
        Err("connection refused".into())
    }
}

fn config() -> LoggerConfig {
    let mut config = LoggerConfig {
        environment: Environment::Test,
        session: Some(SessionStorage::Memory),
        ..LoggerConfig::default()
    };
    config.console.enabled = false;
    config.database.enabled = true;
    config.database.min_level = LogLevel::Trace;
    config
}

#[tokio::test(start_paused = true)]
async fn routes_respect_their_own_minimum_levels() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = config();
    config.file.enabled = true;
    config.file.directory = Some(dir.path().to_path_buf());
    config.file.min_level = LogLevel::Info;
    config.database.min_level = LogLevel::Warn;

    let recorder = Arc::new(Recorder::default());
    let logger = Logger::new(config, Some(recorder.clone())).expect("logger");
    logger.debug("debug");
    logger.info("info");
    logger.user_action("clicked");
    logger.warn("warn");
    logger.fatal("fatal");
    let stats = logger.shutdown().await;

    let file = dir.path().join(format!("{}.log", logger.session_id()));
    let lines: Vec<LogRecord> = std::fs::read_to_string(file)
        .expect("log file")
        .lines()
        .map(|l| serde_json::from_str(l).expect("json line"))
        .collect();
    let file_messages: Vec<&str> = lines.iter().map(|r| r.message.as_str()).collect();
    assert_eq!(file_messages, ["info", "clicked", "warn", "fatal"]);

    assert_eq!(recorder.messages(), ["warn", "fatal"]);
    let queue = stats.queue.expect("database enabled");
    assert_eq!(queue.enqueued, 2);
    assert_eq!(queue.flushed, 2);
    assert!(stats.destinations.iter().all(|d| d.failures == 0));
}

#[tokio::test(start_paused = true)]
async fn records_carry_context_session_and_scrubbed_fields() {
    let recorder = Arc::new(Recorder::default());
    let mut cfg = config();
    cfg.runtime = tracing_log_fanout::Runtime::Browser;
    let logger = Logger::new(cfg, Some(recorder.clone())).expect("logger");

    logger.merge_context(LogContext::new().with_request_id("r-7").with_user_id("u-1"));
    logger.log(
        RecordDraft::new(LogLevel::Info, "signed in as ann@example.com")
            .field("password", "hunter2")
            .field("user_id", "u-override")
            .field("plan", "pro"),
    );
    logger.shutdown().await;

    let records = recorder.0.lock();
    let record = &records[0];
    assert_eq!(record.context.request_id(), Some("r-7"));
    assert_eq!(record.context.user_id(), Some("u-override"));
    assert_eq!(record.metadata["plan"], "pro");
    assert_eq!(record.metadata["password"], "[REDACTED]");
    assert_eq!(record.message, "signed in as [REDACTED]");
    assert_eq!(record.session_id, logger.session_id());
    assert_eq!(record.runtime, tracing_log_fanout::Runtime::Browser);
}

#[derive(Debug)]
struct DbError;

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("connection timed out after 30000 ms")
    }
}

impl Error for DbError {}

#[tokio::test(start_paused = true)]
async fn errors_are_categorized_end_to_end() {
    let recorder = Arc::new(Recorder::default());
    let logger = Logger::new(config(), Some(recorder.clone())).expect("logger");

    logger.log_error("query failed", &DbError);
    logger.log_error("query failed", &DbError);
    logger.shutdown().await;

    let records = recorder.0.lock();
    let first = records[0].error.as_ref().expect("error");
    let second = records[1].error.as_ref().expect("error");
    assert_eq!(first.category, ErrorCategory::Timeout);
    assert_eq!(first.fingerprint, second.fingerprint);
    assert_eq!(records[0].level, LogLevel::Error);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_keep_their_own_context() {
    let recorder = Arc::new(Recorder::default());
    let logger = Logger::new(config(), Some(recorder.clone())).expect("logger");
    let store = TaskLocalContext::new();

    let mut handles = Vec::new();
    for n in 0..32 {
        let logger = logger.clone();
        handles.push(tokio::spawn(store.run(async move {
            logger.merge_context(LogContext::new().with_request_id(format!("req-{n}")));
            for step in 0..5 {
                tokio::task::yield_now().await;
                logger.info(format!("req-{n} step {step}"));
            }
        })));
    }
    for handle in handles {
        handle.await.expect("task");
    }
    // Outside any unit of work there is nothing to merge into.
    logger.merge_context(LogContext::new().with_request_id("stray"));
    logger.info("outside");
    assert!(store.get().is_empty());

    let stats = logger.shutdown().await;
    assert_eq!(stats.queue.expect("queue").flushed, 32 * 5 + 1);

    for record in recorder.0.lock().iter() {
        match record.context.request_id() {
            Some(id) => assert!(record.message.starts_with(&format!("{id} "))),
            None => assert_eq!(record.message, "outside"),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn failing_store_only_moves_counters() {
    let mut config = config();
    config.database.queue.max_retries = 2;
    let logger = Logger::new(config, Some(Arc::new(AlwaysDown))).expect("logger");

    logger.error("will not persist");
    logger.flush();
    tokio::time::sleep(std::time::Duration::from_secs(5)).await;

    let queue = logger.stats().queue.expect("queue");
    assert_eq!(queue.failures, 2);
    assert_eq!(queue.dropped, 1);
    assert_eq!(queue.pending, 0);
}

#[tokio::test(start_paused = true)]
async fn sampling_happens_before_dispatch() {
    let recorder = Arc::new(Recorder::default());
    let mut config = config();
    config.sampling.rate = 0.0;
    config.sampling.levels = vec![LogLevel::Debug];
    let logger = Logger::new(config, Some(recorder.clone())).expect("logger");

    for _ in 0..10 {
        logger.debug("dropped by sampling");
    }
    logger.notice("kept");
    let stats = logger.shutdown().await;

    assert_eq!(recorder.messages(), ["kept"]);
    assert_eq!(stats.sampled_out, 10);
    assert_eq!(stats.queue.expect("queue").enqueued, 1);
}
