use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};
use tracing_log_fanout::{
    init::init_tracing, persist_fn, LogLevel, LogRecord, Logger, LoggerConfig, Persist,
    PersistError,
};

/// Example of plugging in a durable store by implementing `Persist`
/// directly. Imagine this talks to some proprietary DB; here it prints.
struct MyCustomDb;

#[async_trait]
impl Persist for MyCustomDb {
    async fn persist(&self, batch: &[Arc<LogRecord>]) -> Result<(), PersistError> {
        for record in batch {
            println!("[my-custom-db] {}", record.to_json_line());
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    let mut config = LoggerConfig::default();
    config.database.enabled = true;
    config.database.min_level = LogLevel::Info;

    let persist: Arc<dyn Persist> = Arc::new(MyCustomDb);
    let logger = Logger::new(config.clone(), Some(persist)).expect("valid config");
    init_tracing(logger.clone()).expect("no other global subscriber");

    info!("custom persist example started");
    error!(db = "my-custom-db", "simulated error sent via custom persist");
    info!(log.kind = "success", "order placed");
    logger.shutdown().await;

    // The same thing as a closure. A failing store is retried with backoff,
    // and in development every failed attempt is echoed on the console.
    config.database.queue.max_retries = 2;
    let flaky = persist_fn(|batch: Vec<Arc<LogRecord>>| async move {
        Err::<(), PersistError>(format!("store unavailable ({} records)", batch.len()).into())
    });
    let logger = Logger::new(config, Some(Arc::new(flaky))).expect("valid config");
    logger.warn("this one never reaches the store");
    logger.flush();
    let stats = logger.shutdown().await;
    println!("flaky store: {:?}", stats.queue);
}
