use std::sync::Arc;
use std::time::Instant;
use tracing::error;

use tracing_log_fanout::init::init_tracing;
use tracing_log_fanout::{Environment, Logger, LoggerConfig, NoopPersist, Persist};

#[tokio::main]
async fn main() {
    let mut config = LoggerConfig {
        environment: Environment::Production,
        ..LoggerConfig::default()
    };
    config.console.enabled = false;
    config.database.enabled = true;

    let persist: Arc<dyn Persist> = Arc::new(NoopPersist);
    let logger = Logger::new(config, Some(persist)).expect("valid config");
    init_tracing(logger.clone()).expect("no other global subscriber");

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        error!(iteration = i, "default load test error");
    }

    let elapsed = start.elapsed();
    println!(
        "default config: sent {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    let stats = logger.shutdown().await;
    println!("queue: {:?}", stats.queue);
}
