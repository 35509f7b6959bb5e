use std::sync::Arc;
use std::time::Instant;
use tokio::time::Duration;
use tracing::error;

use tracing_log_fanout::init::{init_tracing_with_config, LayerConfig};
use tracing_log_fanout::{Environment, LogLevel, Logger, LoggerConfig, NoopPersist, Persist};

#[tokio::main]
async fn main() {
    let mut config = LoggerConfig {
        environment: Environment::Production,
        ..LoggerConfig::default()
    };
    config.console.enabled = false;
    config.database.enabled = true;
    config.database.min_level = LogLevel::Warn;
    config.database.queue.max_queue_size = 50_000;
    config.database.queue.batch_size = 1_000;
    config.database.queue.flush_interval = Duration::from_millis(200);
    config.sampling.rate = 0.1;
    config.sampling.levels = vec![LogLevel::Debug, LogLevel::Info];

    let persist: Arc<dyn Persist> = Arc::new(NoopPersist);
    let logger = Logger::new(config, Some(persist)).expect("valid config");
    init_tracing_with_config(
        logger.clone(),
        LayerConfig {
            enable_stdout: false,
        },
    )
    .expect("no other global subscriber");

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        error!(iteration = i, "custom load test error");
        tracing::info!(iteration = i, "sampled down to a tenth");
    }

    let elapsed = start.elapsed();
    println!(
        "custom config: sent {} events in {:?} (~{:.0} ev/s)",
        2 * n,
        elapsed,
        (2 * n) as f64 / elapsed.as_secs_f64()
    );

    let stats = logger.shutdown().await;
    println!("sampled out: {}, queue: {:?}", stats.sampled_out, stats.queue);
}
