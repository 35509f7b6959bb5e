//! Batching and backpressure in front of the durable destination.
//!
//! Producers call [`BatchQueue::enqueue`], which only touches an in-memory
//! buffer and never waits. A single flusher task per queue drains the
//! buffer in batches through a [`Persist`] implementation.
//!
//! ```text
//! Idle ──enqueue──▶ Accumulating ──size/interval──▶ Flushing ──ok──▶ Idle | Accumulating
//!                                                      │
//!                                                      └─err──▶ Retrying ──backoff──▶ Flushing
//!                                                                  │
//!                                                                  └─max retries──▶ drop batch
//! ```
//!
//! Ordering: batches reach the persister in enqueue order. A failed batch is
//! put back at the front and nothing else is flushed until its retry fires,
//! so the only visible effect of a failure is delay, or loss once retries
//! are exhausted or the oldest entries are shed under overflow.

use crate::error::ConfigError;
use crate::persist::Persist;
use crate::record::LogRecord;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Duration, Instant};

/// Tuning of the durable destination's queue.
///
/// **Fields**
/// - `batch_size`: records handed to the persister per call; reaching it
///   triggers a flush.
/// - `flush_interval`: longest time between flushes when a batch is not
///   full.
/// - `max_queue_size`: buffered records before the oldest are dropped.
/// - `max_retries`: failed attempts after which a batch is dropped.
/// - `base_retry_delay` / `max_retry_delay`: exponential backoff between
///   attempts, doubling from the base and capped at the max.
/// - `shutdown_timeout`: bound on the final drain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub batch_size: usize,
    #[serde(with = "duration_ms")]
    pub flush_interval: Duration,
    pub max_queue_size: usize,
    pub max_retries: u32,
    #[serde(with = "duration_ms")]
    pub base_retry_delay: Duration,
    #[serde(with = "duration_ms")]
    pub max_retry_delay: Duration,
    #[serde(with = "duration_ms")]
    pub shutdown_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            batch_size: 128,
            flush_interval: Duration::from_secs(1),
            max_queue_size: 1024,
            max_retries: 3,
            base_retry_delay: Duration::from_millis(100),
            max_retry_delay: Duration::from_secs(10),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl QueueConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.max_queue_size == 0 {
            return Err(ConfigError::ZeroQueueSize);
        }
        if self.flush_interval.is_zero() {
            return Err(ConfigError::ZeroFlushInterval);
        }
        if self.base_retry_delay > self.max_retry_delay {
            return Err(ConfigError::RetryDelayOrder {
                base: self.base_retry_delay,
                max: self.max_retry_delay,
            });
        }
        Ok(())
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_retry_delay
            .saturating_mul(factor)
            .min(self.max_retry_delay)
    }
}

pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Where the queue is in its flush cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Idle,
    Accumulating,
    Flushing,
    /// Waiting out the backoff before attempt `attempt + 1`.
    Retrying { attempt: u32 },
    /// Shut down; further records are dropped.
    Closed,
}

/// Counters exposed for monitoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub enqueued: u64,
    pub flushed: u64,
    pub dropped: u64,
    pub failures: u64,
    pub flush_attempts: u64,
    pub pending: usize,
}

/// Called with a description of every failed persist attempt.
pub type FailureHook = Arc<dyn Fn(&str) + Send + Sync>;

struct BatchEntry {
    record: Arc<LogRecord>,
    enqueued_at: Instant,
    retries: u32,
}

struct Buffer {
    entries: VecDeque<BatchEntry>,
    state: QueueState,
    /// Entries currently handed to the persister.
    in_flight: usize,
    last_flush: Instant,
    retry_at: Option<Instant>,
    force: bool,
    closed: bool,
}

impl Buffer {
    fn settle(&mut self) {
        self.state = if self.entries.is_empty() {
            QueueState::Idle
        } else {
            QueueState::Accumulating
        };
    }
}

#[derive(Default)]
struct Counters {
    enqueued: AtomicU64,
    flushed: AtomicU64,
    dropped: AtomicU64,
    failures: AtomicU64,
    flush_attempts: AtomicU64,
}

struct Shared {
    config: QueueConfig,
    buffer: Mutex<Buffer>,
    wake: Notify,
    counters: Counters,
    on_failure: Option<FailureHook>,
}

/// Bounded, batching, retrying queue in front of a [`Persist`].
pub struct BatchQueue {
    shared: Arc<Shared>,
    flusher: Mutex<Option<JoinHandle<()>>>,
}

impl BatchQueue {
    /// Validate `config` and spawn the flusher on the current tokio runtime.
    pub fn spawn(config: QueueConfig, persist: Arc<dyn Persist>) -> Result<Self, ConfigError> {
        Self::spawn_with_hook(config, persist, None)
    }

    pub fn spawn_with_hook(
        config: QueueConfig,
        persist: Arc<dyn Persist>,
        on_failure: Option<FailureHook>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;

        let shared = Arc::new(Shared {
            buffer: Mutex::new(Buffer {
                entries: VecDeque::with_capacity(config.max_queue_size.min(4096)),
                state: QueueState::Idle,
                in_flight: 0,
                last_flush: Instant::now(),
                retry_at: None,
                force: false,
                closed: false,
            }),
            config,
            wake: Notify::new(),
            counters: Counters::default(),
            on_failure,
        });

        let handle = runtime.spawn(run_flusher(Arc::clone(&shared), persist));

        Ok(BatchQueue {
            shared,
            flusher: Mutex::new(Some(handle)),
        })
    }

    pub fn config(&self) -> &QueueConfig {
        &self.shared.config
    }

    /// Append a record. Never waits; sheds the oldest entry when full.
    pub fn enqueue(&self, record: Arc<LogRecord>) {
        let shared = &self.shared;
        let mut buffer = shared.buffer.lock();
        if buffer.closed {
            shared.counters.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        while buffer.entries.len() >= shared.config.max_queue_size {
            buffer.entries.pop_front();
            shared.counters.dropped.fetch_add(1, Ordering::Relaxed);
        }
        buffer.entries.push_back(BatchEntry {
            record,
            enqueued_at: Instant::now(),
            retries: 0,
        });
        shared.counters.enqueued.fetch_add(1, Ordering::Relaxed);
        if buffer.state == QueueState::Idle {
            buffer.state = QueueState::Accumulating;
        }
        let full = buffer.entries.len() >= shared.config.batch_size;
        drop(buffer);

        if full {
            shared.wake.notify_one();
        }
    }

    /// Ask the flusher to flush now instead of waiting for the interval.
    /// A pending retry backoff is still honoured.
    pub fn request_flush(&self) {
        self.shared.buffer.lock().force = true;
        self.shared.wake.notify_one();
    }

    pub fn len(&self) -> usize {
        self.shared.buffer.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn state(&self) -> QueueState {
        self.shared.buffer.lock().state
    }

    /// Buffered records, oldest first. Excludes a batch being persisted.
    pub fn pending_records(&self) -> Vec<Arc<LogRecord>> {
        self.shared
            .buffer
            .lock()
            .entries
            .iter()
            .map(|e| Arc::clone(&e.record))
            .collect()
    }

    pub fn stats(&self) -> QueueStats {
        let c = &self.shared.counters;
        QueueStats {
            enqueued: c.enqueued.load(Ordering::Relaxed),
            flushed: c.flushed.load(Ordering::Relaxed),
            dropped: c.dropped.load(Ordering::Relaxed),
            failures: c.failures.load(Ordering::Relaxed),
            flush_attempts: c.flush_attempts.load(Ordering::Relaxed),
            pending: self.len(),
        }
    }

    /// Drain what can be drained within `timeout`, then discard the rest.
    ///
    /// Later calls, and records enqueued after the first call, only move the
    /// dropped counter.
    pub async fn shutdown(&self, timeout: Duration) -> QueueStats {
        self.shared.buffer.lock().closed = true;
        self.shared.wake.notify_one();

        let handle = self.flusher.lock().take();
        if let Some(mut handle) = handle {
            if tokio::time::timeout(timeout, &mut handle).await.is_err() {
                eprintln!("log queue drain timed out after {:?}, discarding remaining records", timeout);
                handle.abort();
                let _ = handle.await;
            }
        }

        let mut buffer = self.shared.buffer.lock();
        let remaining = buffer.entries.len() + buffer.in_flight;
        buffer.entries.clear();
        buffer.in_flight = 0;
        buffer.state = QueueState::Closed;
        drop(buffer);
        self.shared
            .counters
            .dropped
            .fetch_add(remaining as u64, Ordering::Relaxed);

        self.stats()
    }
}

/// Dropping without [`BatchQueue::shutdown`] closes the queue and leaves the
/// flusher to drain in the background. Nothing waits for it, so records still
/// buffered when the runtime itself shuts down are lost uncounted.
impl Drop for BatchQueue {
    fn drop(&mut self) {
        if self.flusher.get_mut().take().is_some() {
            self.shared.buffer.lock().closed = true;
            self.shared.wake.notify_one();
        }
    }
}

async fn run_flusher(shared: Arc<Shared>, persist: Arc<dyn Persist>) {
    loop {
        // `None` when a flush is already due, e.g. a backlog of full batches
        // or one that built up during a retry backoff.
        let deadline = {
            let mut buffer = shared.buffer.lock();
            if buffer.closed {
                break;
            }
            if shared.flush_due(&mut buffer, Instant::now()) {
                None
            } else {
                Some(
                    buffer
                        .retry_at
                        .unwrap_or(buffer.last_flush + shared.config.flush_interval),
                )
            }
        };

        if let Some(deadline) = deadline {
            tokio::select! {
                _ = shared.wake.notified() => {}
                _ = sleep_until(deadline) => {}
            }
        }

        let due = {
            let mut buffer = shared.buffer.lock();
            if buffer.closed {
                break;
            }
            shared.flush_due(&mut buffer, Instant::now())
        };
        if due {
            shared.flush_batch(&*persist, false).await;
        }
    }

    // Best effort: retries without backoff, bounded by max_retries per batch
    // and by the shutdown timeout.
    loop {
        let empty = shared.buffer.lock().entries.is_empty();
        if empty {
            break;
        }
        shared.flush_batch(&*persist, true).await;
    }
}

impl Shared {
    fn flush_due(&self, buffer: &mut Buffer, now: Instant) -> bool {
        if buffer.entries.is_empty() {
            buffer.force = false;
            if now >= buffer.last_flush + self.config.flush_interval {
                // Nothing to flush; restart the interval timer.
                buffer.last_flush = now;
            }
            return false;
        }
        if let Some(retry_at) = buffer.retry_at {
            return now >= retry_at;
        }
        buffer.force
            || buffer.entries.len() >= self.config.batch_size
            || now >= buffer.last_flush + self.config.flush_interval
    }

    /// Take one batch from the front and persist it. The buffer lock is
    /// never held across the persist call.
    async fn flush_batch(&self, persist: &dyn Persist, draining: bool) {
        let batch: Vec<BatchEntry> = {
            let mut buffer = self.buffer.lock();
            let n = buffer.entries.len().min(self.config.batch_size);
            if n == 0 {
                return;
            }
            buffer.in_flight = n;
            buffer.state = QueueState::Flushing;
            buffer.retry_at = None;
            buffer.force = false;
            buffer.last_flush = Instant::now();
            buffer.entries.drain(..n).collect()
        };

        let records: Vec<Arc<LogRecord>> = batch.iter().map(|e| Arc::clone(&e.record)).collect();
        self.counters.flush_attempts.fetch_add(1, Ordering::Relaxed);

        match persist.persist(&records).await {
            Ok(()) => {
                self.counters
                    .flushed
                    .fetch_add(batch.len() as u64, Ordering::Relaxed);
                let mut buffer = self.buffer.lock();
                buffer.in_flight = 0;
                buffer.settle();
            }
            Err(e) => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                self.retry_or_drop(batch, &e.to_string(), draining);
            }
        }
    }

    fn retry_or_drop(&self, mut batch: Vec<BatchEntry>, error: &str, draining: bool) {
        let mut attempt = 0;
        for entry in batch.iter_mut() {
            entry.retries += 1;
            attempt = attempt.max(entry.retries);
        }

        let mut buffer = self.buffer.lock();
        buffer.in_flight = 0;

        if attempt >= self.config.max_retries {
            let n = batch.len() as u64;
            buffer.settle();
            drop(buffer);
            self.counters.dropped.fetch_add(n, Ordering::Relaxed);
            let oldest = batch
                .iter()
                .map(|e| e.enqueued_at.elapsed())
                .max()
                .unwrap_or_default();
            self.report(&format!(
                "log batch of {} dropped after {} attempts (oldest queued {:?} ago): {}",
                n, attempt, oldest, error
            ));
            return;
        }

        for entry in batch.into_iter().rev() {
            buffer.entries.push_front(entry);
        }
        let mut shed = 0u64;
        while buffer.entries.len() > self.config.max_queue_size {
            buffer.entries.pop_front();
            shed += 1;
        }

        let delay = self.config.retry_delay(attempt);
        buffer.state = QueueState::Retrying { attempt };
        buffer.retry_at = if draining {
            None
        } else {
            Some(Instant::now() + delay)
        };
        drop(buffer);

        if shed > 0 {
            self.counters.dropped.fetch_add(shed, Ordering::Relaxed);
        }
        self.report(&format!(
            "log batch persist failed (attempt {}), retrying in {:?}: {}",
            attempt, delay, error
        ));
    }

    fn report(&self, message: &str) {
        if let Some(hook) = &self.on_failure {
            hook(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{LogContext, Runtime};
    use crate::error::PersistError;
    use crate::level::LogLevel;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use std::sync::atomic::AtomicU32;

    fn record(i: usize) -> Arc<LogRecord> {
        Arc::new(LogRecord {
            timestamp: Utc::now(),
            level: LogLevel::Info,
            message: format!("m{i}"),
            context: LogContext::new(),
            metadata: BTreeMap::new(),
            error: None,
            session_id: "20240101_000000".to_string(),
            runtime: Runtime::Server,
            location: None,
        })
    }

    /// Records every call; fails the first `fail_first` calls.
    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<(Instant, Vec<String>)>>,
        fail_first: AtomicU32,
        always_fail: bool,
    }

    impl Recorder {
        fn failing(n: u32) -> Self {
            Recorder {
                fail_first: AtomicU32::new(n),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<(Instant, Vec<String>)> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl Persist for Recorder {
        async fn persist(&self, batch: &[Arc<LogRecord>]) -> Result<(), PersistError> {
            let messages = batch.iter().map(|r| r.message.clone()).collect();
            self.calls.lock().push((Instant::now(), messages));
            if self.always_fail {
                return Err("down".into());
            }
            let left = self.fail_first.load(Ordering::SeqCst);
            if left > 0 {
                self.fail_first.store(left - 1, Ordering::SeqCst);
                return Err("transient".into());
            }
            Ok(())
        }
    }

    struct Stalled;

    #[async_trait]
    impl Persist for Stalled {
        async fn persist(&self, _batch: &[Arc<LogRecord>]) -> Result<(), PersistError> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    fn config(batch_size: usize, flush_ms: u64, max_queue_size: usize) -> QueueConfig {
        QueueConfig {
            batch_size,
            flush_interval: Duration::from_millis(flush_ms),
            max_queue_size,
            ..QueueConfig::default()
        }
    }

    fn names(range: std::ops::Range<usize>) -> Vec<String> {
        range.map(|i| format!("m{i}")).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn partial_batch_flushes_when_interval_elapses() {
        let recorder = Arc::new(Recorder::default());
        let queue = BatchQueue::spawn(config(5, 1000, 100), recorder.clone()).expect("spawn");
        for i in 0..3 {
            queue.enqueue(record(i));
        }
        assert_eq!(queue.state(), QueueState::Accumulating);

        tokio::time::sleep(Duration::from_millis(999)).await;
        assert!(recorder.calls().is_empty());

        tokio::time::sleep(Duration::from_millis(2)).await;
        let calls = recorder.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, names(0..3));
        assert_eq!(queue.state(), QueueState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn full_batch_flushes_without_waiting() {
        let recorder = Arc::new(Recorder::default());
        let start = Instant::now();
        let queue = BatchQueue::spawn(config(4, 60_000, 100), recorder.clone()).expect("spawn");
        for i in 0..6 {
            queue.enqueue(record(i));
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
        let calls = recorder.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, start);
        assert_eq!(calls[0].1, names(0..4));
        assert_eq!(queue.len(), 2);

        // The leftover goes out one interval after the size-triggered flush.
        tokio::time::sleep(Duration::from_millis(60_000)).await;
        let calls = recorder.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].0, start + Duration::from_millis(60_000));
        assert_eq!(calls[1].1, names(4..6));
    }

    #[tokio::test(start_paused = true)]
    async fn backlog_of_full_batches_flushes_at_once() {
        let recorder = Arc::new(Recorder::default());
        let start = Instant::now();
        let queue = BatchQueue::spawn(config(4, 60_000, 100), recorder.clone()).expect("spawn");
        for i in 0..10 {
            queue.enqueue(record(i));
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
        let calls = recorder.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|(at, _)| *at == start));
        assert_eq!(calls[0].1, names(0..4));
        assert_eq!(calls[1].1, names(4..8));
        assert_eq!(queue.len(), 2);

        tokio::time::sleep(Duration::from_millis(60_000)).await;
        let calls = recorder.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[2].0, start + Duration::from_millis(60_000));
        assert_eq!(calls[2].1, names(8..10));
    }

    #[tokio::test(start_paused = true)]
    async fn backlog_built_during_backoff_flushes_after_retry() {
        let recorder = Arc::new(Recorder::failing(1));
        let start = Instant::now();
        let queue = BatchQueue::spawn(config(3, 60_000, 100), recorder.clone()).expect("spawn");
        for i in 0..3 {
            queue.enqueue(record(i));
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(queue.state(), QueueState::Retrying { attempt: 1 });

        for i in 3..9 {
            queue.enqueue(record(i));
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(recorder.calls().len(), 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        let calls = recorder.calls();
        let batches: Vec<Vec<String>> = calls.iter().map(|(_, b)| b.clone()).collect();
        assert_eq!(
            batches,
            vec![names(0..3), names(0..3), names(3..6), names(6..9)]
        );
        let retried_at = start + Duration::from_millis(100);
        assert!(calls[1..].iter().all(|(at, _)| *at == retried_at));
        assert!(queue.is_empty());
        assert_eq!(queue.stats().flushed, 9);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_queue_drains_in_the_background() {
        let recorder = Arc::new(Recorder::default());
        let queue = BatchQueue::spawn(config(10, 60_000, 100), recorder.clone()).expect("spawn");
        for i in 0..3 {
            queue.enqueue(record(i));
        }
        let shared = Arc::clone(&queue.shared);
        drop(queue);

        tokio::time::sleep(Duration::from_millis(1)).await;
        let calls = recorder.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, names(0..3));
        assert_eq!(shared.counters.flushed.load(Ordering::Relaxed), 3);
        assert!(shared.buffer.lock().entries.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn overflow_keeps_newest_and_counts_drops() {
        let recorder = Arc::new(Recorder::default());
        let queue = BatchQueue::spawn(config(100, 60_000, 5), recorder.clone()).expect("spawn");
        for i in 0..10 {
            queue.enqueue(record(i));
            assert!(queue.len() <= 5);
        }
        let pending: Vec<String> = queue.pending_records().iter().map(|r| r.message.clone()).collect();
        assert_eq!(pending, names(5..10));
        let stats = queue.stats();
        assert_eq!(stats.dropped, 5);
        assert_eq!(stats.enqueued, 10);
        assert!(recorder.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_with_growing_delay() {
        let recorder = Arc::new(Recorder::failing(2));
        let queue = BatchQueue::spawn(config(3, 1000, 100), recorder.clone()).expect("spawn");
        for i in 0..3 {
            queue.enqueue(record(i));
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(queue.state(), QueueState::Retrying { attempt: 1 });

        tokio::time::sleep(Duration::from_secs(5)).await;
        let calls = recorder.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|(_, batch)| *batch == names(0..3)));
        let first_gap = calls[1].0 - calls[0].0;
        let second_gap = calls[2].0 - calls[1].0;
        assert_eq!(first_gap, Duration::from_millis(100));
        assert_eq!(second_gap, Duration::from_millis(200));

        let stats = queue.stats();
        assert_eq!(stats.dropped, 0);
        assert_eq!(stats.flushed, 3);
        assert_eq!(stats.failures, 2);
        assert_eq!(queue.state(), QueueState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_drop_the_batch() {
        let recorder = Arc::new(Recorder {
            always_fail: true,
            ..Default::default()
        });
        let cfg = QueueConfig {
            max_retries: 4,
            base_retry_delay: Duration::from_millis(100),
            max_retry_delay: Duration::from_millis(250),
            ..config(2, 1000, 100)
        };
        let queue = BatchQueue::spawn(cfg, recorder.clone()).expect("spawn");
        queue.enqueue(record(0));
        queue.enqueue(record(1));
        tokio::time::sleep(Duration::from_secs(10)).await;

        let calls = recorder.calls();
        assert_eq!(calls.len(), 4);
        let gaps: Vec<Duration> = calls.windows(2).map(|w| w[1].0 - w[0].0).collect();
        assert_eq!(
            gaps,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(250)
            ]
        );
        assert_eq!(queue.stats().dropped, 2);
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_persist_never_blocks_enqueue() {
        let queue = BatchQueue::spawn(config(10, 1000, 100), Arc::new(Stalled)).expect("spawn");
        for i in 0..10_000 {
            queue.enqueue(record(i));
        }
        assert_eq!(queue.len(), 100);
        tokio::time::sleep(Duration::from_secs(3)).await;
        for i in 0..1_000 {
            queue.enqueue(record(i));
        }
        assert!(queue.len() <= 100);
        assert_eq!(queue.state(), QueueState::Flushing);

        let stats = queue.shutdown(Duration::from_millis(50)).await;
        assert_eq!(stats.flushed, 0);
        assert_eq!(stats.dropped, 11_000);
        assert_eq!(queue.state(), QueueState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_drains_pending_records() {
        let recorder = Arc::new(Recorder::default());
        let queue = BatchQueue::spawn(config(2, 60_000, 100), recorder.clone()).expect("spawn");
        queue.enqueue(record(0));
        let stats = queue.shutdown(Duration::from_secs(1)).await;
        assert_eq!(stats.flushed, 1);
        assert_eq!(stats.dropped, 0);

        queue.enqueue(record(1));
        assert_eq!(queue.stats().dropped, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn request_flush_skips_the_interval() {
        let recorder = Arc::new(Recorder::default());
        let queue = BatchQueue::spawn(config(10, 60_000, 100), recorder.clone()).expect("spawn");
        queue.enqueue(record(0));
        queue.request_flush();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(recorder.calls().len(), 1);
    }

    #[test]
    fn spawn_outside_runtime_is_a_config_error() {
        let result = BatchQueue::spawn(QueueConfig::default(), Arc::new(crate::persist::NoopPersist));
        assert!(matches!(result, Err(ConfigError::NoRuntime)));
    }

    #[test]
    fn retry_delay_doubles_and_caps() {
        let cfg = QueueConfig {
            base_retry_delay: Duration::from_millis(100),
            max_retry_delay: Duration::from_millis(1000),
            ..QueueConfig::default()
        };
        let delays: Vec<u128> = (1..=6).map(|a| cfg.retry_delay(a).as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1000, 1000]);
    }

    #[test]
    fn validation_rejects_degenerate_values() {
        assert!(matches!(config(0, 10, 10).validate(), Err(ConfigError::ZeroBatchSize)));
        assert!(matches!(config(1, 10, 0).validate(), Err(ConfigError::ZeroQueueSize)));
        assert!(matches!(config(1, 0, 10).validate(), Err(ConfigError::ZeroFlushInterval)));
        let inverted = QueueConfig {
            base_retry_delay: Duration::from_secs(5),
            max_retry_delay: Duration::from_secs(1),
            ..QueueConfig::default()
        };
        assert!(matches!(inverted.validate(), Err(ConfigError::RetryDelayOrder { .. })));
    }
}
