use crate::error::PersistError;
use crate::record::LogRecord;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

/// Asynchronous durable destination for batches of [`LogRecord`]s.
///
/// Implementations transport a batch to a concrete store (a database table,
/// a queue, an HTTP ingestion endpoint). The batching queue calls `persist`
/// from its flusher task and never on the application thread.
#[async_trait]
pub trait Persist: Send + Sync {
    /// Persist one batch, in order.
    ///
    /// **Parameters**
    /// - `batch`: up to `batch_size` records, oldest first.
    ///
    /// **Returns**
    /// - `Ok(())` if the whole batch was accepted.
    /// - `Err(..)` if the backend failed. The queue retries the same batch
    ///   with exponential backoff, so implementations must tolerate seeing
    ///   a batch more than once; the core does not deduplicate.
    async fn persist(&self, batch: &[Arc<LogRecord>]) -> Result<(), PersistError>;
}

/// Adapter that lets an async closure act as a [`Persist`].
pub struct PersistFn<F> {
    f: F,
}

/// Wrap `f` as a [`Persist`].
///
/// ```ignore
/// let persist = persist_fn(|batch: Vec<Arc<LogRecord>>| async move {
///     db.insert_many(&batch).await.map_err(Into::into)
/// });
/// ```
pub fn persist_fn<F, Fut>(f: F) -> PersistFn<F>
where
    F: Fn(Vec<Arc<LogRecord>>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), PersistError>> + Send + 'static,
{
    PersistFn { f }
}

#[async_trait]
impl<F, Fut> Persist for PersistFn<F>
where
    F: Fn(Vec<Arc<LogRecord>>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), PersistError>> + Send + 'static,
{
    async fn persist(&self, batch: &[Arc<LogRecord>]) -> Result<(), PersistError> {
        (self.f)(batch.to_vec()).await
    }
}

/// A persister that accepts and discards every batch.
///
/// Useful for measuring the overhead of the logger itself without any
/// external I/O, and for tests that don't care about persistence.
#[derive(Clone, Default)]
pub struct NoopPersist;

#[async_trait]
impl Persist for NoopPersist {
    async fn persist(&self, _batch: &[Arc<LogRecord>]) -> Result<(), PersistError> {
        Ok(())
    }
}
