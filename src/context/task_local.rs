use super::{ContextStore, LogContext, Runtime};
use std::cell::RefCell;
use std::future::Future;
use tokio::task::futures::TaskLocalFuture;

tokio::task_local! {
    static TASK_CONTEXT: RefCell<LogContext>;
}

/// Context store backed by tokio task-local storage.
///
/// A unit of work starts with [`run`](Self::run) (or any `scope_async`
/// call) and its context travels with the future across suspension points.
/// Two tasks polled concurrently on different worker threads each see only
/// their own context.
///
/// Spawned tasks do not inherit context. Wrap the spawned future with
/// [`inherit`](Self::inherit) to hand it a copy of the caller's context.
///
/// Outside of any unit of work `merge` and `clear` do nothing and `get`
/// returns an empty context.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskLocalContext;

impl TaskLocalContext {
    pub fn new() -> Self {
        TaskLocalContext
    }

    /// Run `fut` as a fresh unit of work with an empty context.
    pub fn run<F: Future>(&self, fut: F) -> TaskLocalFuture<RefCell<LogContext>, F> {
        TASK_CONTEXT.scope(RefCell::new(LogContext::new()), fut)
    }

    /// Run `fut` as a fresh unit of work seeded with `initial`.
    pub fn run_with<F: Future>(
        &self,
        initial: LogContext,
        fut: F,
    ) -> TaskLocalFuture<RefCell<LogContext>, F> {
        TASK_CONTEXT.scope(RefCell::new(initial), fut)
    }

    /// Run `fut` with the current context extended by `partial`.
    ///
    /// Merges made inside `fut` are discarded when it completes, so the
    /// caller's context is exactly what it was before.
    pub fn scope_async<F: Future>(
        &self,
        partial: LogContext,
        fut: F,
    ) -> TaskLocalFuture<RefCell<LogContext>, F> {
        let extended = self.get().merged(&partial);
        TASK_CONTEXT.scope(RefCell::new(extended), fut)
    }

    /// Give `fut` a copy of the current context, typically before
    /// `tokio::spawn`.
    pub fn inherit<F: Future>(&self, fut: F) -> TaskLocalFuture<RefCell<LogContext>, F> {
        TASK_CONTEXT.scope(RefCell::new(self.get()), fut)
    }

    /// Whether the caller is inside a unit of work.
    pub fn is_active(&self) -> bool {
        TASK_CONTEXT.try_with(|_| ()).is_ok()
    }
}

impl ContextStore for TaskLocalContext {
    fn merge(&self, partial: LogContext) {
        let _ = TASK_CONTEXT.try_with(|ctx| ctx.borrow_mut().merge(partial));
    }

    fn get(&self) -> LogContext {
        TASK_CONTEXT
            .try_with(|ctx| ctx.borrow().clone())
            .unwrap_or_default()
    }

    fn clear(&self) {
        let _ = TASK_CONTEXT.try_with(|ctx| *ctx.borrow_mut() = LogContext::new());
    }

    fn runtime(&self) -> Runtime {
        Runtime::Server
    }

    fn scope<R, F>(&self, partial: LogContext, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let extended = self.get().merged(&partial);
        TASK_CONTEXT.sync_scope(RefCell::new(extended), f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::time::Duration;

    #[test]
    fn outside_unit_of_work_is_empty_and_inert() {
        let store = TaskLocalContext::new();
        store.merge(LogContext::new().with_request_id("lost"));
        assert!(store.get().is_empty());
        assert!(!store.is_active());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_tasks_do_not_see_each_other() {
        let store = TaskLocalContext::new();
        let mut handles = Vec::new();
        for i in 0..16 {
            handles.push(tokio::spawn(store.run(async move {
                let store = TaskLocalContext::new();
                store.merge(LogContext::new().with_request_id(format!("req-{i}")));
                for _ in 0..5 {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    tokio::task::yield_now().await;
                    assert_eq!(store.get().request_id(), Some(format!("req-{i}").as_str()));
                }
                store.get()
            })));
        }
        for (i, handle) in handles.into_iter().enumerate() {
            let ctx = handle.await.expect("task");
            assert_eq!(ctx.len(), 1);
            assert_eq!(ctx.request_id(), Some(format!("req-{i}").as_str()));
        }
    }

    #[tokio::test]
    async fn scope_async_restores_after_suspension_and_error() {
        let store = TaskLocalContext::new();
        store
            .run_with(LogContext::new().with_user_id("u1"), async {
                let result: Result<(), &str> = store
                    .scope_async(LogContext::new().with_action("pay"), async {
                        tokio::task::yield_now().await;
                        store.merge(LogContext::new().with_request_id("inner"));
                        assert_eq!(store.get().get_str("action"), Some("pay"));
                        Err("declined")
                    })
                    .await;
                assert!(result.is_err());
                assert_eq!(store.get(), LogContext::new().with_user_id("u1"));
            })
            .await;
    }

    #[tokio::test]
    async fn sync_scope_restores_after_panic() {
        let store = TaskLocalContext::new();
        store
            .run_with(LogContext::new().with_tenant_id("t1"), async {
                let outcome = catch_unwind(AssertUnwindSafe(|| {
                    store.scope(LogContext::new().with_tenant_id("t2"), || {
                        assert_eq!(store.get().tenant_id(), Some("t2"));
                        panic!("boom");
                    })
                }));
                assert!(outcome.is_err());
                assert_eq!(store.get().tenant_id(), Some("t1"));
            })
            .await;
    }

    #[tokio::test]
    async fn inherit_copies_context_into_spawned_task() {
        let store = TaskLocalContext::new();
        let seen = store
            .run_with(LogContext::new().with_trace_id("tr-1"), async {
                let fut = store.inherit(async { TaskLocalContext::new().get() });
                tokio::spawn(fut).await.expect("join")
            })
            .await;
        assert_eq!(seen.trace_id(), Some("tr-1"));
    }
}
