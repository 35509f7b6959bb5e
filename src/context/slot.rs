use super::propagation::{extract, HeaderCarrier};
use super::{ContextStore, LogContext, Runtime};
use parking_lot::Mutex;
use std::future::Future;

/// One mutable context slot. Shared by the cooperative and request-scoped
/// stores, which differ only in who owns the slot and for how long.
#[derive(Debug, Default)]
struct Slot {
    current: Mutex<LogContext>,
}

impl Slot {
    fn with(initial: LogContext) -> Self {
        Slot {
            current: Mutex::new(initial),
        }
    }

    fn merge(&self, partial: LogContext) {
        self.current.lock().merge(partial);
    }

    fn get(&self) -> LogContext {
        self.current.lock().clone()
    }

    fn clear(&self) {
        *self.current.lock() = LogContext::new();
    }

    /// Extend the slot with `partial` until the returned guard drops.
    fn enter(&self, partial: LogContext) -> Restore<'_> {
        let mut current = self.current.lock();
        let extended = current.merged(&partial);
        let previous = std::mem::replace(&mut *current, extended);
        Restore {
            slot: self,
            previous: Some(previous),
        }
    }
}

/// Puts the saved context back on drop, including during unwinding and
/// when an async scope is dropped before completion.
struct Restore<'a> {
    slot: &'a Slot,
    previous: Option<LogContext>,
}

impl Drop for Restore<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            *self.slot.current.lock() = previous;
        }
    }
}

/// Single-slot context store for single-threaded cooperative hosts.
///
/// **Degraded mode.** There is exactly one context per store. `scope` saves
/// the slot, extends it, and restores it afterwards. That is only correct
/// when no other unit of work runs between entering and leaving the scope:
/// if two `scope_async` futures interleave at an `.await`, each sees the
/// other's merges and the one that finishes last restores a stale value.
/// Use [`TaskLocalContext`](super::TaskLocalContext) on any runtime that can
/// poll more than one unit of work at a time.
#[derive(Debug, Default)]
pub struct CooperativeContext {
    slot: Slot,
}

impl CooperativeContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Async scope. Subject to the interleaving limitation above.
    pub async fn scope_async<F: Future>(&self, partial: LogContext, fut: F) -> F::Output {
        let _restore = self.slot.enter(partial);
        fut.await
    }
}

impl ContextStore for CooperativeContext {
    fn merge(&self, partial: LogContext) {
        self.slot.merge(partial);
    }

    fn get(&self) -> LogContext {
        self.slot.get()
    }

    fn clear(&self) {
        self.slot.clear();
    }

    fn runtime(&self) -> Runtime {
        Runtime::Browser
    }

    fn scope<R, F>(&self, partial: LogContext, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _restore = self.slot.enter(partial);
        f()
    }
}

/// Context owned by a single inbound request.
///
/// Build one per execution, usually from the incoming headers, and drop it
/// when the request completes. Nothing outlives the request, so there is no
/// sibling to leak into.
#[derive(Debug, Default)]
pub struct RequestContext {
    slot: Slot,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_context(initial: LogContext) -> Self {
        RequestContext {
            slot: Slot::with(initial),
        }
    }

    /// Seed the request context from propagation headers.
    pub fn from_headers(carrier: &impl HeaderCarrier) -> Self {
        Self::with_context(extract(carrier))
    }

    pub async fn scope_async<F: Future>(&self, partial: LogContext, fut: F) -> F::Output {
        let _restore = self.slot.enter(partial);
        fut.await
    }
}

impl ContextStore for RequestContext {
    fn merge(&self, partial: LogContext) {
        self.slot.merge(partial);
    }

    fn get(&self) -> LogContext {
        self.slot.get()
    }

    fn clear(&self) {
        self.slot.clear();
    }

    fn runtime(&self) -> Runtime {
        Runtime::Edge
    }

    fn scope<R, F>(&self, partial: LogContext, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _restore = self.slot.enter(partial);
        f()
    }
}
