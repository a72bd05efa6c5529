//! Per-unit-of-work diagnostic context (correlation id + MDC fields).
//!
//! Each unit of work runs inside [`ContextController::scope`] (async) or
//! [`ContextController::sync_scope`] and gets its own empty [`LogContext`]
//! stored in a tokio task-local. Plain OS threads outside any scope fall back
//! to a context owned by the thread. On a Tokio runtime, changes made outside
//! a scope are ignored (with one diagnostic) and reads see an empty context,
//! so one request's fields never show up in another request's records.

use serde_json::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::runtime::Handle;

use crate::logger::DIAGNOSTICS_TARGET;

/// Snapshot of the diagnostic context of one unit of work.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogContext {
    /// Explicitly assigned correlation id. `None` means every record
    /// enriched from this context gets a freshly generated id.
    pub correlation_id: Option<String>,
    /// Free-form fields; only the well-known MDC keys survive serialization.
    pub fields: BTreeMap<String, Value>,
}

tokio::task_local! {
    static TASK_CONTEXT: RefCell<LogContext>;
}

thread_local! {
    static THREAD_CONTEXT: RefCell<LogContext> = RefCell::new(LogContext::default());
}

/// Run `f` on the context of the current unit of work.
///
/// Returns `None` for code running on a Tokio runtime outside any scope:
/// tasks on a runtime share worker threads, so the thread-local fallback is
/// reserved for plain OS threads.
fn with_current<R>(f: impl FnOnce(&mut LogContext) -> R) -> Option<R> {
    if TASK_CONTEXT.try_with(|_| ()).is_ok() {
        return Some(TASK_CONTEXT.with(|ctx| f(&mut ctx.borrow_mut())));
    }
    if Handle::try_current().is_ok() {
        return None;
    }
    if THREAD_CONTEXT.try_with(|_| ()).is_ok() {
        return Some(THREAD_CONTEXT.with(|ctx| f(&mut ctx.borrow_mut())));
    }
    // Thread-local storage is being torn down.
    Some(f(&mut LogContext::default()))
}

static UNSCOPED_WARNED: AtomicBool = AtomicBool::new(false);

fn mutate(f: impl FnOnce(&mut LogContext)) {
    if with_current(f).is_none() && !UNSCOPED_WARNED.swap(true, Ordering::Relaxed) {
        tracing::warn!(
            target: DIAGNOSTICS_TARGET,
            "log context changed outside ContextController::scope on a Tokio runtime; ignoring"
        );
    }
}

/// Copy of the context visible to the caller right now.
pub(crate) fn snapshot() -> LogContext {
    with_current(|ctx| ctx.clone()).unwrap_or_default()
}

/// Handle used by application code to manage the diagnostic context.
///
/// The handle itself carries no state; every call acts on the context of
/// the unit of work that is currently executing.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextController;

impl ContextController {
    pub fn new() -> Self {
        ContextController
    }

    /// Run `fut` with a fresh, empty context private to it.
    pub fn scope<F>(&self, fut: F) -> impl Future<Output = F::Output>
    where
        F: Future,
    {
        TASK_CONTEXT.scope(RefCell::new(LogContext::default()), fut)
    }

    /// Synchronous counterpart of [`ContextController::scope`].
    pub fn sync_scope<R>(&self, f: impl FnOnce() -> R) -> R {
        TASK_CONTEXT.sync_scope(RefCell::new(LogContext::default()), f)
    }

    pub fn set_correlation_id(&self, id: impl Into<String>) {
        let id = id.into();
        mutate(|ctx| ctx.correlation_id = Some(id));
    }

    /// Correlation id explicitly set for the current unit of work, if any.
    pub fn correlation_id(&self) -> Option<String> {
        with_current(|ctx| ctx.correlation_id.clone()).flatten()
    }

    /// Replace the whole field set. Fields not present in `fields` are
    /// removed; the correlation id is left untouched.
    pub fn set_context<I, K, V>(&self, fields: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let fields: BTreeMap<String, Value> = fields
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        mutate(|ctx| ctx.fields = fields);
    }

    /// Insert or overwrite a single field.
    pub fn put(&self, key: impl Into<String>, value: impl Into<Value>) {
        let (key, value) = (key.into(), value.into());
        mutate(|ctx| {
            ctx.fields.insert(key, value);
        });
    }

    /// Drop all fields and the correlation id.
    pub fn clear_context(&self) {
        mutate(|ctx| *ctx = LogContext::default());
    }

    pub(crate) fn snapshot(&self) -> LogContext {
        snapshot()
    }
}
