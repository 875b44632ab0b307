//! Invalidation tracker - reactive updates for live queries
//!
//! A live query is registered with the set of tables it reads and a
//! materializing function that re-runs it against the current store state.
//! Registration delivers one initial snapshot, then every committed write
//! that touches a registered table wakes the query's pump task, which
//! re-materializes and pushes the fresh result to the subscriber.
//!
//! Wake-ups use [`Notify`] permit semantics: a commit that lands while a
//! re-materialization is still running is never lost, and several rapid
//! commits coalesce into a single re-run. The contract is
//! at-least-once-per-relevant-commit, not exactly-once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::Result;

/// Process-wide registry mapping tables to the live queries that read them
#[derive(Clone, Default)]
pub struct InvalidationTracker {
    inner: Arc<TrackerInner>,
}

#[derive(Default)]
struct TrackerInner {
    registry: Mutex<HashMap<u64, Registration>>,
    next_id: AtomicU64,
}

struct Registration {
    tables: Vec<&'static str>,
    wakeup: Arc<Notify>,
}

impl InvalidationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a live query over `tables`.
    ///
    /// Spawns a pump task that evaluates `query` once for the initial
    /// snapshot, then re-evaluates on every wake-up. A failed evaluation is
    /// logged and retried on the next notification instead of ending the
    /// subscription. Must be called from within a tokio runtime.
    pub fn register<T, F>(&self, tables: &[&'static str], query: F) -> LiveQuery<T>
    where
        T: Send + 'static,
        F: Fn() -> Result<T> + Send + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let wakeup = Arc::new(Notify::new());
        lock_registry(&self.inner).insert(
            id,
            Registration {
                tables: tables.to_vec(),
                wakeup: Arc::clone(&wakeup),
            },
        );
        tracing::debug!("live query {} registered on {:?}", id, tables);

        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            loop {
                match query() {
                    Ok(snapshot) => {
                        if tx.send(snapshot).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        tracing::warn!("live query {} re-materialization failed: {}", id, err);
                    }
                }
                wakeup.notified().await;
            }
        });

        LiveQuery {
            rx,
            task,
            id,
            tracker: Arc::clone(&self.inner),
        }
    }

    /// Wake every live query whose table set intersects `tables_written`.
    ///
    /// Called exactly once per committed write transaction, after commit.
    pub fn notify(&self, tables_written: &[&'static str]) {
        let registry = lock_registry(&self.inner);
        for registration in registry.values() {
            if registration
                .tables
                .iter()
                .any(|t| tables_written.contains(t))
            {
                registration.wakeup.notify_one();
            }
        }
    }

    /// Number of currently registered live queries
    pub fn active_queries(&self) -> usize {
        lock_registry(&self.inner).len()
    }
}

fn lock_registry(inner: &TrackerInner) -> MutexGuard<'_, HashMap<u64, Registration>> {
    inner.registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to a registered live query.
///
/// Receives materialized result snapshots in commit order. Dropping the
/// handle cancels the subscription immediately: the registration is removed,
/// the pump task is aborted, and an in-flight re-materialization is discarded
/// rather than delivered.
pub struct LiveQuery<T> {
    rx: mpsc::UnboundedReceiver<T>,
    task: JoinHandle<()>,
    id: u64,
    tracker: Arc<TrackerInner>,
}

impl<T> LiveQuery<T> {
    /// Await the next result snapshot. Returns `None` once the pump is gone.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Non-blocking poll for an already-delivered snapshot
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

impl<T> Drop for LiveQuery<T> {
    fn drop(&mut self) {
        self.task.abort();
        lock_registry(&self.tracker).remove(&self.id);
        tracing::debug!("live query {} unregistered", self.id);
    }
}
