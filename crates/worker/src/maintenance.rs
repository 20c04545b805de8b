//! Background cache maintenance.
//!
//! Bound enforcement runs on a single task fed by an unbounded channel, so the
//! response path only pays for a channel send and jobs never overlap each other.
//! At most one pass per cache instance is queued at a time; a request made while
//! one is already pending is folded into it. Failures are logged at debug level
//! and dropped; the next insertion schedules another pass anyway.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use precache_core::{CacheHandle, CacheStore, enforce_bound};
use tokio::sync::{mpsc, oneshot};

enum Job {
    EnforceBound { handle: CacheHandle, bound: usize },
    Flush(oneshot::Sender<()>),
}

/// Cache instances with a bound pass queued but not yet started.
#[derive(Debug, Default)]
struct Pending(Mutex<HashSet<String>>);

impl Pending {
    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns false if a pass for `name` is already queued.
    fn mark(&self, name: &str) -> bool {
        self.lock().insert(name.to_string())
    }

    fn clear(&self, name: &str) {
        self.lock().remove(name);
    }
}

/// Handle to the maintenance task. Clones share the same task.
#[derive(Debug, Clone)]
pub struct Maintenance {
    tx: mpsc::UnboundedSender<Job>,
    pending: Arc<Pending>,
}

impl Maintenance {
    /// Spawn the maintenance task on the current tokio runtime.
    ///
    /// The task exits once every `Maintenance` handle has been dropped.
    pub fn spawn(store: Arc<dyn CacheStore>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let pending = Arc::new(Pending::default());
        let queued = pending.clone();

        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                match job {
                    Job::EnforceBound { handle, bound } => {
                        // Cleared before the pass so inserts landing during it queue another one.
                        queued.clear(handle.name());
                        match enforce_bound(store.as_ref(), &handle, bound).await {
                            Ok(0) => {}
                            Ok(evicted) => {
                                tracing::debug!(cache = handle.name(), evicted, bound, "evicted oldest entries");
                            }
                            Err(e) => {
                                tracing::debug!(cache = handle.name(), error = %e, "bound enforcement failed");
                            }
                        }
                    }
                    Job::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
        });

        Self { tx, pending }
    }

    /// Schedule eviction of `handle` down to `bound` entries. Never waits.
    pub fn enforce_bound(&self, handle: CacheHandle, bound: usize) {
        if !self.pending.mark(handle.name()) {
            tracing::trace!(cache = handle.name(), "bound pass already queued");
            return;
        }

        let name = handle.name().to_string();
        if self.tx.send(Job::EnforceBound { handle, bound }).is_err() {
            self.pending.clear(&name);
            tracing::debug!("maintenance task has stopped; bound enforcement skipped");
        }
    }

    /// Wait until every job scheduled before this call has run.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.tx.send(Job::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }
}
