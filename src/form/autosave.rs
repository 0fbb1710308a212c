//! Debounced auto-save
//!
//! One pending save per record id. Scheduling again before the quiescence
//! window elapses aborts the pending task and starts a new one, so a burst
//! of edits produces exactly one save, `window` after the last edit.
//! A save that has started runs to completion; `settle` waits for it.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use super::types::FormData;
use crate::records::StorageError;

/// Default quiescence window
pub const DEFAULT_AUTOSAVE_WINDOW: Duration = Duration::from_secs(30);

/// Destination for draft saves
#[async_trait]
pub trait DraftSink: Send + Sync {
    async fn save_draft(&self, record_id: &str, data: &FormData) -> Result<(), StorageError>;
}

struct PendingSave {
    generation: u64,
    handle: JoinHandle<()>,
}

struct SchedulerInner {
    window: Duration,
    next_generation: AtomicU64,
    pending: Mutex<HashMap<String, PendingSave>>,
    /// Held by a save while it runs
    running: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SchedulerInner {
    fn running_lock(&self, record_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(
            self.running
                .lock()
                .entry(record_id.to_string())
                .or_default(),
        )
    }
}

/// Cancellable, restartable save timers keyed by record id
#[derive(Clone)]
pub struct AutoSaveScheduler {
    inner: Arc<SchedulerInner>,
}

impl AutoSaveScheduler {
    pub fn new(window: Duration) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                window,
                next_generation: AtomicU64::new(0),
                pending: Mutex::new(HashMap::new()),
                running: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn window(&self) -> Duration {
        self.inner.window
    }

    /// Run `job` after the quiescence window, replacing any pending job for
    /// the same record. Must be called from within a tokio runtime.
    pub fn schedule<F>(&self, record_id: &str, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::SeqCst);
        let window = self.inner.window;
        let inner = Arc::clone(&self.inner);
        let key = record_id.to_string();

        let mut pending = self.inner.pending.lock();

        if let Some(previous) = pending.remove(record_id) {
            previous.handle.abort();
            tracing::trace!(record_id = %record_id, "Rescheduled auto-save");
        }

        let handle = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let running = inner.running_lock(&key);
            let _running = running.lock().await;

            // Leave the table before running so a new edit starts a fresh period
            {
                let mut pending = inner.pending.lock();
                match pending.get(&key) {
                    Some(entry) if entry.generation == generation => {
                        pending.remove(&key);
                    }
                    _ => return,
                }
            }

            job.await;
        });

        pending.insert(record_id.to_string(), PendingSave { generation, handle });
    }

    /// Cancel the pending save for a record. Returns whether one was pending.
    pub fn cancel(&self, record_id: &str) -> bool {
        match self.inner.pending.lock().remove(record_id) {
            Some(entry) => {
                entry.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel the pending save for a record and wait out one that has
    /// already started. Returns whether a pending save was cancelled.
    pub async fn settle(&self, record_id: &str) -> bool {
        let cancelled = self.cancel(record_id);
        let running = self.inner.running_lock(record_id);
        let _idle = running.lock().await;
        cancelled
    }

    /// Cancel every pending save
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<PendingSave> = {
            let mut pending = self.inner.pending.lock();
            pending.drain().map(|(_, entry)| entry).collect()
        };
        for entry in &drained {
            entry.handle.abort();
        }
        if !drained.is_empty() {
            tracing::info!(count = drained.len(), "Cancelled pending auto-saves");
        }
        drained.len()
    }

    pub fn is_pending(&self, record_id: &str) -> bool {
        self.inner.pending.lock().contains_key(record_id)
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().len()
    }
}

impl Default for AutoSaveScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_AUTOSAVE_WINDOW)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter_job(counter: &Arc<AtomicUsize>) -> impl Future<Output = ()> + Send + 'static {
        let counter = Arc::clone(counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_after_window() {
        let scheduler = AutoSaveScheduler::new(Duration::from_secs(30));
        let counter = Arc::new(AtomicUsize::new(0));

        scheduler.schedule("r1", counter_job(&counter));
        assert!(scheduler.is_pending("r1"));

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_pending("r1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_replaces_pending_job() {
        let scheduler = AutoSaveScheduler::new(Duration::from_secs(30));
        let counter = Arc::new(AtomicUsize::new(0));

        scheduler.schedule("r1", counter_job(&counter));
        scheduler.schedule("r1", counter_job(&counter));
        assert_eq!(scheduler.pending_count(), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_save() {
        let scheduler = AutoSaveScheduler::new(Duration::from_secs(30));
        let counter = Arc::new(AtomicUsize::new(0));

        scheduler.schedule("r1", counter_job(&counter));
        scheduler.schedule("r2", counter_job(&counter));
        assert!(scheduler.cancel("r1"));
        assert!(!scheduler.cancel("r1"));

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        scheduler.schedule("r3", counter_job(&counter));
        assert_eq!(scheduler.cancel_all(), 1);
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_waits_for_running_save() {
        let scheduler = AutoSaveScheduler::new(Duration::from_secs(30));
        let counter = Arc::new(AtomicUsize::new(0));

        let slow = Arc::clone(&counter);
        scheduler.schedule("r1", async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            slow.fetch_add(1, Ordering::SeqCst);
        });

        // Past the window: the save has left the table and is running
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(!scheduler.is_pending("r1"));
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        assert!(!scheduler.settle("r1").await);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_cancels_pending_save() {
        let scheduler = AutoSaveScheduler::new(Duration::from_secs(30));
        let counter = Arc::new(AtomicUsize::new(0));

        scheduler.schedule("r1", counter_job(&counter));
        assert!(scheduler.settle("r1").await);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
