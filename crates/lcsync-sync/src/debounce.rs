//! Per-path debouncing
//!
//! Each path has at most one pending timer. Scheduling a path that already
//! has one aborts the old timer and starts a new window, so a burst of saves
//! produces a single action once the file has been quiet for the window.
//!
//! ```text
//! Idle ──schedule──▶ Pending(timer) ──window elapsed──▶ action spawned, Idle
//!                      │    ▲
//!                      └────┘ schedule (timer replaced)
//! ```
//!
//! Actions run as independent tasks on the shared [`TaskTracker`]; once
//! started they are never cancelled. After the shutdown token fires no new
//! action starts.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::trace;

struct PendingTimer {
    generation: u64,
    handle: AbortHandle,
}

/// Component-owned timer map keyed by path
pub struct Debouncer {
    window: Duration,
    timers: Arc<DashMap<PathBuf, PendingTimer>>,
    generation: AtomicU64,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl Debouncer {
    /// Creates a debouncer whose actions run on `tracker`
    pub fn new(window: Duration, tracker: TaskTracker, shutdown: CancellationToken) -> Self {
        Self {
            window,
            timers: Arc::new(DashMap::new()),
            generation: AtomicU64::new(0),
            tracker,
            shutdown,
        }
    }

    /// Quiet window
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Starts or restarts the timer for `path`
    ///
    /// `action` is called once the path has been quiet for the window.
    /// Returns `false` without scheduling anything after shutdown began.
    pub fn schedule<F, Fut>(&self, path: PathBuf, action: F) -> bool
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.shutdown.is_cancelled() {
            return false;
        }
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);

        // The entry stays locked while the timer is spawned, so the timer can
        // never look itself up before it is registered.
        match self.timers.entry(path.clone()) {
            Entry::Occupied(mut occupied) => {
                occupied.get().handle.abort();
                trace!(path = %path.display(), "Debounce timer reset");
                let handle = self.spawn_timer(path, generation, action);
                occupied.insert(PendingTimer { generation, handle });
            }
            Entry::Vacant(vacant) => {
                let handle = self.spawn_timer(path, generation, action);
                vacant.insert(PendingTimer { generation, handle });
            }
        }
        true
    }

    fn spawn_timer<F, Fut>(&self, path: PathBuf, generation: u64, action: F) -> AbortHandle
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let timers = Arc::clone(&self.timers);
        let tracker = self.tracker.clone();
        let shutdown = self.shutdown.clone();
        let window = self.window;

        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(window) => {}
            }
            // A newer schedule owns the entry if generations differ
            if timers
                .remove_if(&path, |_, timer| timer.generation == generation)
                .is_none()
            {
                return;
            }
            if shutdown.is_cancelled() {
                return;
            }
            trace!(path = %path.display(), "Debounce window elapsed");
            tracker.spawn(action());
        })
        .abort_handle()
    }

    /// Drops the pending timer of `path`, if any
    pub fn cancel(&self, path: &Path) -> bool {
        match self.timers.remove(path) {
            Some((_, timer)) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Drops every pending timer
    pub fn cancel_all(&self) {
        self.timers.retain(|_, timer| {
            timer.handle.abort();
            false
        });
    }

    /// Number of paths with a pending timer
    pub fn pending_count(&self) -> usize {
        self.timers.len()
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
