//! Watch scheduler - routes filesystem events to sync, scaffolding and deletion
//!
//! The [`WatchScheduler`] sits between the [`FileWatcher`](super::watcher::FileWatcher)
//! and the engine components:
//!
//! ```text
//! FileWatcher ──→ mpsc::Receiver ──→ WatchScheduler ─┬─ file events ──→ Debouncer ──→ SyncEngine::sync_path
//!                                                    ├─ DirCreated ───→ Scaffolder
//!                                                    └─ DirDeleted ───→ DeletionCoordinator
//! ```
//!
//! Folder removals bypass the debounce window but wait out a short settle
//! period, so the children of a folder removed with `rm -r` are not treated
//! as removals of their own. A folder moved out of the tree arrives as a
//! plain deletion and is routed the same way. Every action runs on the
//! shared [`TaskTracker`]; on shutdown pending timers are dropped, no new
//! action starts, and the loop waits for the running ones.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, trace};

use crate::debounce::Debouncer;
use crate::deletion::DeletionCoordinator;
use crate::engine::SyncEngine;
use crate::resolver;
use crate::scaffold::Scaffolder;
use crate::watcher::{is_file_stable, ChangeEvent};

/// Timing knobs of the watch loop
#[derive(Debug, Clone, Copy)]
pub struct WatchTiming {
    /// Quiet window before a changed file is synced
    pub debounce: Duration,
    /// Interval of the size-stability check run before syncing
    pub stability_check_ms: u64,
    /// Wait before a removed folder is handed to the deletion coordinator
    pub removal_settle: Duration,
}

impl Default for WatchTiming {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(400),
            stability_check_ms: 100,
            removal_settle: Duration::from_millis(200),
        }
    }
}

/// Consumes change events until shutdown
pub struct WatchScheduler {
    change_rx: mpsc::Receiver<ChangeEvent>,
    engine: Arc<SyncEngine>,
    scaffolder: Arc<Scaffolder>,
    deletion: Arc<DeletionCoordinator>,
    debouncer: Debouncer,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    stability_check_ms: u64,
    removal_settle: Duration,
}

impl WatchScheduler {
    /// Creates a new `WatchScheduler`
    ///
    /// # Arguments
    /// * `change_rx` - Channel receiver for filesystem change events
    /// * `shutdown` - Cancelled on Ctrl+C / SIGTERM
    pub fn new(
        change_rx: mpsc::Receiver<ChangeEvent>,
        engine: Arc<SyncEngine>,
        scaffolder: Arc<Scaffolder>,
        deletion: Arc<DeletionCoordinator>,
        timing: WatchTiming,
        shutdown: CancellationToken,
    ) -> Self {
        info!(
            debounce_ms = timing.debounce.as_millis() as u64,
            stability_check_ms = timing.stability_check_ms,
            "Creating watch scheduler"
        );

        let tracker = TaskTracker::new();
        let debouncer = Debouncer::new(timing.debounce, tracker.clone(), shutdown.clone());
        Self {
            change_rx,
            engine,
            scaffolder,
            deletion,
            debouncer,
            tracker,
            shutdown,
            stability_check_ms: timing.stability_check_ms,
            removal_settle: timing.removal_settle,
        }
    }

    /// Number of paths waiting for their debounce window
    pub fn pending(&self) -> usize {
        self.debouncer.pending_count()
    }

    /// Main event loop
    ///
    /// Returns after the shutdown token is cancelled (or the watcher is
    /// dropped) and every in-flight action has finished.
    pub async fn run(mut self) {
        info!(root = %self.engine.root().display(), "Watch scheduler starting");

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Shutdown requested, stopping watch loop");
                    break;
                }
                event = self.change_rx.recv() => match event {
                    Some(change) => self.dispatch(change),
                    None => {
                        info!("Change channel closed, stopping watch loop");
                        break;
                    }
                }
            }
        }

        self.debouncer.cancel_all();
        self.tracker.close();
        if !self.tracker.is_empty() {
            info!(in_flight = self.tracker.len(), "Waiting for in-flight actions");
        }
        self.tracker.wait().await;
        info!("Watch scheduler stopped");
    }

    /// Routes one change event
    pub fn dispatch(&self, event: ChangeEvent) {
        trace!(event = ?event, "Scheduler received change event");
        if self.shutdown.is_cancelled() {
            return;
        }

        match event {
            ChangeEvent::Created(path) | ChangeEvent::Modified(path) => self.file_changed(path, false),
            ChangeEvent::Deleted(path) => self.removed(path),
            ChangeEvent::Renamed { old, new } => {
                if new.is_dir() {
                    self.dir_removed(old);
                    self.dir_created(new);
                } else {
                    self.removed(old);
                    self.file_changed(new, false);
                }
            }
            ChangeEvent::DirCreated(path) => self.dir_created(path),
            ChangeEvent::DirDeleted(path) => self.dir_removed(path),
        }
    }

    /// A path that went away without saying whether it was a folder
    fn removed(&self, path: PathBuf) {
        if !resolver::is_recognized(&path)
            && resolver::classify_dir(&path).is_some()
            && !path.exists()
        {
            self.dir_removed(path);
        } else {
            self.file_changed(path, true);
        }
    }

    fn file_changed(&self, path: PathBuf, removed: bool) {
        if !resolver::is_recognized(&path) {
            trace!(path = %path.display(), "Not a mirrored file");
            return;
        }
        // Files inside a removed folder are covered by the folder's deletion
        if removed && !path.parent().is_some_and(Path::is_dir) {
            debug!(path = %path.display(), "Parent folder removed, skipping file event");
            return;
        }

        let engine = Arc::clone(&self.engine);
        let stability_check_ms = self.stability_check_ms;
        let target = path.clone();
        self.debouncer.schedule(path, move || async move {
            if target.exists() && !is_file_stable(&target, stability_check_ms).await {
                debug!(path = %target.display(), "File still being written, waiting for next event");
                return;
            }
            sync_and_log(&engine, &target).await;
        });
    }

    fn dir_created(&self, dir: PathBuf) {
        if resolver::classify_dir(&dir).is_none() {
            return;
        }
        let scaffolder = Arc::clone(&self.scaffolder);
        self.tracker.spawn(async move {
            if let Err(e) = scaffolder.scaffold(&dir).await {
                error!(dir = %dir.display(), error = %e, "Scaffolding failed");
            }
        });
    }

    fn dir_removed(&self, dir: PathBuf) {
        if resolver::classify_dir(&dir).is_none() {
            return;
        }
        let deletion = Arc::clone(&self.deletion);
        let shutdown = self.shutdown.clone();
        let settle = self.removal_settle;
        self.tracker.spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(settle) => {}
            }
            match deletion.handle_removed_dir(&dir).await {
                Ok(outcome) => debug!(dir = %dir.display(), outcome = ?outcome, "Deletion settled"),
                Err(e) if e.is_ignorable() => {
                    debug!(dir = %dir.display(), error = %e, "Owner folder gone too, nothing to do")
                }
                Err(e) => error!(dir = %dir.display(), error = %e, "Deletion failed"),
            }
        });
    }
}

async fn sync_and_log(engine: &SyncEngine, path: &Path) {
    match engine.sync_path(path).await {
        Ok(outcome) => debug!(path = %path.display(), outcome = ?outcome, "Sync finished"),
        Err(e) if e.is_ignorable() => {
            debug!(path = %path.display(), error = %e, "No owning manifest, ignoring")
        }
        Err(e) => error!(path = %path.display(), error = %e, "Sync failed"),
    }
}
