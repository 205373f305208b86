//! File watching
//!
//! Provides a [`FileWatcher`] that wraps the `notify` crate to monitor the
//! environment tree, converting raw OS events into [`ChangeEvent`] values.
//! Debouncing is not done here; see [`crate::debounce`].
//!
//! ## Architecture
//!
//! ```text
//! inotify / fsevents
//!       │
//!       ▼
//!  FileWatcher  ──→  mpsc::channel  ──→  WatchScheduler  ──→  Debouncer / DeletionCoordinator
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Capacity of the event channel between the notify thread and the watch loop
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

// ============================================================================
// ChangeEvent
// ============================================================================

/// A filesystem change, decoupled from `notify`'s raw event types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// A file was created at the given path
    Created(PathBuf),
    /// A file's content or metadata changed
    Modified(PathBuf),
    /// A file was removed
    Deleted(PathBuf),
    /// A file or folder was renamed within the tree
    Renamed {
        /// The original path before the rename
        old: PathBuf,
        /// The new path after the rename
        new: PathBuf,
    },
    /// A folder was created
    DirCreated(PathBuf),
    /// A folder was removed
    DirDeleted(PathBuf),
}

impl ChangeEvent {
    /// Returns the primary path associated with this event
    ///
    /// For rename events, this returns the new (destination) path.
    pub fn path(&self) -> &Path {
        match self {
            ChangeEvent::Created(p)
            | ChangeEvent::Modified(p)
            | ChangeEvent::Deleted(p)
            | ChangeEvent::DirCreated(p)
            | ChangeEvent::DirDeleted(p) => p,
            ChangeEvent::Renamed { new, .. } => new,
        }
    }
}

// ============================================================================
// FileWatcher
// ============================================================================

/// Watches the environment tree using the OS-native mechanism
///
/// ## Usage
///
/// ```ignore
/// let (mut watcher, rx) = FileWatcher::new()?;
/// let handle = watcher.watch(&env_root)?;
/// // rx.recv().await to get events
/// ```
pub struct FileWatcher {
    watcher: RecommendedWatcher,
}

impl FileWatcher {
    /// Opens an OS watcher whose events are mapped and forwarded to the
    /// returned receiver
    pub fn new() -> Result<(Self, mpsc::Receiver<ChangeEvent>)> {
        let (tx, rx) = mpsc::channel::<ChangeEvent>(EVENT_CHANNEL_CAPACITY);

        let forward = move |res: notify::Result<notify::Event>| {
            let event = match res {
                Ok(event) => event,
                Err(err) => {
                    error!(error = %err, "Watcher reported an error");
                    return;
                }
            };
            let Some(change) = map_notify_event(&event) else {
                return;
            };
            if tx.blocking_send(change).is_err() {
                warn!("Change dropped, scheduler is gone");
            }
        };

        let watcher = RecommendedWatcher::new(forward, notify::Config::default())
            .context("Could not open the OS file watcher")?;
        info!("File watcher ready");

        Ok((Self { watcher }, rx))
    }

    /// Watches `root` and everything below it
    ///
    /// Fails when the folder is missing, unreadable, or the inotify watch
    /// limit is exhausted.
    pub fn watch(&mut self, root: &Path) -> Result<WatchHandle> {
        self.watcher
            .watch(root, RecursiveMode::Recursive)
            .with_context(|| format!("Could not watch {}", root.display()))?;
        info!(root = %root.display(), "Watching environment tree");
        Ok(WatchHandle {
            path: root.to_path_buf(),
        })
    }

    /// Releases a watch obtained from [`watch`](Self::watch)
    pub fn unwatch(&mut self, handle: WatchHandle) -> Result<()> {
        self.watcher
            .unwatch(&handle.path)
            .with_context(|| format!("Could not stop watching {}", handle.path.display()))?;
        info!(root = %handle.path.display(), "Watch released");
        Ok(())
    }
}

/// Identifies an active recursive watch
#[derive(Debug)]
pub struct WatchHandle {
    path: PathBuf,
}

impl WatchHandle {
    /// Returns the path being watched
    pub fn path(&self) -> &Path {
        &self.path
    }
}

// ============================================================================
// Event mapping - notify::Event → ChangeEvent
// ============================================================================

/// Converts a `notify::Event` into a `ChangeEvent`
///
/// - `Create(Folder)` → `DirCreated`, other `Create` → `Created`
/// - `Remove(Folder)` → `DirDeleted`, other `Remove` → `Deleted`
/// - `Modify(Name(Both))` with 2 paths → `Renamed`
/// - `Modify(Name(From))` → `Deleted`, `Modify(Name(To))` → `Created`
/// - other `Modify` → `Modified`
///
/// Access events and events without paths are dropped.
fn map_notify_event(event: &notify::Event) -> Option<ChangeEvent> {
    let paths = &event.paths;
    let path = paths.first()?.clone();

    let change = match &event.kind {
        EventKind::Create(CreateKind::Folder) => ChangeEvent::DirCreated(path),
        EventKind::Create(_) => ChangeEvent::Created(path),
        EventKind::Remove(RemoveKind::Folder) => ChangeEvent::DirDeleted(path),
        EventKind::Remove(_) => ChangeEvent::Deleted(path),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match paths.get(1) {
            Some(new) => ChangeEvent::Renamed {
                old: path,
                new: new.clone(),
            },
            None => ChangeEvent::Modified(path),
        },
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => ChangeEvent::Deleted(path),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => ChangeEvent::Created(path),
        EventKind::Modify(_) => ChangeEvent::Modified(path),
        _ => {
            debug!(kind = ?event.kind, "Ignoring event kind");
            return None;
        }
    };

    debug!(event = ?change, "Mapped notify event");
    Some(change)
}

// ============================================================================
// File stability check
// ============================================================================

/// Checks that a file is not currently being written to
///
/// Reads the file size twice, `check_interval_ms` apart. Returns `false` if
/// the size changed or the file could not be read.
pub async fn is_file_stable(path: &Path, check_interval_ms: u64) -> bool {
    async fn size_of(path: &Path) -> Option<u64> {
        match tokio::fs::metadata(path).await {
            Ok(meta) => Some(meta.len()),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Stability probe failed");
                None
            }
        }
    }

    let Some(before) = size_of(path).await else {
        return false;
    };
    tokio::time::sleep(Duration::from_millis(check_interval_ms)).await;
    let Some(after) = size_of(path).await else {
        return false;
    };

    debug!(path = %path.display(), before, after, "Stability probe");
    before == after
}
