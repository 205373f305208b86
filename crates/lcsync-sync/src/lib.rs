//! lcsync Sync - File-watching synchronization engine
//!
//! Provides:
//! - Mapping of changed files back to the remote entity they mirror
//! - Minimal patch planning against a freshly fetched remote snapshot
//! - Draft publishing (create-once, then patch)
//! - Debounced file watching and confirmed folder deletion
//!
//! ## Modules
//!
//! - [`store`] - Local manifest store (atomic JSON writes, scripts, field schema)
//! - [`resolver`] - Path resolver (file → owning manifest)
//! - [`planner`] - Patch planner (local element + snapshot → operation)
//! - [`publish`] - Publish resolver (draft → create, otherwise get)
//! - [`engine`] - Per-path sync pipeline and sync-once walk
//! - [`watcher`] - `notify` wrapper producing [`watcher::ChangeEvent`]s
//! - [`debounce`] - Per-path quiet-window timers
//! - [`scheduler`] - Watch loop dispatching events to sync, scaffolding and deletion
//! - [`deletion`] - Deletion coordinator (confirm and remove, or roll back)
//! - [`scaffold`] - New-folder bootstrap
//! - [`fetch`] - Remote search and materialization onto disk

pub mod debounce;
pub mod deletion;
pub mod engine;
pub mod fetch;
pub mod planner;
pub mod publish;
pub mod resolver;
pub mod scaffold;
pub mod scheduler;
pub mod store;
pub mod watcher;

use std::path::PathBuf;

use lcsync_core::domain::EntityKind;
use thiserror::Error;

/// Errors that can occur during synchronization operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// A recognized file has no owning manifest within the search depth
    #[error("No owning manifest found for {0}")]
    OwnerNotFound(PathBuf),

    /// A manifest (or sub-element file) expected on disk is absent
    #[error("Manifest missing: {0}")]
    ManifestMissing(PathBuf),

    /// Reading the current remote record failed
    #[error("Failed to fetch {kind} '{identity}': {message}")]
    RemoteFetchFailed {
        kind: EntityKind,
        identity: String,
        message: String,
    },

    /// Applying patch operations to the remote record failed
    #[error("Failed to patch {kind} '{identity}': {message}")]
    RemotePatchFailed {
        kind: EntityKind,
        identity: String,
        message: String,
    },

    /// Publishing a draft entity failed
    #[error("Failed to create {kind} '{identity}': {message}")]
    RemoteCreateFailed {
        kind: EntityKind,
        identity: String,
        message: String,
    },

    /// Local content cannot be parsed or is inconsistent
    #[error("Conflicting local edit in {path}: {message}")]
    ConflictingLocalEdit { path: PathBuf, message: String },

    /// The deletion prompt could not obtain an answer
    #[error("Deletion prompt failed: {0}")]
    PromptFailed(String),

    /// An I/O error occurred during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A domain-level error propagated from lcsync-core
    #[error("Domain error: {0}")]
    Domain(#[from] lcsync_core::domain::DomainError),

    /// JSON (de)serialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    /// Returns true for errors the watcher drops silently
    pub fn is_ignorable(&self) -> bool {
        matches!(self, SyncError::OwnerNotFound(_))
    }
}

/// Result alias for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Renders an adapter error with its full context chain
pub(crate) fn remote_message(err: &anyhow::Error) -> String {
    format!("{err:#}")
}
