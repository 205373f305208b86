//! Deletion coordinator
//!
//! A folder that disappears from the tree is either a sub-element removal to
//! propagate or a mistake to undo. The developer is asked through
//! [`IDeletionPrompt`]:
//!
//! ```text
//! Detected → AwaitingConfirmation ─┬─ yes → remove at the freshly resolved index
//!                                  └─ no  → re-materialize from a fresh get
//! ```
//!
//! The folder is already gone when this runs, so the owner is found from the
//! surviving parent directories and the element is located by identifier in
//! a snapshot fetched after the answer.
//!
//! Whole-entity folders (tasks, classes) have no remote delete; confirming is
//! ignored and declining restores them.
//!
//! A removal whose owner folder is gone by the time the answer arrives is part
//! of a larger removal and is left to the owner's own deletion. A question
//! still open at shutdown is abandoned without acting.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use lcsync_core::domain::{
    element_identifier, EntityKind, EntityManifest, Identifier, OperationKind, PointerPath,
    RemoteId, Revision, SubElementKind, SyncOperation,
};
use lcsync_core::ports::{DeletionRequest, DeletionTarget, IDeletionPrompt, IRemoteGateway};

use crate::fetch::{search_all, Materializer};
use crate::planner::find_element;
use crate::resolver::{classify_dir, DirKind};
use crate::store::ManifestStore;
use crate::{remote_message, Result, SyncError};

/// How a folder deletion was settled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletionOutcome {
    /// The element was removed from the remote owner
    Removed { kind: SubElementKind, remote_id: RemoteId },
    /// The folder was written back from the remote record
    RolledBack(PathBuf),
    /// The remote no longer has the element; nothing to remove or restore
    AlreadyAbsent,
    /// The owner was never published; the deletion is purely local
    Unpublished,
    /// Confirmed, but the remote offers no way to delete the entity
    Ignored,
    /// Not a mirrored element or entity folder
    NotRecognized,
    /// Shutdown began before the developer answered; nothing was changed
    Undecided,
}

/// Turns folder removals into remote removals or local restores
pub struct DeletionCoordinator {
    gateway: Arc<dyn IRemoteGateway>,
    store: Arc<ManifestStore>,
    materializer: Materializer,
    prompt: Arc<dyn IDeletionPrompt>,
    page_size: u32,
    shutdown: CancellationToken,
}

impl DeletionCoordinator {
    pub fn new(
        gateway: Arc<dyn IRemoteGateway>,
        store: Arc<ManifestStore>,
        materializer: Materializer,
        prompt: Arc<dyn IDeletionPrompt>,
        page_size: u32,
    ) -> Self {
        Self {
            gateway,
            store,
            materializer,
            prompt,
            page_size,
            shutdown: CancellationToken::new(),
        }
    }

    /// Abandons open questions once `shutdown` is cancelled
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Handles the removal of `dir`
    ///
    /// # Errors
    /// - `OwnerNotFound` when the owner folder went away too (ignorable)
    /// - `RemotePatchFailed` when a confirmed removal fails; the folder is
    ///   not restored
    /// - `RemoteFetchFailed` when the fresh snapshot cannot be read
    #[instrument(skip(self), fields(dir = %dir.display()))]
    pub async fn handle_removed_dir(&self, dir: &Path) -> Result<DeletionOutcome> {
        let Some(dir_kind) = classify_dir(dir) else {
            return Ok(DeletionOutcome::NotRecognized);
        };
        let Some(identifier) = folder_identifier(dir) else {
            return Ok(DeletionOutcome::NotRecognized);
        };

        match dir_kind {
            DirKind::Method => {
                self.handle_sub_element(SubElementKind::Method, dir, identifier)
                    .await
            }
            DirKind::Role => {
                self.handle_sub_element(SubElementKind::Role, dir, identifier)
                    .await
            }
            DirKind::Task => self.handle_task(dir, identifier).await,
            DirKind::Class => self.handle_class(dir, identifier).await,
        }
    }

    // ------------------------------------------------------------------------
    // Sub-elements
    // ------------------------------------------------------------------------

    async fn handle_sub_element(
        &self,
        kind: SubElementKind,
        dir: &Path,
        identifier: Identifier,
    ) -> Result<DeletionOutcome> {
        let owner_kind = kind.owner_kind();
        // <owner>/<array>/<identifier>
        let owner_dir = dir
            .parent()
            .and_then(Path::parent)
            .ok_or_else(|| SyncError::OwnerNotFound(dir.to_path_buf()))?;
        let (manifest_path, owner) = self.read_owner(owner_dir, owner_kind, dir).await?;
        let Some(remote_id) = published_id(&owner) else {
            info!(identifier = %identifier, "Owner never published, deletion stays local");
            return Ok(DeletionOutcome::Unpublished);
        };

        let request = DeletionRequest {
            path: dir.to_path_buf(),
            target: DeletionTarget::SubElement(kind),
            identifier: identifier.clone(),
            owner: Some(owner.identifier.clone()),
        };
        let Some(confirmed) = self.ask(&request).await? else {
            return Ok(DeletionOutcome::Undecided);
        };
        // rm -r takes children first; the owner may have gone meanwhile
        if !manifest_path.is_file() {
            debug!(request = %request, "Owner folder removed too, leaving it to the owner");
            return Err(SyncError::OwnerNotFound(dir.to_path_buf()));
        }

        let snapshot = self.fetch(owner_kind, &remote_id).await?;
        let Some((index, element)) = find_element(&snapshot, kind.array_name(), identifier.as_str())
        else {
            info!(request = %request, "Element already absent remotely");
            return Ok(DeletionOutcome::AlreadyAbsent);
        };

        if !confirmed {
            let restored = self
                .materializer
                .write_sub_element(kind, owner_dir, element)
                .await?
                .unwrap_or_else(|| dir.to_path_buf());
            info!(request = %request, "Deletion declined, folder restored");
            return Ok(DeletionOutcome::RolledBack(restored));
        }

        let operation = SyncOperation {
            target_remote_id: remote_id.clone(),
            op: OperationKind::Remove,
            path: PointerPath::Index {
                array: kind.array_name(),
                index,
            },
            value: None,
        };
        let updated = self
            .gateway
            .patch(owner_kind.remote_class(), &remote_id, &[operation.to_patch()])
            .await
            .map_err(|e| {
                let err = SyncError::RemotePatchFailed {
                    kind: owner_kind,
                    identity: format!("{}/{}", owner.identifier, identifier),
                    message: remote_message(&e),
                };
                error!(request = %request, error = %err, "Remote removal failed");
                err
            })?;

        let revision = updated
            .as_ref()
            .and_then(|record| record.get("revision"))
            .and_then(Revision::from_json);
        if let Some(revision) = revision.filter(|r| *r != owner.revision) {
            self.store
                .update_manifest(&manifest_path, |m| m.revision = revision)
                .await?;
        }

        info!(request = %request, operation = %operation, "Removed element remotely");
        Ok(DeletionOutcome::Removed { kind, remote_id })
    }

    // ------------------------------------------------------------------------
    // Whole entities
    // ------------------------------------------------------------------------

    async fn handle_task(&self, dir: &Path, identifier: Identifier) -> Result<DeletionOutcome> {
        // <version>/tasks/<identifier>
        let version_dir = dir
            .parent()
            .and_then(Path::parent)
            .ok_or_else(|| SyncError::OwnerNotFound(dir.to_path_buf()))?;
        let (_, version) = self
            .read_owner(version_dir, EntityKind::ProcessVersion, dir)
            .await?;

        let request = DeletionRequest {
            path: dir.to_path_buf(),
            target: DeletionTarget::Entity(EntityKind::DiagramTask),
            identifier: identifier.clone(),
            owner: Some(version.identifier.clone()),
        };
        let Some(version_id) = published_id(&version) else {
            return Ok(DeletionOutcome::Unpublished);
        };
        match self.ask(&request).await? {
            None => return Ok(DeletionOutcome::Undecided),
            Some(true) => {
                warn!(request = %request, "Diagram tasks cannot be deleted remotely, ignoring");
                return Ok(DeletionOutcome::Ignored);
            }
            Some(false) if !version_dir.is_dir() => {
                return Err(SyncError::OwnerNotFound(dir.to_path_buf()));
            }
            Some(false) => {}
        }

        let query = json!({ "versionId": version_id.as_str(), "identifier": identifier.as_str() });
        let hits = search_all(self.gateway.as_ref(), EntityKind::DiagramTask, &query, self.page_size).await?;
        match find_by_identifier(hits, &identifier) {
            Some(record) => {
                let restored = self.materializer.write_task(version_dir, &record).await?;
                info!(request = %request, "Deletion declined, folder restored");
                Ok(DeletionOutcome::RolledBack(restored))
            }
            None => Ok(DeletionOutcome::AlreadyAbsent),
        }
    }

    async fn handle_class(&self, dir: &Path, identifier: Identifier) -> Result<DeletionOutcome> {
        let request = DeletionRequest {
            path: dir.to_path_buf(),
            target: DeletionTarget::Entity(EntityKind::Class),
            identifier: identifier.clone(),
            owner: None,
        };
        match self.ask(&request).await? {
            None => return Ok(DeletionOutcome::Undecided),
            Some(true) => {
                warn!(request = %request, "Classes cannot be deleted remotely, ignoring");
                return Ok(DeletionOutcome::Ignored);
            }
            Some(false) => {}
        }

        let query = json!({ "identifier": identifier.as_str() });
        let hits = search_all(self.gateway.as_ref(), EntityKind::Class, &query, self.page_size).await?;
        let package = dir.parent().and_then(|p| p.file_name()).and_then(|n| n.to_str());
        let record = hits
            .into_iter()
            .filter(|hit| element_identifier(hit) == Some(identifier.as_str()))
            .find(|hit| {
                let remote_package = hit.get("package").and_then(Value::as_str).unwrap_or("default");
                Some(remote_package) == package
            });
        match record {
            Some(record) => {
                let restored = self.materializer.write_class(&record).await?;
                info!(request = %request, "Deletion declined, folder restored");
                Ok(DeletionOutcome::RolledBack(restored))
            }
            None => Ok(DeletionOutcome::AlreadyAbsent),
        }
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    async fn read_owner(
        &self,
        owner_dir: &Path,
        kind: EntityKind,
        removed: &Path,
    ) -> Result<(PathBuf, EntityManifest)> {
        let manifest_path = owner_dir.join(kind.manifest_file_name());
        match self.store.read_manifest(&manifest_path).await {
            Ok(manifest) => Ok((manifest_path, manifest)),
            Err(SyncError::ManifestMissing(_)) => Err(SyncError::OwnerNotFound(removed.to_path_buf())),
            Err(e) => Err(e),
        }
    }

    /// `None` when shutdown began before an answer arrived
    async fn ask(&self, request: &DeletionRequest) -> Result<Option<bool>> {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => {
                info!(request = %request, "Shutting down, deletion left undecided");
                Ok(None)
            }
            answer = self.prompt.confirm(request) => answer
                .map(Some)
                .map_err(|e| SyncError::PromptFailed(format!("{e:#}"))),
        }
    }

    async fn fetch(&self, kind: EntityKind, id: &RemoteId) -> Result<Value> {
        self.gateway
            .get(kind.remote_class(), id)
            .await
            .map_err(|e| SyncError::RemoteFetchFailed {
                kind,
                identity: id.to_string(),
                message: remote_message(&e),
            })
    }
}

fn folder_identifier(dir: &Path) -> Option<Identifier> {
    let name = dir.file_name()?.to_str()?;
    Identifier::new(name).ok()
}

fn published_id(manifest: &EntityManifest) -> Option<RemoteId> {
    manifest.remote_id().filter(|_| !manifest.is_draft())
}

fn find_by_identifier(hits: Vec<Value>, identifier: &Identifier) -> Option<Value> {
    hits.into_iter()
        .find(|hit| element_identifier(hit) == Some(identifier.as_str()))
}
