//! Publish resolver
//!
//! Before an entity can be patched it must exist remotely. A manifest whose
//! revision is the draft sentinel is created exactly once, from the full
//! entity assembled from disk, and the identity the server assigns is written
//! back into the manifest. Any other manifest is simply fetched.

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tracing::{info, instrument};

use lcsync_core::domain::{EntityKind, EntityManifest, RemoteId, Revision};
use lcsync_core::ports::IRemoteGateway;

use crate::resolver::find_owner_manifest;
use crate::store::ManifestStore;
use crate::{remote_message, Result, SyncError};

/// A remote record known to exist
#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub remote_id: RemoteId,
    pub revision: Revision,
    /// True if this call created the record
    pub created: bool,
    /// The record as the server returned it
    pub snapshot: Value,
}

/// Ensures a manifest's entity exists remotely
pub struct PublishResolver {
    gateway: Arc<dyn IRemoteGateway>,
    store: Arc<ManifestStore>,
}

impl PublishResolver {
    pub fn new(gateway: Arc<dyn IRemoteGateway>, store: Arc<ManifestStore>) -> Self {
        Self { gateway, store }
    }

    /// Creates a draft entity or fetches a published one
    ///
    /// # Errors
    /// - `RemoteCreateFailed` if `create` fails or answers without identity;
    ///   the manifest is left untouched
    /// - `RemoteFetchFailed` if `get` fails
    ///
    /// Concurrent calls for one manifest are serialized until the draft is
    /// published; later callers see the stored identity and fetch instead.
    #[instrument(skip(self), fields(path = %manifest_path.display()))]
    pub async fn ensure_published(&self, kind: EntityKind, manifest_path: &Path) -> Result<Published> {
        let guard = self.store.lock_publish(manifest_path).await;
        // read under the lock: a concurrent caller may just have published it
        let manifest = self.store.read_manifest(manifest_path).await?;

        match manifest.remote_id() {
            Some(remote_id) if !manifest.is_draft() => {
                drop(guard);
                let snapshot = self
                    .gateway
                    .get(kind.remote_class(), &remote_id)
                    .await
                    .map_err(|e| SyncError::RemoteFetchFailed {
                        kind,
                        identity: remote_id.to_string(),
                        message: remote_message(&e),
                    })?;
                Ok(Published {
                    remote_id,
                    revision: manifest.revision,
                    created: false,
                    snapshot,
                })
            }
            _ => self.create(kind, manifest_path, &manifest).await,
        }
    }

    async fn create(
        &self,
        kind: EntityKind,
        manifest_path: &Path,
        manifest: &EntityManifest,
    ) -> Result<Published> {
        let identity = manifest.identifier.to_string();
        let create_failed = |message: String| SyncError::RemoteCreateFailed {
            kind,
            identity: identity.clone(),
            message,
        };

        let mut payload = self.store.assemble_entity(kind, manifest_path).await?;
        if kind == EntityKind::DiagramTask {
            let version_id = self.owning_version_id(manifest_path).await.map_err(|e| match e {
                SyncError::ManifestMissing(_) | SyncError::OwnerNotFound(_) => {
                    create_failed("task has no published process version".to_string())
                }
                other => other,
            })?;
            if let Value::Object(map) = &mut payload {
                map.insert("versionId".to_string(), Value::String(version_id.to_string()));
            }
        }

        let response = self
            .gateway
            .create(kind.remote_class(), &payload)
            .await
            .map_err(|e| create_failed(remote_message(&e)))?;

        let remote_id = response
            .get("id")
            .and_then(Value::as_str)
            .and_then(|id| RemoteId::new(id.to_string()).ok())
            .ok_or_else(|| create_failed("response has no id".to_string()))?;
        let revision = response
            .get("revision")
            .and_then(Revision::from_json)
            .ok_or_else(|| create_failed("response has no revision".to_string()))?;

        self.store
            .update_manifest(manifest_path, |m| {
                m.accept_remote_identity(&remote_id, revision.clone())
            })
            .await?;

        info!(
            kind = %kind,
            identifier = %identity,
            remote_id = %remote_id,
            "Published draft entity"
        );

        Ok(Published {
            remote_id,
            revision,
            created: true,
            snapshot: response,
        })
    }

    /// Remote id of the process version a task folder belongs to
    async fn owning_version_id(&self, task_manifest: &Path) -> Result<RemoteId> {
        let task_dir = task_manifest
            .parent()
            .ok_or_else(|| SyncError::OwnerNotFound(task_manifest.to_path_buf()))?;
        // tasks/<task>/ sits directly under the version folder
        let start = task_dir
            .parent()
            .and_then(Path::parent)
            .ok_or_else(|| SyncError::OwnerNotFound(task_manifest.to_path_buf()))?;
        let version_manifest = find_owner_manifest(start, EntityKind::ProcessVersion)
            .ok_or_else(|| SyncError::OwnerNotFound(task_manifest.to_path_buf()))?;

        let version = self.store.read_manifest(&version_manifest).await?;
        match version.remote_id() {
            Some(id) if !version.is_draft() => Ok(id),
            _ => Err(SyncError::ManifestMissing(version_manifest)),
        }
    }
}
