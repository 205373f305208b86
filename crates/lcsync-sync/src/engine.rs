//! Synchronization engine
//!
//! The [`SyncEngine`] runs the pipeline for one changed path:
//!
//! 1. **Resolve**: map the path to its owning manifest and sync target
//! 2. **Read**: load the local element, field schema or entity body
//! 3. **Publish**: create the owner if it is a draft, otherwise fetch it
//! 4. **Plan**: diff local content against the fresh snapshot
//! 5. **Patch**: send the operations in one request
//! 6. **Persist**: record the revision the server answered with
//!
//! Local content is read and validated before any remote call, so a broken
//! `fields.yaml` never reaches the network.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use lcsync_core::domain::{
    EntityKind, FieldSchema, PatchOperation, RemoteId, Revision, SyncOperation, FIELD_SCHEMA_FILE,
};
use lcsync_core::ports::IRemoteGateway;

use crate::planner::{plan_fields, plan_metadata, plan_sub_element, PlanOutcome};
use crate::publish::PublishResolver;
use crate::resolver::{self, Resolution, ResolveOutcome, SyncTarget};
use crate::store::{LocalElement, ManifestStore, METHOD_FILE, ROLE_FILE};
use crate::{remote_message, Result, SyncError};

// ============================================================================
// Outcomes
// ============================================================================

/// What a single `sync_path` call did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Not a mirrored artifact
    Ignored,
    /// The owner was a draft and has been created
    Created { kind: EntityKind, remote_id: RemoteId },
    /// Operations were applied to the owner
    Patched {
        kind: EntityKind,
        remote_id: RemoteId,
        operations: usize,
    },
    /// Remote already matched
    Unchanged,
    /// System-reserved element with nothing to push
    Skipped,
}

/// Summary of a sync-once walk
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    /// Artifacts visited
    pub visited: u32,
    pub created: u32,
    pub patched: u32,
    pub unchanged: u32,
    /// Errors encountered (non-fatal)
    pub errors: Vec<String>,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
}

enum LocalContent {
    Element(LocalElement),
    Fields(FieldSchema),
    Entity(Map<String, Value>),
}

/// File names `sync_all` visits; scripts are covered by their owner
const SYNCABLE_FILES: &[&str] = &[
    "class.json",
    "version.json",
    "task.json",
    METHOD_FILE,
    ROLE_FILE,
    FIELD_SCHEMA_FILE,
];

// ============================================================================
// SyncEngine
// ============================================================================

/// Per-path sync pipeline over one environment root
pub struct SyncEngine {
    root: PathBuf,
    gateway: Arc<dyn IRemoteGateway>,
    store: Arc<ManifestStore>,
    publisher: PublishResolver,
}

impl SyncEngine {
    /// Creates a new `SyncEngine` for the environment rooted at `root`
    pub fn new(root: PathBuf, gateway: Arc<dyn IRemoteGateway>, store: Arc<ManifestStore>) -> Self {
        let publisher = PublishResolver::new(Arc::clone(&gateway), Arc::clone(&store));
        Self {
            root,
            gateway,
            store,
            publisher,
        }
    }

    /// Environment root this engine syncs
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Syncs the artifact at `path` to the remote
    ///
    /// # Errors
    /// `OwnerNotFound` for recognized files with no owner (callers ignore it);
    /// any other `SyncError` fails this path only.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn sync_path(&self, path: &Path) -> Result<SyncOutcome> {
        let resolution = match resolver::resolve(path)? {
            ResolveOutcome::Resolved(resolution) => resolution,
            ResolveOutcome::NotRecognized => {
                debug!("Path not recognized, ignoring");
                return Ok(SyncOutcome::Ignored);
            }
        };
        let kind = resolution.owner_kind;

        let local = self.read_local(&resolution).await?;

        let published = self
            .publisher
            .ensure_published(kind, &resolution.owner_manifest)
            .await?;
        if published.created {
            return Ok(SyncOutcome::Created {
                kind,
                remote_id: published.remote_id,
            });
        }

        let operations: Vec<SyncOperation> = match &local {
            LocalContent::Element(element) => {
                match plan_sub_element(&published.remote_id, element, &published.snapshot) {
                    PlanOutcome::Operation(op) => vec![op],
                    PlanOutcome::Unchanged => return Ok(SyncOutcome::Unchanged),
                    PlanOutcome::Skipped => {
                        debug!(identifier = %element.element.identifier, "System element skipped");
                        return Ok(SyncOutcome::Skipped);
                    }
                }
            }
            LocalContent::Fields(schema) => {
                plan_fields(&published.remote_id, schema, &published.snapshot)
                    .into_iter()
                    .filter_map(PlanOutcome::into_operation)
                    .collect()
            }
            LocalContent::Entity(body) => {
                plan_metadata(kind, &published.remote_id, body, &published.snapshot)
            }
        };

        if operations.is_empty() {
            return Ok(SyncOutcome::Unchanged);
        }

        for op in &operations {
            debug!(operation = %op, "Planned operation");
        }
        let wire: Vec<PatchOperation> = operations.iter().map(SyncOperation::to_patch).collect();

        let updated = self
            .gateway
            .patch(kind.remote_class(), &published.remote_id, &wire)
            .await
            .map_err(|e| SyncError::RemotePatchFailed {
                kind,
                identity: published.remote_id.to_string(),
                message: remote_message(&e),
            })?;

        let revision = updated
            .as_ref()
            .and_then(|record| record.get("revision"))
            .and_then(Revision::from_json);
        if let Some(revision) = revision.filter(|r| *r != published.revision) {
            self.store
                .update_manifest(&resolution.owner_manifest, |m| m.revision = revision)
                .await?;
        }

        info!(
            kind = %kind,
            remote_id = %published.remote_id,
            operations = operations.len(),
            "Patched remote entity"
        );

        Ok(SyncOutcome::Patched {
            kind,
            remote_id: published.remote_id,
            operations: operations.len(),
        })
    }

    async fn read_local(&self, resolution: &Resolution) -> Result<LocalContent> {
        match &resolution.target {
            SyncTarget::SubElement { kind, dir } => Ok(LocalContent::Element(
                self.store.read_sub_element(*kind, dir).await?,
            )),
            SyncTarget::FieldSet { schema } => Ok(LocalContent::Fields(
                self.store.read_field_schema(schema).await?,
            )),
            SyncTarget::Entity => {
                let (_, body) = self
                    .store
                    .read_entity_body(resolution.owner_kind, &resolution.owner_manifest)
                    .await?;
                Ok(LocalContent::Entity(body))
            }
        }
    }

    /// Syncs every mirrored artifact under the root once
    ///
    /// Owners are visited before their children, so a draft owner is created
    /// with its children and the children then come out unchanged.
    #[instrument(skip(self), fields(root = %self.root.display()))]
    pub async fn sync_all(&self) -> Result<SyncReport> {
        let start = Instant::now();
        let mut report = SyncReport::default();

        for path in self.collect_syncable().await? {
            report.visited += 1;
            match self.sync_path(&path).await {
                Ok(SyncOutcome::Created { .. }) => report.created += 1,
                Ok(SyncOutcome::Patched { .. }) => report.patched += 1,
                Ok(SyncOutcome::Unchanged | SyncOutcome::Skipped | SyncOutcome::Ignored) => {
                    report.unchanged += 1
                }
                Err(e) if e.is_ignorable() => {
                    debug!(path = %path.display(), error = %e, "Skipping path without owner");
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Sync failed");
                    report.errors.push(format!("{}: {e}", path.display()));
                }
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            visited = report.visited,
            created = report.created,
            patched = report.patched,
            errors = report.errors.len(),
            duration_ms = report.duration_ms,
            "Sync-once complete"
        );
        Ok(report)
    }

    /// Breadth-first listing of syncable files, manifests first in each folder
    async fn collect_syncable(&self) -> Result<Vec<PathBuf>> {
        let mut found = Vec::new();
        let mut queue = VecDeque::from([self.root.clone()]);

        while let Some(dir) = queue.pop_front() {
            let mut files = Vec::new();
            let mut subdirs = Vec::new();
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    subdirs.push(entry.path());
                } else if entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| SYNCABLE_FILES.contains(&name))
                {
                    files.push(entry.path());
                }
            }

            files.sort_by_key(|p| {
                let is_manifest = p
                    .file_name()
                    .and_then(|n| n.to_str())
                    .and_then(EntityKind::from_manifest_file_name)
                    .is_some();
                (!is_manifest, p.clone())
            });
            subdirs.sort();
            found.extend(files);
            queue.extend(subdirs);
        }

        Ok(found)
    }
}
