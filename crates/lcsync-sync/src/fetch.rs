//! Remote fetch and materialization
//!
//! The [`Materializer`] is the single writer that turns remote records into the
//! on-disk tree. The [`Fetcher`] uses it for `fetch`, and the deletion
//! coordinator uses it to restore a folder when a deletion is declined, which
//! is what makes a rollback identical to a fresh fetch.
//!
//! ## Placement
//!
//! ```text
//! classes/<package>/<identifier>/              class record
//! processes/<group>/<process>/<identifier>/    process version record
//!     tasks/<identifier>/                      diagram tasks of the version
//! ```
//!
//! A record without a `package`, `group` or `process` key lands in `default`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::{info, instrument, warn};

use lcsync_core::domain::{
    element_identifier, EntityKind, EntityManifest, FieldSchema, Identifier, RemoteId, SubElement,
    SubElementKind, FIELD_SCHEMA_FILE,
};
use lcsync_core::ports::IRemoteGateway;

use crate::store::{sub_element_file, ManifestStore, SCRIPTS_DIR};
use crate::{remote_message, Result, SyncError};

pub const CLASSES_DIR: &str = "classes";
pub const PROCESSES_DIR: &str = "processes";
pub const TASKS_DIR: &str = "tasks";

/// Folder used when a placement key is absent
const DEFAULT_GROUP: &str = "default";

fn placement_segment(record: &Value, key: &str) -> Result<Identifier> {
    let segment = record
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_GROUP);
    Ok(Identifier::new(segment)?)
}

fn record_identifier(record: &Value) -> Result<Identifier> {
    let identifier = element_identifier(record).unwrap_or_default();
    Ok(Identifier::new(identifier)?)
}

fn string_array(record: &Value, key: &str) -> Vec<String> {
    record
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn object_array<'a>(record: &'a Value, key: &str) -> &'a [Value] {
    record
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

// ============================================================================
// Materializer
// ============================================================================

/// Writes remote records into the environment tree
#[derive(Clone)]
pub struct Materializer {
    root: PathBuf,
    store: Arc<ManifestStore>,
}

impl Materializer {
    pub fn new(root: PathBuf, store: Arc<ManifestStore>) -> Self {
        Self { root, store }
    }

    /// Folder of a class record
    pub fn class_dir(&self, record: &Value) -> Result<PathBuf> {
        Ok(self
            .root
            .join(CLASSES_DIR)
            .join(placement_segment(record, "package")?.as_str())
            .join(record_identifier(record)?.as_str()))
    }

    /// Folder of a process version record
    pub fn version_dir(&self, record: &Value) -> Result<PathBuf> {
        Ok(self
            .root
            .join(PROCESSES_DIR)
            .join(placement_segment(record, "group")?.as_str())
            .join(placement_segment(record, "process")?.as_str())
            .join(record_identifier(record)?.as_str()))
    }

    /// Writes a class with its methods and `fields.yaml`
    pub async fn write_class(&self, record: &Value) -> Result<PathBuf> {
        let dir = self.class_dir(record)?;
        self.write_entity(EntityKind::Class, &dir, record).await?;
        Ok(dir)
    }

    /// Writes a process version with its roles
    pub async fn write_version(&self, record: &Value) -> Result<PathBuf> {
        let dir = self.version_dir(record)?;
        self.write_entity(EntityKind::ProcessVersion, &dir, record).await?;
        Ok(dir)
    }

    /// Writes a diagram task under its version folder
    pub async fn write_task(&self, version_dir: &Path, record: &Value) -> Result<PathBuf> {
        let dir = version_dir
            .join(TASKS_DIR)
            .join(record_identifier(record)?.as_str());
        self.write_entity(EntityKind::DiagramTask, &dir, record).await?;
        Ok(dir)
    }

    #[instrument(skip(self, record), fields(dir = %dir.display()))]
    async fn write_entity(&self, kind: EntityKind, dir: &Path, record: &Value) -> Result<()> {
        let manifest = EntityManifest::from_remote(kind, record)?;
        let _marked = self.store.begin_materialize(dir);
        self.store
            .write_manifest(&dir.join(kind.manifest_file_name()), &manifest)
            .await?;

        match kind {
            EntityKind::Class => {
                for method in object_array(record, "methods") {
                    self.write_sub_element(SubElementKind::Method, dir, method)
                        .await?;
                }
                match FieldSchema::render_remote(object_array(record, "fields")) {
                    Ok(text) => {
                        self.store
                            .write_file(&dir.join(FIELD_SCHEMA_FILE), text.as_bytes())
                            .await?
                    }
                    Err(e) => {
                        warn!(class = %manifest.identifier, error = %e, "Cannot render fields, fields.yaml left untouched")
                    }
                }
            }
            EntityKind::ProcessVersion => {
                for role in object_array(record, "roles") {
                    self.write_sub_element(SubElementKind::Role, dir, role).await?;
                }
            }
            EntityKind::DiagramTask => {
                let scripts = string_array(record, "scripts");
                if !scripts.is_empty() {
                    self.store
                        .write_scripts(&dir.join(SCRIPTS_DIR), &scripts)
                        .await?;
                }
            }
        }
        Ok(())
    }

    /// Writes one method or role folder under `owner_dir`
    ///
    /// Returns `None` (and writes nothing) for elements whose identifier cannot
    /// be a folder name, and for fields.
    pub async fn write_sub_element(
        &self,
        kind: SubElementKind,
        owner_dir: &Path,
        element: &Value,
    ) -> Result<Option<PathBuf>> {
        let Some(file) = sub_element_file(kind) else {
            return Ok(None);
        };
        let Value::Object(map) = element else {
            warn!(kind = %kind, "Remote element is not an object, skipped");
            return Ok(None);
        };
        let identifier = match element_identifier(element).map(Identifier::new) {
            Some(Ok(identifier)) => identifier,
            _ => {
                warn!(kind = %kind, element = %element, "Remote element has no usable identifier, skipped");
                return Ok(None);
            }
        };

        let dir = owner_dir.join(kind.array_name()).join(identifier.as_str());
        let _marked = self.store.begin_materialize(&dir);
        let mut body: Map<String, Value> = map.clone();
        body.remove("identifier");
        let scripts = if kind == SubElementKind::Method {
            body.remove("scripts");
            string_array(element, "scripts")
        } else {
            Vec::new()
        };

        let local = SubElement { identifier, body };
        self.store.write_json(&dir.join(file), &local).await?;
        if !scripts.is_empty() {
            self.store
                .write_scripts(&dir.join(SCRIPTS_DIR), &scripts)
                .await?;
        }
        Ok(Some(dir))
    }
}

// ============================================================================
// Fetcher
// ============================================================================

/// Summary of a fetch
#[derive(Debug, Clone, Default)]
pub struct FetchReport {
    pub classes: u32,
    pub versions: u32,
    pub tasks: u32,
    /// Records that could not be written (non-fatal)
    pub skipped: Vec<String>,
}

/// Pulls remote entities and materializes them
pub struct Fetcher {
    gateway: Arc<dyn IRemoteGateway>,
    materializer: Materializer,
    page_size: u32,
}

impl Fetcher {
    pub fn new(gateway: Arc<dyn IRemoteGateway>, materializer: Materializer, page_size: u32) -> Self {
        Self {
            gateway,
            materializer,
            page_size,
        }
    }

    /// Every hit of `query`, across all pages
    pub async fn search_all(&self, kind: EntityKind, query: &Value) -> Result<Vec<Value>> {
        search_all(self.gateway.as_ref(), kind, query, self.page_size).await
    }

    /// Fetches every class and every process version with its tasks
    #[instrument(skip(self))]
    pub async fn fetch_all(&self) -> Result<FetchReport> {
        let mut report = FetchReport::default();
        self.fetch_classes(&mut report).await?;
        self.fetch_processes(&mut report).await?;
        info!(
            classes = report.classes,
            versions = report.versions,
            tasks = report.tasks,
            skipped = report.skipped.len(),
            "Fetch complete"
        );
        Ok(report)
    }

    /// Fetches every class
    pub async fn fetch_classes(&self, report: &mut FetchReport) -> Result<()> {
        for record in self.search_all(EntityKind::Class, &json!({})).await? {
            match self.materializer.write_class(&record).await {
                Ok(_) => report.classes += 1,
                Err(SyncError::Domain(e)) => {
                    warn!(error = %e, "Skipping class that cannot be placed on disk");
                    report.skipped.push(format!("class: {e}"));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Fetches every process version and its diagram tasks
    pub async fn fetch_processes(&self, report: &mut FetchReport) -> Result<()> {
        for record in self.search_all(EntityKind::ProcessVersion, &json!({})).await? {
            let dir = match self.materializer.write_version(&record).await {
                Ok(dir) => dir,
                Err(SyncError::Domain(e)) => {
                    warn!(error = %e, "Skipping process version that cannot be placed on disk");
                    report.skipped.push(format!("processVersion: {e}"));
                    continue;
                }
                Err(e) => return Err(e),
            };
            report.versions += 1;

            let Some(version_id) = record.get("id").and_then(Value::as_str) else {
                continue;
            };
            for task in self.version_tasks(version_id).await? {
                match self.materializer.write_task(&dir, &task).await {
                    Ok(_) => report.tasks += 1,
                    Err(SyncError::Domain(e)) => {
                        warn!(error = %e, "Skipping diagram task that cannot be placed on disk");
                        report.skipped.push(format!("diagramTask: {e}"));
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(())
    }

    async fn version_tasks(&self, version_id: &str) -> Result<Vec<Value>> {
        self.search_all(EntityKind::DiagramTask, &json!({ "versionId": version_id }))
            .await
    }

    /// Fetches a single entity by id and returns its folder
    ///
    /// A process version comes with its tasks; a task is placed under the
    /// folder of its version.
    #[instrument(skip(self))]
    pub async fn fetch_one(&self, kind: EntityKind, id: &RemoteId) -> Result<PathBuf> {
        let record = self.get(kind, id).await?;
        match kind {
            EntityKind::Class => self.materializer.write_class(&record).await,
            EntityKind::ProcessVersion => {
                let dir = self.materializer.write_version(&record).await?;
                for task in self.version_tasks(id.as_str()).await? {
                    self.materializer.write_task(&dir, &task).await?;
                }
                Ok(dir)
            }
            EntityKind::DiagramTask => {
                let version_id = record
                    .get("versionId")
                    .and_then(Value::as_str)
                    .map(|v| RemoteId::new(v.to_string()))
                    .transpose()?
                    .ok_or_else(|| SyncError::RemoteFetchFailed {
                        kind,
                        identity: id.to_string(),
                        message: "task has no versionId".to_string(),
                    })?;
                let version = self.get(EntityKind::ProcessVersion, &version_id).await?;
                let version_dir = self.materializer.version_dir(&version)?;
                self.materializer.write_task(&version_dir, &record).await
            }
        }
    }

    async fn get(&self, kind: EntityKind, id: &RemoteId) -> Result<Value> {
        self.gateway
            .get(kind.remote_class(), id)
            .await
            .map_err(|e| SyncError::RemoteFetchFailed {
                kind,
                identity: id.to_string(),
                message: remote_message(&e),
            })
    }

    /// The materializer used for writing
    pub fn materializer(&self) -> &Materializer {
        &self.materializer
    }
}

/// Collects every page of a search
pub(crate) async fn search_all(
    gateway: &dyn IRemoteGateway,
    kind: EntityKind,
    query: &Value,
    page_size: u32,
) -> Result<Vec<Value>> {
    let mut hits = Vec::new();
    gateway
        .search_paginated(kind.remote_class(), query, page_size, &mut |batch: Vec<Value>| {
            hits.extend(batch)
        })
        .await
        .map_err(|e| SyncError::RemoteFetchFailed {
            kind,
            identity: query.to_string(),
            message: remote_message(&e),
        })?;
    Ok(hits)
}
