//! New-folder scaffolding
//!
//! When a developer creates an empty entity folder, the minimal files that
//! make it syncable are written into it. Nothing is ever overwritten: a
//! folder created by `fetch` or copied in with content is left alone, and so
//! is one the materializer is still filling.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info};

use lcsync_core::domain::{EntityKind, EntityManifest, Identifier, SubElement, FIELD_SCHEMA_FILE};

use crate::resolver::{classify_dir, DirKind};
use crate::store::{script_file_name, to_pretty_json, ManifestStore, METHOD_FILE, ROLE_FILE, SCRIPTS_DIR};
use crate::Result;

/// Writes starter files into new entity folders
pub struct Scaffolder {
    store: Arc<ManifestStore>,
}

impl Scaffolder {
    pub fn new(store: Arc<ManifestStore>) -> Self {
        Self { store }
    }

    /// Scaffolds `dir` if it is an empty entity folder
    ///
    /// Returns the files created; empty when the folder is not an entity
    /// folder, is being materialized, is not empty, or disappeared.
    pub async fn scaffold(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let Some(kind) = classify_dir(dir) else {
            return Ok(Vec::new());
        };
        if self.store.is_materializing(dir) {
            debug!(dir = %dir.display(), "Folder is being materialized, not scaffolding");
            return Ok(Vec::new());
        }
        if !is_empty_dir(dir).await? {
            debug!(dir = %dir.display(), "Folder not empty, not scaffolding");
            return Ok(Vec::new());
        }
        let Some(name) = dir.file_name().and_then(|n| n.to_str()) else {
            return Ok(Vec::new());
        };
        let identifier = Identifier::new(name)?;

        let files: Vec<(PathBuf, Vec<u8>)> = match kind {
            DirKind::Method => vec![
                (dir.join(METHOD_FILE), to_pretty_json(&SubElement::new(identifier))?),
                (dir.join(SCRIPTS_DIR).join(script_file_name(1)), Vec::new()),
            ],
            DirKind::Role => vec![(dir.join(ROLE_FILE), to_pretty_json(&SubElement::new(identifier))?)],
            DirKind::Task => vec![
                (
                    dir.join(EntityKind::DiagramTask.manifest_file_name()),
                    to_pretty_json(&EntityManifest::draft(identifier, Map::new()))?,
                ),
                (dir.join(SCRIPTS_DIR).join(script_file_name(1)), Vec::new()),
            ],
            DirKind::Class => {
                let mut body = Map::new();
                if let Some(package) = dir.parent().and_then(|p| p.file_name()).and_then(|n| n.to_str()) {
                    body.insert("package".to_string(), Value::String(package.to_string()));
                }
                vec![
                    (
                        dir.join(EntityKind::Class.manifest_file_name()),
                        to_pretty_json(&EntityManifest::draft(identifier, body))?,
                    ),
                    (dir.join(FIELD_SCHEMA_FILE), Vec::new()),
                ]
            }
        };

        let mut created = Vec::new();
        for (path, data) in files {
            if self.store.is_materializing(dir) {
                break;
            }
            if self.store.create_new(&path, &data).await? {
                created.push(path);
            }
        }
        if !created.is_empty() {
            info!(dir = %dir.display(), kind = ?kind, files = created.len(), "Scaffolded new folder");
        }
        Ok(created)
    }
}

async fn is_empty_dir(dir: &Path) -> Result<bool> {
    match tokio::fs::read_dir(dir).await {
        Ok(mut entries) => Ok(entries.next_entry().await?.is_none()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
