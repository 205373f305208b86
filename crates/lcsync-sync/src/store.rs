//! Local manifest store
//!
//! Reads and writes the on-disk shadows of remote records: entity manifests
//! (`class.json`, `version.json`, `task.json`), sub-element files
//! (`method.json`, `role.json`), numbered script files and `fields.yaml`.
//!
//! ## Design Decisions
//!
//! - **Atomic writes**: write-to-temp + rename, so an editor or the watcher
//!   never observes a half-written manifest.
//! - **Per-path serialization**: every write to a given path goes through a
//!   per-path `tokio::sync::Mutex`, so two actions persisting the same
//!   manifest are applied one after the other.
//! - **Publish locks**: a second, independent per-manifest lock is held
//!   across read, `create` and persist, so a draft is created once even
//!   when several of its files sync at the same time.
//! - **Materializing marks**: folders being written from remote records are
//!   marked for the duration of the write, so the scaffolder does not mistake
//!   a freshly created, still empty folder for one a developer just made.
//! - **Stable output**: JSON is pretty-printed with a trailing newline, so a
//!   re-materialized folder is byte-identical to a fresh fetch.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, instrument};

use lcsync_core::domain::{
    strip_server_fields, EntityKind, EntityManifest, FieldSchema, SubElement, SubElementKind,
    FIELD_SCHEMA_FILE,
};

use crate::{Result, SyncError};

/// Folder holding numbered script files
pub const SCRIPTS_DIR: &str = "scripts";
/// Method file inside `methods/<id>/`
pub const METHOD_FILE: &str = "method.json";
/// Role file inside `roles/<id>/`
pub const ROLE_FILE: &str = "role.json";

const SCRIPT_PREFIX: &str = "script_";
const SCRIPT_SUFFIX: &str = ".js";

/// Parses `script_<n>.js` into `n`
pub fn parse_script_index(file_name: &str) -> Option<u32> {
    file_name
        .strip_prefix(SCRIPT_PREFIX)?
        .strip_suffix(SCRIPT_SUFFIX)?
        .parse()
        .ok()
}

/// File name of the `n`-th script (1-based)
pub fn script_file_name(n: usize) -> String {
    format!("{SCRIPT_PREFIX}{n}{SCRIPT_SUFFIX}")
}

/// File holding a sub-element of the given kind
///
/// Fields live in the class's `fields.yaml`, not in per-element folders.
pub fn sub_element_file(kind: SubElementKind) -> Option<&'static str> {
    match kind {
        SubElementKind::Method => Some(METHOD_FILE),
        SubElementKind::Role => Some(ROLE_FILE),
        SubElementKind::Field => None,
    }
}

/// Serializes `value` the way every file in the tree is written
pub fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// A sub-element as read from disk, ready for planning
#[derive(Debug, Clone, PartialEq)]
pub struct LocalElement {
    pub kind: SubElementKind,
    /// The element, with `scripts` filled in for methods
    pub element: SubElement,
    /// Whether there is anything local worth pushing (scripts for a method)
    pub has_content: bool,
}

// ============================================================================
// ManifestStore
// ============================================================================

/// Held while a folder is written from a remote record
#[derive(Debug)]
pub struct MaterializeGuard<'a> {
    store: &'a ManifestStore,
    dir: PathBuf,
}

impl Drop for MaterializeGuard<'_> {
    fn drop(&mut self) {
        let released = match self.store.materializing.get_mut(&self.dir) {
            Some(mut count) => {
                *count -= 1;
                *count == 0
            }
            None => false,
        };
        if released {
            self.store.materializing.remove_if(&self.dir, |_, count| *count == 0);
        }
    }
}

/// File I/O for the mirrored tree
///
/// Cheap to share behind an `Arc`; holds no state besides the write locks.
#[derive(Debug, Default)]
pub struct ManifestStore {
    write_locks: DashMap<PathBuf, Arc<Mutex<()>>>,
    publish_locks: DashMap<PathBuf, Arc<Mutex<()>>>,
    materializing: DashMap<PathBuf, usize>,
}

impl ManifestStore {
    /// Create a new `ManifestStore`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        self.write_locks
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Exclusive right to publish the entity behind `manifest_path`
    ///
    /// Separate from the write lock, which the holder still needs to persist
    /// the identity the server assigns.
    pub async fn lock_publish(&self, manifest_path: &Path) -> OwnedMutexGuard<()> {
        let lock = self
            .publish_locks
            .entry(manifest_path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Marks `dir` as being written from a remote record until the guard drops
    pub fn begin_materialize(&self, dir: &Path) -> MaterializeGuard<'_> {
        *self.materializing.entry(dir.to_path_buf()).or_insert(0) += 1;
        MaterializeGuard {
            store: self,
            dir: dir.to_path_buf(),
        }
    }

    /// Whether `path` or one of its ancestors is being materialized
    pub fn is_materializing(&self, path: &Path) -> bool {
        path.ancestors().any(|dir| self.materializing.contains_key(dir))
    }

    // ------------------------------------------------------------------------
    // Manifests
    // ------------------------------------------------------------------------

    /// Reads an entity manifest
    ///
    /// # Errors
    /// `ManifestMissing` if the file does not exist, `ConflictingLocalEdit` if
    /// it is not a valid manifest
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn read_manifest(&self, path: &Path) -> Result<EntityManifest> {
        read_json_file(path).await
    }

    /// Overwrites a manifest with `manifest`
    #[instrument(skip(self, manifest), fields(path = %path.display()))]
    pub async fn write_manifest(&self, path: &Path, manifest: &EntityManifest) -> Result<()> {
        let lock = self.lock_for(path);
        let _guard = lock.lock().await;
        write_atomic(path, &to_pretty_json(manifest)?).await
    }

    /// Read-modify-write of a manifest under its write lock
    ///
    /// Returns the manifest as written.
    #[instrument(skip(self, update), fields(path = %path.display()))]
    pub async fn update_manifest<F>(&self, path: &Path, update: F) -> Result<EntityManifest>
    where
        F: FnOnce(&mut EntityManifest) + Send,
    {
        let lock = self.lock_for(path);
        let _guard = lock.lock().await;
        let mut manifest: EntityManifest = read_json_file(path).await?;
        update(&mut manifest);
        write_atomic(path, &to_pretty_json(&manifest)?).await?;
        Ok(manifest)
    }

    /// Manifest plus the editable record body as seen locally
    ///
    /// The body excludes server-managed keys. For diagram tasks it includes the
    /// `scripts` array read from the task's `scripts/` folder.
    pub async fn read_entity_body(
        &self,
        kind: EntityKind,
        manifest_path: &Path,
    ) -> Result<(EntityManifest, Map<String, Value>)> {
        let manifest = self.read_manifest(manifest_path).await?;
        let mut body = match manifest.to_value() {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        strip_server_fields(&mut body);

        if kind == EntityKind::DiagramTask {
            let dir = parent_dir(manifest_path)?;
            let scripts = self
                .read_scripts(&dir.join(SCRIPTS_DIR))
                .await?
                .unwrap_or_default();
            body.insert("scripts".to_string(), scripts_value(&scripts));
        }

        Ok((manifest, body))
    }

    /// Builds the full record of a draft entity from disk, for `create`
    ///
    /// Server-managed keys are stripped. Sub-elements and scripts are read
    /// from their folders; system methods with no scripts are left out.
    #[instrument(skip(self), fields(path = %manifest_path.display()))]
    pub async fn assemble_entity(&self, kind: EntityKind, manifest_path: &Path) -> Result<Value> {
        let manifest = self.read_manifest(manifest_path).await?;
        let mut record = manifest.to_create_payload();
        let dir = parent_dir(manifest_path)?;

        match kind {
            EntityKind::Class => {
                let methods = self
                    .read_sub_elements(SubElementKind::Method, &dir)
                    .await?
                    .into_iter()
                    .filter(|local| local.has_content || !local.element.identifier.is_system())
                    .map(|local| local.element.to_value())
                    .collect();
                record.insert("methods".to_string(), Value::Array(methods));

                let schema = self.read_field_schema(&dir.join(FIELD_SCHEMA_FILE)).await?;
                let fields = schema.fields().iter().map(|f| f.to_remote()).collect();
                record.insert("fields".to_string(), Value::Array(fields));
            }
            EntityKind::ProcessVersion => {
                let roles = self
                    .read_sub_elements(SubElementKind::Role, &dir)
                    .await?
                    .into_iter()
                    .map(|local| local.element.to_value())
                    .collect();
                record.insert("roles".to_string(), Value::Array(roles));
            }
            EntityKind::DiagramTask => {
                let scripts = self
                    .read_scripts(&dir.join(SCRIPTS_DIR))
                    .await?
                    .unwrap_or_default();
                record.insert("scripts".to_string(), scripts_value(&scripts));
            }
        }

        Ok(Value::Object(record))
    }

    // ------------------------------------------------------------------------
    // Sub-elements
    // ------------------------------------------------------------------------

    /// Reads the method or role stored in `dir`
    ///
    /// # Errors
    /// `ManifestMissing` if the element file is absent; `ConflictingLocalEdit`
    /// for fields, which have no element folder, or for malformed files
    #[instrument(skip(self), fields(dir = %dir.display()))]
    pub async fn read_sub_element(&self, kind: SubElementKind, dir: &Path) -> Result<LocalElement> {
        let file = sub_element_file(kind).ok_or_else(|| SyncError::ConflictingLocalEdit {
            path: dir.to_path_buf(),
            message: format!("{kind} elements have no folder"),
        })?;
        let mut element: SubElement = read_json_file(&dir.join(file)).await?;

        let has_content = match kind {
            SubElementKind::Method => {
                let scripts = self
                    .read_scripts(&dir.join(SCRIPTS_DIR))
                    .await?
                    .unwrap_or_default();
                let has_scripts = !scripts.is_empty();
                element
                    .body
                    .insert("scripts".to_string(), scripts_value(&scripts));
                has_scripts
            }
            _ => !element.body.is_empty(),
        };

        Ok(LocalElement {
            kind,
            element,
            has_content,
        })
    }

    /// Reads every element folder under `<owner_dir>/<array>/`, sorted by name
    pub async fn read_sub_elements(
        &self,
        kind: SubElementKind,
        owner_dir: &Path,
    ) -> Result<Vec<LocalElement>> {
        let mut elements = Vec::new();
        for dir in subdirectories(&owner_dir.join(kind.array_name())).await? {
            match self.read_sub_element(kind, &dir).await {
                Ok(local) => elements.push(local),
                Err(SyncError::ManifestMissing(path)) => {
                    debug!(path = %path.display(), "Skipping element folder without element file");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(elements)
    }

    // ------------------------------------------------------------------------
    // Scripts
    // ------------------------------------------------------------------------

    /// Reads `script_<n>.js` files ordered by `n`
    ///
    /// Returns `None` when the folder does not exist. Other files are ignored.
    pub async fn read_scripts(&self, scripts_dir: &Path) -> Result<Option<Vec<String>>> {
        let mut entries = match tokio::fs::read_dir(scripts_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut numbered = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(index) = name.to_str().and_then(parse_script_index) else {
                continue;
            };
            if entry.file_type().await?.is_file() {
                numbered.push((index, entry.path()));
            }
        }
        numbered.sort_by_key(|(index, _)| *index);

        let mut scripts = Vec::with_capacity(numbered.len());
        for (_, path) in numbered {
            scripts.push(tokio::fs::read_to_string(&path).await?);
        }
        Ok(Some(scripts))
    }

    /// Writes `scripts` as `script_1.js`, `script_2.js`, ...
    ///
    /// Numbered scripts beyond the new count are removed.
    pub async fn write_scripts(&self, scripts_dir: &Path, scripts: &[String]) -> Result<()> {
        tokio::fs::create_dir_all(scripts_dir).await?;

        let mut entries = tokio::fs::read_dir(scripts_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let stale = entry
                .file_name()
                .to_str()
                .and_then(parse_script_index)
                .is_some_and(|n| n == 0 || n as usize > scripts.len());
            if stale {
                tokio::fs::remove_file(entry.path()).await?;
            }
        }

        for (i, script) in scripts.iter().enumerate() {
            self.write_file(&scripts_dir.join(script_file_name(i + 1)), script.as_bytes())
                .await?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Field schema
    // ------------------------------------------------------------------------

    /// Parses `fields.yaml`; a missing file is an empty schema
    ///
    /// # Errors
    /// `ConflictingLocalEdit` when the schema does not parse or validate
    pub async fn read_field_schema(&self, path: &Path) -> Result<FieldSchema> {
        let text = match tokio::fs::read_to_string(path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(FieldSchema::default()),
            Err(e) => return Err(e.into()),
        };
        FieldSchema::parse(&text).map_err(|e| SyncError::ConflictingLocalEdit {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    // ------------------------------------------------------------------------
    // Raw writes
    // ------------------------------------------------------------------------

    /// Writes `value` as pretty JSON
    pub async fn write_json<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<()> {
        self.write_file(path, &to_pretty_json(value)?).await
    }

    /// Atomically replaces `path` with `data` under the path's write lock
    pub async fn write_file(&self, path: &Path, data: &[u8]) -> Result<()> {
        let lock = self.lock_for(path);
        let _guard = lock.lock().await;
        write_atomic(path, data).await
    }

    /// Creates `path` with `data` unless it already exists
    ///
    /// Returns `false` and leaves the file alone if it exists.
    pub async fn create_new(&self, path: &Path, data: &[u8]) -> Result<bool> {
        use tokio::io::AsyncWriteExt;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        file.write_all(data).await?;
        file.flush().await?;
        Ok(true)
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Write to a temporary file in the same directory, then rename over the target.
async fn write_atomic(target: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let tmp_path = {
        let mut p = target.as_os_str().to_owned();
        p.push(".tmp");
        PathBuf::from(p)
    };

    debug!(path = %target.display(), bytes = data.len(), "writing file");
    tokio::fs::write(&tmp_path, data).await?;
    tokio::fs::rename(&tmp_path, target).await?;
    Ok(())
}

async fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(SyncError::ManifestMissing(path.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };
    serde_json::from_str(&text).map_err(|e| SyncError::ConflictingLocalEdit {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Child directories of `dir` sorted by name; empty if `dir` does not exist
pub(crate) async fn subdirectories(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut dirs = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn parent_dir(path: &Path) -> Result<PathBuf> {
    path.parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| SyncError::ManifestMissing(path.to_path_buf()))
}

fn scripts_value(scripts: &[String]) -> Value {
    Value::Array(scripts.iter().cloned().map(Value::String).collect())
}
