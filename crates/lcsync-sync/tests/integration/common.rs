//! Shared test helpers for sync integration tests
//!
//! Provides an in-memory [`IRemoteGateway`] that applies patch operations the
//! way the platform does, plus helpers to lay out environment trees.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Context};
use serde_json::{json, Value};

use lcsync_core::domain::{OperationKind, PatchOperation, RemoteId};
use lcsync_core::ports::{AutoConfirm, IDeletionPrompt, IRemoteGateway};
use lcsync_sync::deletion::DeletionCoordinator;
use lcsync_sync::engine::SyncEngine;
use lcsync_sync::fetch::{Fetcher, Materializer};
use lcsync_sync::store::ManifestStore;

// ============================================================================
// MemoryGateway
// ============================================================================

/// Remote entity store held in memory
#[derive(Default)]
pub struct MemoryGateway {
    records: Mutex<HashMap<(String, String), Value>>,
    next_id: AtomicU64,
    pub gets: AtomicUsize,
    pub creates: AtomicUsize,
    pub searches: AtomicUsize,
    /// When set, `create` and `patch` answer with a server error
    pub fail_writes: AtomicBool,
    created_payloads: Mutex<Vec<Value>>,
    patches: Mutex<Vec<Vec<PatchOperation>>>,
}

impl MemoryGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Stores `record` under its `id`
    pub fn insert(&self, class: &str, record: Value) {
        let id = record["id"].as_str().expect("record has an id").to_string();
        self.records
            .lock()
            .unwrap()
            .insert((class.to_string(), id), record);
    }

    /// Current state of a record
    pub fn record(&self, class: &str, id: &str) -> Value {
        self.records
            .lock()
            .unwrap()
            .get(&(class.to_string(), id.to_string()))
            .cloned()
            .expect("record exists")
    }

    /// Every patch request received, in order
    pub fn patch_log(&self) -> Vec<Vec<PatchOperation>> {
        self.patches.lock().unwrap().clone()
    }

    /// Every create payload received, in order
    pub fn created_payloads(&self) -> Vec<Value> {
        self.created_payloads.lock().unwrap().clone()
    }

    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    pub fn patch_count(&self) -> usize {
        self.patches.lock().unwrap().len()
    }
}

fn bump_revision(record: &mut Value) {
    let next = record["revision"]
        .as_str()
        .and_then(|r| r.parse::<u64>().ok())
        .unwrap_or(0)
        + 1;
    record["revision"] = json!(next.to_string());
}

fn apply(record: &mut Value, operation: &PatchOperation) -> anyhow::Result<()> {
    let segments: Vec<&str> = operation
        .path
        .strip_prefix('/')
        .context("pointer must start with '/'")?
        .split('/')
        .collect();

    match segments.as_slice() {
        [key] => {
            let map = record.as_object_mut().context("record is not an object")?;
            let key = key.replace("~1", "/").replace("~0", "~");
            match operation.op {
                OperationKind::Remove => {
                    map.remove(&key);
                }
                OperationKind::Add | OperationKind::Replace => {
                    let value = operation.value.clone().context("missing value")?;
                    map.insert(key, value);
                }
            }
        }
        [array, position] => {
            let items = record
                .as_object_mut()
                .context("record is not an object")?
                .entry(array.to_string())
                .or_insert_with(|| json!([]))
                .as_array_mut()
                .context("not an array")?;
            match (operation.op, *position) {
                (OperationKind::Add, "-") => {
                    items.push(operation.value.clone().context("missing value")?)
                }
                (OperationKind::Replace, index) => {
                    let index: usize = index.parse()?;
                    let slot = items.get_mut(index).context("index out of range")?;
                    *slot = operation.value.clone().context("missing value")?;
                }
                (OperationKind::Remove, index) => {
                    let index: usize = index.parse()?;
                    if index >= items.len() {
                        bail!("index out of range");
                    }
                    items.remove(index);
                }
                (op, position) => bail!("unsupported {op} at {position}"),
            }
        }
        _ => bail!("unsupported pointer {}", operation.path),
    }
    Ok(())
}

fn matches_query(record: &Value, query: &Value) -> bool {
    query
        .as_object()
        .map(|q| q.iter().all(|(key, value)| record.get(key) == Some(value)))
        .unwrap_or(true)
}

#[async_trait::async_trait]
impl IRemoteGateway for MemoryGateway {
    async fn get(&self, entity_class: &str, id: &RemoteId) -> anyhow::Result<Value> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.records
            .lock()
            .unwrap()
            .get(&(entity_class.to_string(), id.to_string()))
            .cloned()
            .ok_or_else(|| anyhow!("404 {entity_class}/{id}"))
    }

    async fn create(&self, entity_class: &str, payload: &Value) -> anyhow::Result<Value> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("500 internal error");
        }
        self.created_payloads.lock().unwrap().push(payload.clone());

        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let mut record = payload.clone();
        record["id"] = json!(format!("{entity_class}-{n}"));
        record["revision"] = json!("1");
        self.insert(entity_class, record.clone());
        Ok(record)
    }

    async fn patch(
        &self,
        entity_class: &str,
        id: &RemoteId,
        operations: &[PatchOperation],
    ) -> anyhow::Result<Option<Value>> {
        self.patches.lock().unwrap().push(operations.to_vec());
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("500 internal error");
        }

        let mut records = self.records.lock().unwrap();
        let record = records
            .get_mut(&(entity_class.to_string(), id.to_string()))
            .ok_or_else(|| anyhow!("404 {entity_class}/{id}"))?;
        let mut updated = record.clone();
        for operation in operations {
            apply(&mut updated, operation)?;
        }
        bump_revision(&mut updated);
        *record = updated.clone();
        Ok(Some(updated))
    }

    async fn search_paginated(
        &self,
        entity_class: &str,
        query: &Value,
        page_size: u32,
        on_batch: &mut (dyn FnMut(Vec<Value>) + Send),
    ) -> anyhow::Result<()> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        let mut hits: Vec<Value> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|((class, _), record)| class == entity_class && matches_query(record, query))
            .map(|(_, record)| record.clone())
            .collect();
        hits.sort_by(|a, b| a["id"].as_str().cmp(&b["id"].as_str()));

        for page in hits.chunks(page_size.max(1) as usize) {
            on_batch(page.to_vec());
        }
        Ok(())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// Engine, store and gateway over one environment root
pub struct Harness {
    pub root: PathBuf,
    pub gateway: Arc<MemoryGateway>,
    pub store: Arc<ManifestStore>,
    pub engine: SyncEngine,
}

impl Harness {
    pub fn new(root: &Path) -> Self {
        Self::with_gateway(root, MemoryGateway::new())
    }

    pub fn with_gateway(root: &Path, gateway: Arc<MemoryGateway>) -> Self {
        let store = Arc::new(ManifestStore::new());
        let engine = SyncEngine::new(
            root.to_path_buf(),
            gateway.clone() as Arc<dyn IRemoteGateway>,
            Arc::clone(&store),
        );
        Self {
            root: root.to_path_buf(),
            gateway,
            store,
            engine,
        }
    }

    pub fn materializer(&self) -> Materializer {
        Materializer::new(self.root.clone(), Arc::clone(&self.store))
    }

    pub fn fetcher(&self, page_size: u32) -> Fetcher {
        Fetcher::new(
            self.gateway.clone() as Arc<dyn IRemoteGateway>,
            self.materializer(),
            page_size,
        )
    }

    pub fn deletion(&self, confirm: bool) -> DeletionCoordinator {
        self.deletion_with(Arc::new(AutoConfirm(confirm)))
    }

    pub fn deletion_with(&self, prompt: Arc<dyn IDeletionPrompt>) -> DeletionCoordinator {
        DeletionCoordinator::new(
            self.gateway.clone() as Arc<dyn IRemoteGateway>,
            Arc::clone(&self.store),
            self.materializer(),
            prompt,
            100,
        )
    }

    /// Folder of the `Pedido` class in package `vendas`
    pub fn class_dir(&self) -> PathBuf {
        self.root.join("classes/vendas/Pedido")
    }
}

/// Writes `text` to `path`, creating parent folders
pub fn write(path: &Path, text: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, text).unwrap();
}

pub fn read_json(path: &Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

/// Remote `Pedido` class record with the given methods
pub fn pedido_record(methods: Value) -> Value {
    json!({
        "id": "c-1",
        "revision": "1",
        "identifier": "Pedido",
        "package": "vendas",
        "label": "Pedido",
        "methods": methods,
        "fields": [],
        "createdAt": "2024-01-01T00:00:00Z"
    })
}

/// Publishes `record` remotely and writes its manifest locally
pub fn publish_class(harness: &Harness, record: Value) {
    harness.gateway.insert("class", record.clone());
    let mut manifest = record;
    let map = manifest.as_object_mut().unwrap();
    map.remove("methods");
    map.remove("fields");
    write(
        &harness.class_dir().join("class.json"),
        &serde_json::to_string_pretty(&manifest).unwrap(),
    );
}

/// Writes a method folder with the given scripts
pub fn write_method(class_dir: &Path, identifier: &str, scripts: &[&str]) -> PathBuf {
    let dir = class_dir.join("methods").join(identifier);
    write(
        &dir.join("method.json"),
        &json!({ "identifier": identifier }).to_string(),
    );
    for (i, script) in scripts.iter().enumerate() {
        write(&dir.join(format!("scripts/script_{}.js", i + 1)), script);
    }
    dir
}

/// Every file under `dir`, keyed by relative path
pub fn tree_snapshot(dir: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    fn walk(base: &Path, dir: &Path, out: &mut BTreeMap<PathBuf, Vec<u8>>) {
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                walk(base, &path, out);
            } else {
                let relative = path.strip_prefix(base).unwrap().to_path_buf();
                out.insert(relative, std::fs::read(&path).unwrap());
            }
        }
    }
    let mut out = BTreeMap::new();
    walk(dir, dir, &mut out);
    out
}
