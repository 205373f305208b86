//! Integration tests for the deletion coordinator

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use lcsync_core::domain::{OperationKind, SubElementKind};
use lcsync_core::ports::{DeletionRequest, IDeletionPrompt};
use lcsync_sync::deletion::DeletionOutcome;
use lcsync_sync::SyncError;

use crate::common::{self, Harness, MemoryGateway};

fn three_methods() -> serde_json::Value {
    common::pedido_record(json!([
        {"identifier": "a", "scripts": ["a();"]},
        {"identifier": "calcular", "scripts": ["return 1;", "return 2;"]},
        {"identifier": "b", "scripts": ["b();"]},
    ]))
}

#[tokio::test]
async fn test_confirmed_deletion_removes_at_fresh_index() {
    let tmp = TempDir::new().unwrap();
    let harness = Harness::new(tmp.path());
    common::publish_class(&harness, three_methods());
    let removed = harness.class_dir().join("methods/calcular");

    let outcome = harness
        .deletion(true)
        .handle_removed_dir(&removed)
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        DeletionOutcome::Removed {
            kind: SubElementKind::Method,
            ..
        }
    ));
    let log = harness.gateway.patch_log();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0][0].op, OperationKind::Remove);
    assert_eq!(log[0][0].path, "/methods/1");
    assert!(log[0][0].value.is_none());

    let remote = harness.gateway.record("class", "c-1");
    assert_eq!(
        remote["methods"],
        json!([
            {"identifier": "a", "scripts": ["a();"]},
            {"identifier": "b", "scripts": ["b();"]},
        ])
    );
    assert_eq!(
        common::read_json(&harness.class_dir().join("class.json"))["revision"],
        "2"
    );
    assert!(!removed.exists());
}

#[tokio::test]
async fn test_confirmed_deletion_failure_does_not_restore() {
    let tmp = TempDir::new().unwrap();
    let harness = Harness::new(tmp.path());
    common::publish_class(&harness, three_methods());
    harness.gateway.fail_writes();
    let removed = harness.class_dir().join("methods/calcular");

    let err = harness
        .deletion(true)
        .handle_removed_dir(&removed)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::RemotePatchFailed { .. }));
    assert!(!removed.exists());
}

#[tokio::test]
async fn test_declined_deletion_matches_fresh_fetch() {
    let gateway = MemoryGateway::new();

    // reference tree: a plain fetch
    let reference = TempDir::new().unwrap();
    let reference_harness = Harness::with_gateway(reference.path(), gateway.clone());
    common::publish_class(&reference_harness, three_methods());
    reference_harness.fetcher(100).fetch_all().await.unwrap();

    // working tree: same fetch, then a folder is removed and the removal declined
    let working = TempDir::new().unwrap();
    let harness = Harness::with_gateway(working.path(), gateway);
    harness.fetcher(100).fetch_all().await.unwrap();
    let removed = harness.class_dir().join("methods/calcular");
    std::fs::remove_dir_all(&removed).unwrap();

    let outcome = harness
        .deletion(false)
        .handle_removed_dir(&removed)
        .await
        .unwrap();

    assert_eq!(outcome, DeletionOutcome::RolledBack(removed.clone()));
    assert_eq!(
        common::tree_snapshot(working.path()),
        common::tree_snapshot(reference.path())
    );
    assert_eq!(harness.gateway.patch_count(), 0);
}

#[tokio::test]
async fn test_element_already_absent_remotely() {
    let tmp = TempDir::new().unwrap();
    let harness = Harness::new(tmp.path());
    common::publish_class(&harness, common::pedido_record(json!([])));

    let outcome = harness
        .deletion(true)
        .handle_removed_dir(&harness.class_dir().join("methods/calcular"))
        .await
        .unwrap();

    assert_eq!(outcome, DeletionOutcome::AlreadyAbsent);
    assert_eq!(harness.gateway.patch_count(), 0);
}

#[tokio::test]
async fn test_unpublished_owner_needs_nothing() {
    let tmp = TempDir::new().unwrap();
    let harness = Harness::new(tmp.path());
    common::write(
        &harness.class_dir().join("class.json"),
        &json!({"id": "", "revision": "draft", "identifier": "Pedido"}).to_string(),
    );

    let outcome = harness
        .deletion(true)
        .handle_removed_dir(&harness.class_dir().join("methods/calcular"))
        .await
        .unwrap();

    assert_eq!(outcome, DeletionOutcome::Unpublished);
    assert_eq!(harness.gateway.get_count(), 0);
}

#[tokio::test]
async fn test_owner_gone_is_ignorable() {
    let tmp = TempDir::new().unwrap();
    let harness = Harness::new(tmp.path());

    let err = harness
        .deletion(true)
        .handle_removed_dir(&harness.class_dir().join("methods/calcular"))
        .await
        .unwrap_err();

    assert!(err.is_ignorable());
}

#[tokio::test]
async fn test_removed_role_is_removed_from_version() {
    let tmp = TempDir::new().unwrap();
    let harness = Harness::new(tmp.path());
    harness.gateway.insert(
        "processVersion",
        json!({
            "id": "v-1",
            "revision": "2",
            "identifier": "v1",
            "roles": [{"identifier": "gestor"}, {"identifier": "analista"}]
        }),
    );
    let version_dir = tmp.path().join("processes/rh/ferias/v1");
    common::write(
        &version_dir.join("version.json"),
        &json!({"id": "v-1", "revision": "2", "identifier": "v1"}).to_string(),
    );

    harness
        .deletion(true)
        .handle_removed_dir(&version_dir.join("roles/analista"))
        .await
        .unwrap();

    assert_eq!(harness.gateway.patch_log()[0][0].path, "/roles/1");
    assert_eq!(
        harness.gateway.record("processVersion", "v-1")["roles"],
        json!([{"identifier": "gestor"}])
    );
}

#[tokio::test]
async fn test_task_folder_deletion() {
    let tmp = TempDir::new().unwrap();
    let harness = Harness::new(tmp.path());
    harness.gateway.insert(
        "diagramTask",
        json!({
            "id": "t-1",
            "revision": "1",
            "identifier": "aprovar",
            "versionId": "v-1",
            "scripts": ["approve();"]
        }),
    );
    let version_dir = tmp.path().join("processes/rh/ferias/v1");
    common::write(
        &version_dir.join("version.json"),
        &json!({"id": "v-1", "revision": "2", "identifier": "v1"}).to_string(),
    );
    let task_dir = version_dir.join("tasks/aprovar");

    let confirmed = harness
        .deletion(true)
        .handle_removed_dir(&task_dir)
        .await
        .unwrap();
    assert_eq!(confirmed, DeletionOutcome::Ignored);
    assert!(!task_dir.exists());

    let declined = harness
        .deletion(false)
        .handle_removed_dir(&task_dir)
        .await
        .unwrap();
    assert_eq!(declined, DeletionOutcome::RolledBack(task_dir.clone()));
    assert_eq!(
        std::fs::read_to_string(task_dir.join("scripts/script_1.js")).unwrap(),
        "approve();"
    );
    assert_eq!(harness.gateway.patch_count(), 0);
}

/// Confirms, but only after the owner folder has been removed as well
struct OwnerRemovedWhileAsking(PathBuf);

#[async_trait::async_trait]
impl IDeletionPrompt for OwnerRemovedWhileAsking {
    async fn confirm(&self, _: &DeletionRequest) -> anyhow::Result<bool> {
        std::fs::remove_dir_all(&self.0)?;
        Ok(true)
    }
}

/// Never answers
struct SilentPrompt;

#[async_trait::async_trait]
impl IDeletionPrompt for SilentPrompt {
    async fn confirm(&self, _: &DeletionRequest) -> anyhow::Result<bool> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn test_owner_removed_during_prompt_keeps_remote_elements() {
    let tmp = TempDir::new().unwrap();
    let harness = Harness::new(tmp.path());
    common::publish_class(&harness, three_methods());
    let prompt = Arc::new(OwnerRemovedWhileAsking(harness.class_dir()));

    let err = harness
        .deletion_with(prompt)
        .handle_removed_dir(&harness.class_dir().join("methods/calcular"))
        .await
        .unwrap_err();

    assert!(err.is_ignorable());
    assert_eq!(harness.gateway.patch_count(), 0);
    assert_eq!(
        harness.gateway.record("class", "c-1")["methods"]
            .as_array()
            .unwrap()
            .len(),
        3
    );
}

#[tokio::test]
async fn test_shutdown_abandons_unanswered_deletion() {
    let tmp = TempDir::new().unwrap();
    let harness = Harness::new(tmp.path());
    common::publish_class(&harness, three_methods());
    let shutdown = CancellationToken::new();
    let coordinator = harness
        .deletion_with(Arc::new(SilentPrompt))
        .with_shutdown(shutdown.clone());
    let removed = harness.class_dir().join("methods/calcular");

    let pending = coordinator.handle_removed_dir(&removed);
    shutdown.cancel();
    let outcome = tokio::time::timeout(Duration::from_secs(5), pending)
        .await
        .expect("an open question does not hold up shutdown")
        .unwrap();

    assert_eq!(outcome, DeletionOutcome::Undecided);
    assert_eq!(harness.gateway.get_count(), 0);
    assert_eq!(harness.gateway.patch_count(), 0);
    assert!(!removed.exists());
}
