//! Integration tests for draft publishing and sync-once

use serde_json::json;
use tempfile::TempDir;

use lcsync_core::domain::EntityKind;
use lcsync_sync::engine::SyncOutcome;
use lcsync_sync::SyncError;

use crate::common::{self, Harness};

fn write_draft_class(harness: &Harness) {
    common::write(
        &harness.class_dir().join("class.json"),
        &serde_json::to_string_pretty(&json!({
            "id": "",
            "revision": "draft",
            "identifier": "Pedido",
            "package": "vendas",
            "label": "Pedido",
            "createdAt": "2024-01-01T00:00:00Z",
            "updatedBy": "someone"
        }))
        .unwrap(),
    );
    common::write(
        &harness.class_dir().join("fields.yaml"),
        "- identifier: codigo\n  type: string\n",
    );
    common::write_method(&harness.class_dir(), "calcular", &["return 1;", "return 2;"]);
    common::write_method(&harness.class_dir(), "_onCreate", &[]);
}

#[tokio::test]
async fn test_draft_is_created_once_with_full_body() {
    let tmp = TempDir::new().unwrap();
    let harness = Harness::new(tmp.path());
    write_draft_class(&harness);
    let method_file = harness.class_dir().join("methods/calcular/method.json");

    let outcome = harness.engine.sync_path(&method_file).await.unwrap();

    let SyncOutcome::Created { kind, remote_id } = outcome else {
        panic!("expected a create, got {outcome:?}");
    };
    assert_eq!(kind, EntityKind::Class);
    assert_eq!(harness.gateway.create_count(), 1);

    let payload = &harness.gateway.created_payloads()[0];
    for server_field in ["id", "revision", "createdAt", "updatedBy"] {
        assert!(payload.get(server_field).is_none(), "{server_field} was sent");
    }
    assert_eq!(payload["identifier"], "Pedido");
    assert_eq!(
        payload["methods"],
        json!([{"identifier": "calcular", "scripts": ["return 1;", "return 2;"]}])
    );
    assert_eq!(
        payload["fields"],
        json!([{"identifier": "codigo", "type": "string"}])
    );

    let manifest = common::read_json(&harness.class_dir().join("class.json"));
    assert_eq!(manifest["id"], remote_id.as_str());
    assert_eq!(manifest["revision"], "1");

    // the entity now exists and already carries the method
    let again = harness.engine.sync_path(&method_file).await.unwrap();
    assert_eq!(again, SyncOutcome::Unchanged);
    assert_eq!(harness.gateway.create_count(), 1);
}

#[tokio::test]
async fn test_failed_create_leaves_manifest_untouched() {
    let tmp = TempDir::new().unwrap();
    let harness = Harness::new(tmp.path());
    write_draft_class(&harness);
    harness.gateway.fail_writes();
    let manifest_path = harness.class_dir().join("class.json");
    let before = std::fs::read(&manifest_path).unwrap();

    let err = harness.engine.sync_path(&manifest_path).await.unwrap_err();

    assert!(matches!(
        err,
        SyncError::RemoteCreateFailed {
            kind: EntityKind::Class,
            ..
        }
    ));
    assert_eq!(std::fs::read(&manifest_path).unwrap(), before);
}

#[tokio::test]
async fn test_sync_all_creates_owner_before_children() {
    let tmp = TempDir::new().unwrap();
    let harness = Harness::new(tmp.path());
    write_draft_class(&harness);

    let report = harness.engine.sync_all().await.unwrap();

    assert!(report.errors.is_empty(), "{:?}", report.errors);
    assert_eq!(report.visited, 4);
    assert_eq!(report.created, 1);
    assert_eq!(report.patched, 0);
    assert_eq!(harness.gateway.create_count(), 1);
    assert_eq!(harness.gateway.patch_count(), 0);
}

#[tokio::test]
async fn test_draft_task_needs_published_version() {
    let tmp = TempDir::new().unwrap();
    let harness = Harness::new(tmp.path());
    let version_dir = tmp.path().join("processes/rh/ferias/v1");
    let version_manifest = version_dir.join("version.json");
    common::write(
        &version_manifest,
        &json!({"id": "", "revision": "draft", "identifier": "v1"}).to_string(),
    );
    let task_dir = version_dir.join("tasks/aprovar");
    common::write(
        &task_dir.join("task.json"),
        &json!({"id": "", "revision": "draft", "identifier": "aprovar"}).to_string(),
    );
    common::write(&task_dir.join("scripts/script_1.js"), "approve();");
    let task_script = task_dir.join("scripts/script_1.js");

    let err = harness.engine.sync_path(&task_script).await.unwrap_err();
    assert!(matches!(err, SyncError::RemoteCreateFailed { .. }));
    assert_eq!(harness.gateway.create_count(), 0);

    // publishing the version unblocks the task
    let created = harness.engine.sync_path(&version_manifest).await.unwrap();
    let SyncOutcome::Created { remote_id: version_id, .. } = created else {
        panic!("expected the version to be created");
    };
    harness.engine.sync_path(&task_script).await.unwrap();

    let payloads = harness.gateway.created_payloads();
    assert_eq!(payloads.len(), 2);
    assert_eq!(payloads[1]["versionId"], version_id.as_str());
    assert_eq!(payloads[1]["scripts"], json!(["approve();"]));
}

#[tokio::test]
async fn test_task_scripts_patch_the_task() {
    let tmp = TempDir::new().unwrap();
    let harness = Harness::new(tmp.path());
    harness.gateway.insert(
        "diagramTask",
        json!({"id": "t-1", "revision": "3", "identifier": "aprovar", "scripts": ["old();"]}),
    );
    let task_dir = tmp.path().join("processes/rh/ferias/v1/tasks/aprovar");
    common::write(
        &task_dir.join("task.json"),
        &json!({"id": "t-1", "revision": "3", "identifier": "aprovar"}).to_string(),
    );
    common::write(&task_dir.join("scripts/script_1.js"), "new();");

    let outcome = harness
        .engine
        .sync_path(&task_dir.join("scripts/script_1.js"))
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        SyncOutcome::Patched {
            kind: EntityKind::DiagramTask,
            operations: 1,
            ..
        }
    ));
    assert_eq!(
        harness.gateway.record("diagramTask", "t-1")["scripts"],
        json!(["new();"])
    );
    assert_eq!(common::read_json(&task_dir.join("task.json"))["revision"], "4");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_syncs_of_one_draft_create_it_once() {
    let tmp = TempDir::new().unwrap();
    let harness = Harness::new(tmp.path());
    write_draft_class(&harness);
    let manifest_path = harness.class_dir().join("class.json");
    let fields_path = harness.class_dir().join("fields.yaml");

    let (a, b) = tokio::join!(
        harness.engine.sync_path(&manifest_path),
        harness.engine.sync_path(&fields_path)
    );
    let outcomes = [a.unwrap(), b.unwrap()];

    assert_eq!(harness.gateway.create_count(), 1);
    let created: Vec<_> = outcomes
        .iter()
        .filter(|o| matches!(o, SyncOutcome::Created { .. }))
        .collect();
    assert_eq!(created.len(), 1, "{outcomes:?}");

    let manifest = common::read_json(&manifest_path);
    assert_eq!(manifest["id"], "class-1");
}
