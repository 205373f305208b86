//! Integration tests for per-path sync of published entities

use serde_json::json;
use tempfile::TempDir;

use lcsync_core::domain::{EntityKind, OperationKind, PatchOperation, RemoteId, SubElementKind};
use lcsync_core::ports::IRemoteGateway;
use lcsync_sync::engine::SyncOutcome;
use lcsync_sync::planner::plan_sub_element;
use lcsync_sync::SyncError;

use crate::common::{self, Harness};

// ============================================================================
// Methods
// ============================================================================

#[tokio::test]
async fn test_new_method_scripts_are_added() {
    let tmp = TempDir::new().unwrap();
    let harness = Harness::new(tmp.path());
    common::publish_class(&harness, common::pedido_record(json!([{"identifier": "outro"}])));
    let method_dir = common::write_method(
        &harness.class_dir(),
        "calcular",
        &["return 1;", "return 2;"],
    );

    let outcome = harness
        .engine
        .sync_path(&method_dir.join("scripts/script_2.js"))
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        SyncOutcome::Patched {
            kind: EntityKind::Class,
            operations: 1,
            ..
        }
    ));
    let log = harness.gateway.patch_log();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0][0].op, OperationKind::Add);
    assert_eq!(log[0][0].path, "/methods/-");

    let remote = harness.gateway.record("class", "c-1");
    assert_eq!(
        remote["methods"][1],
        json!({"identifier": "calcular", "scripts": ["return 1;", "return 2;"]})
    );
    // the revision answered by the server is persisted
    let manifest = common::read_json(&harness.class_dir().join("class.json"));
    assert_eq!(manifest["revision"], "2");
}

#[tokio::test]
async fn test_existing_method_is_replaced_at_current_index() {
    let tmp = TempDir::new().unwrap();
    let harness = Harness::new(tmp.path());
    common::publish_class(
        &harness,
        common::pedido_record(json!([
            {"identifier": "outro", "scripts": []},
            {"identifier": "calcular", "scripts": ["return 0;"]},
        ])),
    );
    let method_dir = common::write_method(
        &harness.class_dir(),
        "calcular",
        &["return 1;", "return 2;"],
    );

    harness
        .engine
        .sync_path(&method_dir.join("scripts/script_1.js"))
        .await
        .unwrap();

    let log = harness.gateway.patch_log();
    assert_eq!(log[0][0].op, OperationKind::Replace);
    assert_eq!(log[0][0].path, "/methods/1");
    assert_eq!(
        harness.gateway.record("class", "c-1")["methods"][1]["scripts"],
        json!(["return 1;", "return 2;"])
    );
}

#[tokio::test]
async fn test_sync_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let harness = Harness::new(tmp.path());
    common::publish_class(&harness, common::pedido_record(json!([])));
    let method_dir = common::write_method(&harness.class_dir(), "calcular", &["return 1;"]);
    let method_file = method_dir.join("method.json");

    let first = harness.engine.sync_path(&method_file).await.unwrap();
    let second = harness.engine.sync_path(&method_file).await.unwrap();
    let third = harness.engine.sync_path(&method_file).await.unwrap();

    assert!(matches!(first, SyncOutcome::Patched { .. }));
    assert_eq!(second, SyncOutcome::Unchanged);
    assert_eq!(third, SyncOutcome::Unchanged);
    assert_eq!(harness.gateway.patch_count(), 1);
}

#[tokio::test]
async fn test_system_method_without_scripts_sends_nothing() {
    let tmp = TempDir::new().unwrap();
    let harness = Harness::new(tmp.path());
    common::publish_class(&harness, common::pedido_record(json!([])));
    let method_dir = common::write_method(&harness.class_dir(), "_onCreate", &[]);

    let outcome = harness
        .engine
        .sync_path(&method_dir.join("method.json"))
        .await
        .unwrap();

    assert_eq!(outcome, SyncOutcome::Skipped);
    assert_eq!(harness.gateway.patch_count(), 0);
}

#[tokio::test]
async fn test_scripts_are_sent_in_numeric_order() {
    let tmp = TempDir::new().unwrap();
    let harness = Harness::new(tmp.path());
    common::publish_class(&harness, common::pedido_record(json!([])));
    let scripts: Vec<String> = (1..=11).map(|n| format!("step({n});")).collect();
    let refs: Vec<&str> = scripts.iter().map(String::as_str).collect();
    let method_dir = common::write_method(&harness.class_dir(), "calcular", &refs);

    harness
        .engine
        .sync_path(&method_dir.join("scripts/script_10.js"))
        .await
        .unwrap();

    let remote = harness.gateway.record("class", "c-1");
    assert_eq!(remote["methods"][0]["scripts"], json!(scripts));
}

// ============================================================================
// Fields and metadata
// ============================================================================

#[tokio::test]
async fn test_fields_are_planned_against_the_snapshot() {
    let tmp = TempDir::new().unwrap();
    let harness = Harness::new(tmp.path());
    let mut record = common::pedido_record(json!([]));
    record["fields"] = json!([
        {"identifier": "_status", "type": "string"},
        {"identifier": "codigo", "type": "string"},
    ]);
    common::publish_class(&harness, record);
    let schema = harness.class_dir().join("fields.yaml");
    common::write(
        &schema,
        "- identifier: codigo\n  type: integer\n- identifier: valor\n  type: number\n",
    );

    let outcome = harness.engine.sync_path(&schema).await.unwrap();

    assert!(matches!(outcome, SyncOutcome::Patched { operations: 2, .. }));
    let remote = harness.gateway.record("class", "c-1");
    assert_eq!(
        remote["fields"],
        json!([
            {"identifier": "_status", "type": "string"},
            {"identifier": "codigo", "type": "integer"},
            {"identifier": "valor", "type": "number"},
        ])
    );
}

#[tokio::test]
async fn test_invalid_field_schema_makes_no_remote_call() {
    let tmp = TempDir::new().unwrap();
    let harness = Harness::new(tmp.path());
    common::publish_class(&harness, common::pedido_record(json!([])));
    let schema = harness.class_dir().join("fields.yaml");
    common::write(&schema, "- identifier: codigo\n  type: [unclosed\n");

    let err = harness.engine.sync_path(&schema).await.unwrap_err();

    assert!(matches!(err, SyncError::ConflictingLocalEdit { .. }));
    assert_eq!(harness.gateway.get_count(), 0);
    assert_eq!(harness.gateway.patch_count(), 0);
}

#[tokio::test]
async fn test_manifest_metadata_is_patched() {
    let tmp = TempDir::new().unwrap();
    let harness = Harness::new(tmp.path());
    common::publish_class(&harness, common::pedido_record(json!([])));
    let manifest = harness.class_dir().join("class.json");
    let mut local = common::read_json(&manifest);
    local["label"] = json!("Pedido de venda");
    common::write(&manifest, &serde_json::to_string_pretty(&local).unwrap());

    harness.engine.sync_path(&manifest).await.unwrap();

    let log = harness.gateway.patch_log();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].len(), 1);
    assert_eq!(log[0][0].op, OperationKind::Replace);
    assert_eq!(log[0][0].path, "/label");
    assert_eq!(
        harness.gateway.record("class", "c-1")["label"],
        "Pedido de venda"
    );
}

// ============================================================================
// Resolution failures
// ============================================================================

#[tokio::test]
async fn test_unrecognized_and_orphan_paths() {
    let tmp = TempDir::new().unwrap();
    let harness = Harness::new(tmp.path());

    let notes = tmp.path().join("notes.md");
    common::write(&notes, "todo");
    assert_eq!(
        harness.engine.sync_path(&notes).await.unwrap(),
        SyncOutcome::Ignored
    );

    let orphan = common::write_method(&tmp.path().join("loose"), "calcular", &["x"]);
    let err = harness
        .engine
        .sync_path(&orphan.join("method.json"))
        .await
        .unwrap_err();
    assert!(err.is_ignorable());
    assert_eq!(harness.gateway.get_count(), 0);
}

#[tokio::test]
async fn test_remote_fetch_failure_keeps_manifest() {
    let tmp = TempDir::new().unwrap();
    let harness = Harness::new(tmp.path());
    common::publish_class(&harness, common::pedido_record(json!([])));
    // the local manifest points at a record the remote does not have
    let manifest = harness.class_dir().join("class.json");
    let mut local = common::read_json(&manifest);
    local["id"] = json!("c-404");
    common::write(&manifest, &serde_json::to_string_pretty(&local).unwrap());
    let method_dir = common::write_method(&harness.class_dir(), "calcular", &["x"]);

    let err = harness
        .engine
        .sync_path(&method_dir.join("method.json"))
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::RemoteFetchFailed { .. }));
    assert_eq!(common::read_json(&manifest)["revision"], "1");
}

// ============================================================================
// Index basis
// ============================================================================

#[tokio::test]
async fn test_each_pass_resolves_the_index_again() {
    let tmp = TempDir::new().unwrap();
    let harness = Harness::new(tmp.path());
    common::publish_class(
        &harness,
        common::pedido_record(json!([
            {"identifier": "a", "scripts": []},
            {"identifier": "calcular", "scripts": []},
        ])),
    );
    let method_dir = common::write_method(&harness.class_dir(), "calcular", &["v1();"]);
    harness
        .engine
        .sync_path(&method_dir.join("method.json"))
        .await
        .unwrap();

    // someone else removes the first method between two passes
    let mut record = harness.gateway.record("class", "c-1");
    record["methods"].as_array_mut().unwrap().remove(0);
    harness.gateway.insert("class", record);
    common::write_method(&harness.class_dir(), "calcular", &["v2();"]);
    harness
        .engine
        .sync_path(&method_dir.join("method.json"))
        .await
        .unwrap();

    let paths: Vec<String> = harness
        .gateway
        .patch_log()
        .iter()
        .map(|patch| patch[0].path.clone())
        .collect();
    assert_eq!(paths, vec!["/methods/1", "/methods/0"]);
}

/// Indices are only as fresh as the snapshot they were planned from. A
/// sibling removal landing between the `get` and the `patch` shifts the
/// array, and the replace overwrites the neighbour.
#[tokio::test]
async fn test_index_planned_from_outdated_snapshot_hits_neighbour() {
    let tmp = TempDir::new().unwrap();
    let harness = Harness::new(tmp.path());
    common::publish_class(
        &harness,
        common::pedido_record(json!([
            {"identifier": "a", "scripts": []},
            {"identifier": "calcular", "scripts": []},
            {"identifier": "b", "scripts": ["b();"]},
        ])),
    );
    let method_dir = common::write_method(&harness.class_dir(), "calcular", &["new();"]);
    let rid = RemoteId::new("c-1".to_string()).unwrap();
    let local = harness
        .store
        .read_sub_element(SubElementKind::Method, &method_dir)
        .await
        .unwrap();

    let snapshot = harness.gateway.get("class", &rid).await.unwrap();
    let operation = plan_sub_element(&rid, &local, &snapshot)
        .into_operation()
        .unwrap();
    assert_eq!(operation.path.to_string(), "/methods/1");

    // concurrent removal of a sibling
    harness
        .gateway
        .patch(
            "class",
            &rid,
            &[PatchOperation {
                op: OperationKind::Remove,
                path: "/methods/0".to_string(),
                value: None,
            }],
        )
        .await
        .unwrap();
    harness
        .gateway
        .patch("class", &rid, &[operation.to_patch()])
        .await
        .unwrap();

    let methods = harness.gateway.record("class", "c-1")["methods"].clone();
    assert_eq!(
        methods,
        json!([
            {"identifier": "calcular", "scripts": []},
            {"identifier": "calcular", "scripts": ["new();"]},
        ])
    );
}
