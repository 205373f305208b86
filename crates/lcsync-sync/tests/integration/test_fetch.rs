//! Integration tests for fetch and materialization

use serde_json::json;
use tempfile::TempDir;

use lcsync_core::domain::{EntityKind, RemoteId};

use crate::common::{self, Harness};

fn seed_remote(harness: &Harness) {
    let gateway = &harness.gateway;
    for (id, identifier, package) in [
        ("c-1", "Pedido", "vendas"),
        ("c-2", "Cliente", "vendas"),
        ("c-3", "Nota", "fiscal"),
    ] {
        gateway.insert(
            "class",
            json!({
                "id": id,
                "revision": "7",
                "identifier": identifier,
                "package": package,
                "methods": [
                    {"identifier": "calcular", "scripts": ["return 1;", "return 2;"]}
                ],
                "fields": [
                    {"identifier": "_status", "type": "string"},
                    {"identifier": "codigo", "type": "string", "label": "Código"}
                ]
            }),
        );
    }
    gateway.insert(
        "class",
        json!({"id": "c-4", "revision": "1", "identifier": "../fora"}),
    );
    gateway.insert(
        "processVersion",
        json!({
            "id": "v-1",
            "revision": "2",
            "identifier": "v1",
            "group": "rh",
            "process": "ferias",
            "roles": [{"identifier": "gestor", "label": "Gestor"}]
        }),
    );
    for (id, identifier) in [("t-1", "aprovar"), ("t-2", "revisar")] {
        gateway.insert(
            "diagramTask",
            json!({
                "id": id,
                "revision": "1",
                "identifier": identifier,
                "versionId": "v-1",
                "scripts": [format!("{identifier}();")]
            }),
        );
    }
}

#[tokio::test]
async fn test_fetch_all_pages_through_every_entity() {
    let tmp = TempDir::new().unwrap();
    let harness = Harness::new(tmp.path());
    seed_remote(&harness);

    let report = harness.fetcher(2).fetch_all().await.unwrap();

    assert_eq!(report.classes, 3);
    assert_eq!(report.versions, 1);
    assert_eq!(report.tasks, 2);
    assert_eq!(report.skipped.len(), 1);

    let pedido = tmp.path().join("classes/vendas/Pedido");
    assert_eq!(common::read_json(&pedido.join("class.json"))["revision"], "7");
    assert_eq!(
        std::fs::read_to_string(pedido.join("methods/calcular/scripts/script_2.js")).unwrap(),
        "return 2;"
    );
    assert!(tmp.path().join("classes/fiscal/Nota/class.json").is_file());

    let version = tmp.path().join("processes/rh/ferias/v1");
    assert_eq!(
        common::read_json(&version.join("roles/gestor/role.json")),
        json!({"identifier": "gestor", "label": "Gestor"})
    );
    assert_eq!(
        std::fs::read_to_string(version.join("tasks/revisar/scripts/script_1.js")).unwrap(),
        "revisar();"
    );
}

#[tokio::test]
async fn test_fetched_tree_syncs_without_changes() {
    let tmp = TempDir::new().unwrap();
    let harness = Harness::new(tmp.path());
    seed_remote(&harness);
    harness.fetcher(100).fetch_all().await.unwrap();

    let report = harness.engine.sync_all().await.unwrap();

    assert!(report.errors.is_empty(), "{:?}", report.errors);
    assert_eq!(report.patched, 0);
    assert_eq!(report.created, 0);
    assert_eq!(harness.gateway.patch_count(), 0);
}

#[tokio::test]
async fn test_fetch_one_task_lands_under_its_version() {
    let tmp = TempDir::new().unwrap();
    let harness = Harness::new(tmp.path());
    seed_remote(&harness);

    let dir = harness
        .fetcher(100)
        .fetch_one(EntityKind::DiagramTask, &RemoteId::new("t-1".to_string()).unwrap())
        .await
        .unwrap();

    assert_eq!(dir, tmp.path().join("processes/rh/ferias/v1/tasks/aprovar"));
    assert_eq!(common::read_json(&dir.join("task.json"))["id"], "t-1");
}
