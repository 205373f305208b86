//! Integration tests for single-record gateway calls

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, ResponseTemplate};

use lcsync_core::domain::{OperationKind, PatchOperation, RemoteId};
use lcsync_core::ports::IRemoteGateway;
use lcsync_remote::GatewayError;

use crate::common::{self, setup_gateway_mock, TEST_TOKEN};

fn remote_id(id: &str) -> RemoteId {
    RemoteId::new(id.to_string()).unwrap()
}

#[tokio::test]
async fn test_get_sends_bearer_token() {
    let (server, gateway) = setup_gateway_mock().await;
    Mock::given(method("GET"))
        .and(path("/entities/class/c-1"))
        .and(header("authorization", format!("Bearer {TEST_TOKEN}").as_str()))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(common::class_record("c-1", "Pedido")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let record = gateway.get("class", &remote_id("c-1")).await.unwrap();

    assert_eq!(record["identifier"], "Pedido");
    assert_eq!(record["revision"], "3");
}

#[tokio::test]
async fn test_get_missing_record_is_not_found() {
    let (server, gateway) = setup_gateway_mock().await;
    Mock::given(method("GET"))
        .and(path("/entities/class/c-404"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such record"))
        .mount(&server)
        .await;

    let err = gateway.get("class", &remote_id("c-404")).await.unwrap_err();

    match err.downcast_ref::<GatewayError>() {
        Some(GatewayError::NotFound(message)) => assert_eq!(message, "no such record"),
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unauthorized_status() {
    let (server, gateway) = setup_gateway_mock().await;
    Mock::given(method("GET"))
        .and(path("/entities/class/c-1"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = gateway.get("class", &remote_id("c-1")).await.unwrap_err();

    assert!(matches!(
        err.downcast_ref::<GatewayError>(),
        Some(GatewayError::Unauthorized(_))
    ));
}

#[tokio::test]
async fn test_create_posts_payload() {
    let (server, gateway) = setup_gateway_mock().await;
    let payload = json!({"identifier": "Pedido", "package": "vendas", "methods": []});
    Mock::given(method("POST"))
        .and(path("/entities/class"))
        .and(body_json(payload.clone()))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(common::class_record("c-7", "Pedido")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let created = gateway.create("class", &payload).await.unwrap();

    assert_eq!(created["id"], "c-7");
    assert_eq!(created["revision"], "3");
}

#[tokio::test]
async fn test_patch_body_and_no_content() {
    let (server, gateway) = setup_gateway_mock().await;
    Mock::given(method("PATCH"))
        .and(path("/entities/class/c-1"))
        .and(body_json(json!({
            "id": "c-1",
            "operations": [
                {"op": "remove", "path": "/methods/1"},
                {"op": "add", "path": "/methods/-", "value": {"identifier": "novo"}}
            ]
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let operations = vec![
        PatchOperation {
            op: OperationKind::Remove,
            path: "/methods/1".to_string(),
            value: None,
        },
        PatchOperation {
            op: OperationKind::Add,
            path: "/methods/-".to_string(),
            value: Some(json!({"identifier": "novo"})),
        },
    ];
    let updated = gateway
        .patch("class", &remote_id("c-1"), &operations)
        .await
        .unwrap();

    assert!(updated.is_none());
}

#[tokio::test]
async fn test_patch_returns_updated_record() {
    let (server, gateway) = setup_gateway_mock().await;
    let mut record = common::class_record("c-1", "Pedido");
    record["revision"] = json!("4");
    Mock::given(method("PATCH"))
        .and(path("/entities/class/c-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(record))
        .mount(&server)
        .await;

    let operations = [PatchOperation {
        op: OperationKind::Replace,
        path: "/label".to_string(),
        value: Some(json!("Pedido de venda")),
    }];
    let updated = gateway
        .patch("class", &remote_id("c-1"), &operations)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(updated["revision"], "4");
}

#[tokio::test]
async fn test_patch_conflict() {
    let (server, gateway) = setup_gateway_mock().await;
    Mock::given(method("PATCH"))
        .and(path("/entities/class/c-1"))
        .respond_with(ResponseTemplate::new(409).set_body_string("revision mismatch"))
        .mount(&server)
        .await;

    let err = gateway
        .patch("class", &remote_id("c-1"), &[])
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<GatewayError>(),
        Some(GatewayError::Conflict(_))
    ));
    assert!(format!("{err:#}").contains("revision mismatch"));
}

#[tokio::test]
async fn test_malformed_body_is_invalid_response() {
    let (server, gateway) = setup_gateway_mock().await;
    Mock::given(method("GET"))
        .and(path("/entities/diagramTask/t-1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
        .mount(&server)
        .await;

    let err = gateway
        .get("diagramTask", &remote_id("t-1"))
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<GatewayError>(),
        Some(GatewayError::InvalidResponse(_))
    ));
}
