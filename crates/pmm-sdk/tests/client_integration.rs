//! Integration tests for the PMM client against a mock server

use pmm_common::DatabaseConnection;
use pmm_sdk::{is_registered, ApiError, ClientBuilder, PmmClient};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DB_HOST: &str = "pmm-test.c9akciq32.us-west-2.rds.amazonaws.com";

fn client(server: &MockServer) -> PmmClient {
    ClientBuilder::default()
        .base_url(server.uri())
        .password("secret")
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

fn db() -> DatabaseConnection {
    DatabaseConnection {
        host: DB_HOST.into(),
        port: 5432,
        database: "postgres".into(),
        username: "pmm_monitor".into(),
        password: "hunter2".into(),
    }
}

#[tokio::test]
async fn test_get_version_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/version"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "version": "3.1.0",
            "server": {
                "version": "3.1.0",
                "full_version": "3.1.0-12.2502.1234",
                "timestamp": "2025-03-01T10:00:00Z"
            },
            "distribution_method": "AMI"
        })))
        .mount(&mock_server)
        .await;

    let version = client(&mock_server).get_version().await.unwrap();
    assert_eq!(version.version, "3.1.0");
    assert_eq!(
        version.server.unwrap().full_version.as_deref(),
        Some("3.1.0-12.2502.1234")
    );
}

#[tokio::test]
async fn test_get_version_soft_fails_on_server_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/version"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&mock_server)
        .await;

    assert!(client(&mock_server).get_version().await.is_none());
}

#[tokio::test]
async fn test_get_version_soft_fails_when_unreachable() {
    let client = ClientBuilder::default()
        .base_url("http://127.0.0.1:1")
        .password("secret")
        .timeout(Duration::from_secs(2))
        .build()
        .unwrap();

    assert!(client.get_version().await.is_none());
    assert!(client.list_services().await.is_none());
    assert!(client.is_ready().await.is_err());
}

#[tokio::test]
async fn test_list_services_soft_fails_on_malformed_json() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/management/services"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy error</html>"))
        .mount(&mock_server)
        .await;

    assert!(client(&mock_server).list_services().await.is_none());
}

#[tokio::test]
async fn test_list_services_membership() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/management/services"))
        .and(header("Authorization", "Basic YWRtaW46c2VjcmV0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "services": [
                {
                    "service_id": "pmm-server-postgresql",
                    "service_type": "SERVICE_TYPE_POSTGRESQL_SERVICE",
                    "service_name": "pmm-server-postgresql",
                    "address": "127.0.0.1",
                    "port": 5432,
                    "node_id": "pmm-server"
                },
                {
                    "service_id": "svc-rds",
                    "service_type": "SERVICE_TYPE_POSTGRESQL_SERVICE",
                    "service_name": "rds-postgres-pmm-test",
                    "address": format!("{DB_HOST}:5432"),
                    "port": 5432,
                    "node_id": "node-rds"
                }
            ]
        })))
        .mount(&mock_server)
        .await;

    let services = client(&mock_server).list_services().await.unwrap();
    assert_eq!(services.services.len(), 2);
    assert!(is_registered(&services.services, DB_HOST));
    assert!(!is_registered(&services.services, "other.rds.amazonaws.com"));
}

#[tokio::test]
async fn test_find_agent_none_when_empty() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/inventory/agents"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "pmm_agent": [] })))
        .mount(&mock_server)
        .await;

    assert!(client(&mock_server).find_agent().await.unwrap().is_none());
}

#[tokio::test]
async fn test_find_agent_authentication_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/inventory/agents"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .mount(&mock_server)
        .await;

    let result = client(&mock_server).find_agent().await;
    assert!(matches!(
        result.unwrap_err(),
        ApiError::Authentication { .. }
    ));
}

#[tokio::test]
async fn test_register_service_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/management/services"))
        .and(body_partial_json(json!({
            "postgresql": {
                "address": DB_HOST,
                "port": 5432,
                "pmm_agent_id": "pmm-server",
                "service_name": "rds-postgres-pmm-test",
                "add_node": { "node_name": "rds-postgres-pmm-test-node" }
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "postgresql": {
                "service": {
                    "service_id": "svc-rds",
                    "service_name": "rds-postgres-pmm-test",
                    "address": DB_HOST,
                    "port": 5432,
                    "node_id": "node-rds"
                },
                "postgres_exporter": { "agent_id": "exp-1", "status": "AGENT_STATUS_STARTING" },
                "qan_postgresql_pgstatements_agent": { "agent_id": "qan-1", "status": "AGENT_STATUS_WAITING" }
            }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let registered = client(&mock_server)
        .register_service(&db(), "pmm-server", "rds-postgres-pmm-test")
        .await
        .unwrap();

    assert_eq!(registered.service.service_id, "svc-rds");
    assert!(is_registered(
        std::slice::from_ref(&registered.service),
        DB_HOST
    ));
    assert!(registered.qan_agent.unwrap().is_waiting());
}

#[tokio::test]
async fn test_register_service_error_carries_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/management/services"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "code": 3,
            "message": "Connection check failed: pq: password authentication failed"
        })))
        .mount(&mock_server)
        .await;

    let err = client(&mock_server)
        .register_service(&db(), "pmm-server", "rds-postgres-pmm-test")
        .await
        .unwrap_err();

    match err {
        ApiError::Registration { status, body } => {
            assert_eq!(status, 400);
            assert!(body.contains("password authentication failed"));
        }
        other => panic!("expected registration error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_register_service_requires_agent() {
    let mock_server = MockServer::start().await;

    let err = client(&mock_server)
        .register_service(&db(), "", "rds-postgres-pmm-test")
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::InvalidRequest { .. }));
    assert!(mock_server.received_requests().await.unwrap().is_empty());
}
