//! Push gateway integration tests against a mocked OAuth token endpoint
//! and FCM send endpoint.

use std::collections::HashMap;

use privacy_notify::channels::{PushDeliveryStatus, PushGatewayClient};
use privacy_notify::config::PushConfig;
use privacy_notify::error::PipelineError;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// RSA key generated for these tests only; never used outside them.
const TEST_PRIVATE_KEY: &str = include_str!("push_gateway_test_key.pem");

fn test_config(server: &MockServer) -> PushConfig {
    PushConfig {
        enabled: true,
        service_account_email: "svc@project.iam.gserviceaccount.com".to_string(),
        private_key_pem: TEST_PRIVATE_KEY.to_string(),
        project_id: "test-project".to_string(),
        token_endpoint: format!("{}/token", server.uri()),
        api_base: server.uri(),
        timeout_seconds: 5,
    }
}

async fn mount_token_endpoint(server: &MockServer, expires_in: i64, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "ya29.test-token",
            "expires_in": expires_in,
            "token_type": "Bearer"
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn access_token_is_cached_across_sends() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server, 3600, 1).await;

    Mock::given(method("POST"))
        .and(path("/v1/projects/test-project/messages:send"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "name": "projects/test-project/messages/1"
        })))
        .expect(2)
        .mount(&server)
        .await;

    let client = PushGatewayClient::new(test_config(&server)).unwrap();
    let tokens = vec!["device-token-1".to_string()];
    let data = HashMap::new();

    client.send(&tokens, "Title", "Body", &data).await.unwrap();
    client.send(&tokens, "Title", "Body", &data).await.unwrap();
    // Mock expectations verify the token endpoint was hit exactly once.
}

#[tokio::test]
async fn short_lived_token_is_refreshed() {
    let server = MockServer::start().await;
    // Inside the refresh margin from the moment it is issued.
    mount_token_endpoint(&server, 60, 2).await;

    Mock::given(method("POST"))
        .and(path("/v1/projects/test-project/messages:send"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "name": "projects/test-project/messages/1"
        })))
        .expect(2)
        .mount(&server)
        .await;

    let client = PushGatewayClient::new(test_config(&server)).unwrap();
    let tokens = vec!["device-token-1".to_string()];
    let data = HashMap::new();

    client.send(&tokens, "Title", "Body", &data).await.unwrap();
    client.send(&tokens, "Title", "Body", &data).await.unwrap();
}

#[tokio::test]
async fn per_token_outcomes_are_isolated() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server, 3600, 1).await;

    Mock::given(method("POST"))
        .and(path("/v1/projects/test-project/messages:send"))
        .and(body_string_contains("dead-token"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "error": { "status": "NOT_FOUND", "details": [{ "errorCode": "UNREGISTERED" }] }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/projects/test-project/messages:send"))
        .and(body_string_contains("live-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "name": "projects/test-project/messages/2"
        })))
        .mount(&server)
        .await;

    let client = PushGatewayClient::new(test_config(&server)).unwrap();
    let tokens = vec!["dead-token".to_string(), "live-token".to_string()];
    let data = HashMap::from([("link_id".to_string(), "l-1".to_string())]);

    let deliveries = client.send(&tokens, "Title", "Body", &data).await.unwrap();
    assert_eq!(deliveries.len(), 2);
    assert_eq!(deliveries[0].status, PushDeliveryStatus::Unregistered);
    assert_eq!(deliveries[1].status, PushDeliveryStatus::Delivered);
}

#[tokio::test]
async fn server_errors_are_retryable_failures() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server, 3600, 1).await;

    Mock::given(method("POST"))
        .and(path("/v1/projects/test-project/messages:send"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = PushGatewayClient::new(test_config(&server)).unwrap();
    let tokens = vec!["device-token-1".to_string()];

    let deliveries = client
        .send(&tokens, "Title", "Body", &HashMap::new())
        .await
        .unwrap();
    assert_eq!(
        deliveries[0].status,
        PushDeliveryStatus::Failed { retryable: true }
    );
}

#[tokio::test]
async fn rejected_assertion_is_an_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "error": "invalid_grant"
        })))
        .mount(&server)
        .await;

    let client = PushGatewayClient::new(test_config(&server)).unwrap();
    let tokens = vec!["device-token-1".to_string()];

    let err = client
        .send(&tokens, "Title", "Body", &HashMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Auth { .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn empty_token_list_never_touches_the_network() {
    let server = MockServer::start().await;
    // No mocks mounted: any request would fail the test through wiremock's
    // strict unexpected-request handling combined with the error below.

    let client = PushGatewayClient::new(test_config(&server)).unwrap();
    let err = client
        .send(&[], "Title", "Body", &HashMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Validation { .. }));
}
