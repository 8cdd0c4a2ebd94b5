//! End-to-end pipeline tests: decision transitions driving fan-out across
//! the feed, a recording email fake, and a mocked push gateway.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use privacy_notify::channels::{EmailDispatch, PushGatewayClient};
use privacy_notify::config::PushConfig;
use privacy_notify::db;
use privacy_notify::error::{PipelineError, Result};
use privacy_notify::types::{
    Category, ChannelOutcome, DeviceType, DomainEvent, LinkStatus, Locale,
};
use privacy_notify::NotificationPipeline;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TEST_PRIVATE_KEY: &str = include_str!("push_gateway_test_key.pem");

#[derive(Default)]
struct RecordingEmail {
    sent: Mutex<Vec<(String, String)>>,
    fail: bool,
}

#[async_trait]
impl EmailDispatch for RecordingEmail {
    async fn send(
        &self,
        to_email: &str,
        subject: &str,
        _body: &str,
        _context: &HashMap<String, String>,
    ) -> Result<()> {
        if self.fail {
            return Err(PipelineError::email("smtp relay unavailable"));
        }
        self.sent
            .lock()
            .unwrap()
            .push((to_email.to_string(), subject.to_string()));
        Ok(())
    }
}

async fn pipeline_with_email(fail: bool) -> (Arc<NotificationPipeline>, Arc<RecordingEmail>) {
    let pool = db::memory_pool().await.unwrap();
    let email = Arc::new(RecordingEmail {
        sent: Mutex::new(Vec::new()),
        fail,
    });
    let pipeline = Arc::new(NotificationPipeline::with_channels(
        pool,
        Some(email.clone() as Arc<dyn EmailDispatch>),
        None,
    ));
    (pipeline, email)
}

#[tokio::test]
async fn approval_writes_feed_row_and_sends_email() {
    let (pipeline, email) = pipeline_with_email(false).await;
    pipeline
        .directory()
        .upsert("cust-1", Some("anna@example.com"), "en")
        .await
        .unwrap();

    let link = pipeline
        .transitions()
        .record_hit("https://broker.example/profile/1", "cust-1")
        .await
        .unwrap();

    let outcome = pipeline
        .decide(&link.id, LinkStatus::Approved, None, "cust-1", Locale::En)
        .await
        .unwrap();
    assert_eq!(outcome.status, LinkStatus::Approved);
    assert!(!outcome.already_terminal);

    let feed = pipeline.feed().list("cust-1", 10, 0).await.unwrap();
    assert_eq!(feed.len(), 1);
    assert_eq!(feed[0].title, "Removal approved");
    assert!(!feed[0].read);
    assert_eq!(pipeline.feed().unread_count("cust-1").await.unwrap(), 1);

    let sent = email.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "anna@example.com");
    assert_eq!(sent[0].1, "Removal approved");
}

#[tokio::test]
async fn duplicate_decision_is_idempotent() {
    let (pipeline, email) = pipeline_with_email(false).await;
    pipeline
        .directory()
        .upsert("cust-1", Some("anna@example.com"), "en")
        .await
        .unwrap();

    let link = pipeline
        .transitions()
        .record_hit("https://broker.example/profile/1", "cust-1")
        .await
        .unwrap();

    pipeline
        .decide(&link.id, LinkStatus::Approved, None, "cust-1", Locale::En)
        .await
        .unwrap();
    let second = pipeline
        .decide(&link.id, LinkStatus::Approved, None, "cust-1", Locale::En)
        .await
        .unwrap();

    assert!(second.already_terminal);
    assert_eq!(second.status, LinkStatus::Approved);
    assert_eq!(pipeline.feed().count_for("cust-1").await.unwrap(), 1);
    assert_eq!(email.sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn opposite_decision_after_terminal_keeps_original_status() {
    let (pipeline, _) = pipeline_with_email(false).await;

    let link = pipeline
        .transitions()
        .record_hit("https://broker.example/profile/1", "cust-1")
        .await
        .unwrap();
    pipeline
        .decide(&link.id, LinkStatus::Approved, None, "cust-1", Locale::En)
        .await
        .unwrap();

    let outcome = pipeline
        .decide(
            &link.id,
            LinkStatus::Rejected,
            Some("changed my mind"),
            "cust-1",
            Locale::En,
        )
        .await
        .unwrap();
    assert!(outcome.already_terminal);
    assert_eq!(outcome.status, LinkStatus::Approved);

    let stored = pipeline
        .transitions()
        .get_link(&link.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, LinkStatus::Approved);
}

#[tokio::test]
async fn concurrent_decisions_emit_exactly_one_notification() {
    let (pipeline, _) = pipeline_with_email(false).await;

    let link = pipeline
        .transitions()
        .record_hit("https://broker.example/profile/1", "cust-1")
        .await
        .unwrap();

    let a = pipeline.decide(&link.id, LinkStatus::Approved, None, "cust-1", Locale::En);
    let b = pipeline.decide(
        &link.id,
        LinkStatus::Rejected,
        Some("duplicate"),
        "cust-1",
        Locale::En,
    );
    let (first, second) = tokio::join!(a, b);

    // Whichever call lost saw a terminal link (or a retryable race); the
    // winner produced the single feed row.
    let winners = [first, second]
        .into_iter()
        .filter_map(|r| r.ok())
        .filter(|o| !o.already_terminal)
        .count();
    assert!(winners <= 1);
    assert_eq!(pipeline.feed().count_for("cust-1").await.unwrap(), 1);
}

#[tokio::test]
async fn wrong_customer_is_rejected_without_mutation() {
    let (pipeline, _) = pipeline_with_email(false).await;

    let link = pipeline
        .transitions()
        .record_hit("https://broker.example/profile/1", "cust-1")
        .await
        .unwrap();

    let err = pipeline
        .decide(&link.id, LinkStatus::Approved, None, "cust-2", Locale::En)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Permission { .. }));

    let stored = pipeline
        .transitions()
        .get_link(&link.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, LinkStatus::Pending);
    assert_eq!(pipeline.feed().count_for("cust-1").await.unwrap(), 0);
}

#[tokio::test]
async fn unknown_link_is_not_found() {
    let (pipeline, _) = pipeline_with_email(false).await;

    let err = pipeline
        .decide("no-such-link", LinkStatus::Approved, None, "cust-1", Locale::En)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::NotFound { .. }));
}

#[tokio::test]
async fn email_failure_does_not_lose_the_feed_row() {
    let (pipeline, email) = pipeline_with_email(true).await;
    pipeline
        .directory()
        .upsert("cust-1", Some("anna@example.com"), "en")
        .await
        .unwrap();

    let link = pipeline
        .transitions()
        .record_hit("https://broker.example/profile/1", "cust-1")
        .await
        .unwrap();

    let outcome = pipeline
        .decide(&link.id, LinkStatus::Approved, None, "cust-1", Locale::En)
        .await
        .unwrap();
    assert_eq!(outcome.status, LinkStatus::Approved);
    assert_eq!(pipeline.feed().count_for("cust-1").await.unwrap(), 1);
    assert!(email.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn disabled_email_preference_skips_the_channel() {
    let (pipeline, email) = pipeline_with_email(false).await;
    pipeline
        .directory()
        .upsert("cust-1", Some("anna@example.com"), "en")
        .await
        .unwrap();

    let mut prefs = pipeline.preferences().get_or_default("cust-1").await.unwrap();
    prefs.email_monitoring = false;
    pipeline.preferences().update(&prefs).await.unwrap();

    let event = DomainEvent {
        link_id: "l-1".to_string(),
        customer_id: "cust-1".to_string(),
        url: "https://broker.example/profile/1".to_string(),
        new_status: LinkStatus::Approved,
        reason: None,
        locale: Locale::En,
        category: Category::Monitoring,
    };
    let result = pipeline.fanout().dispatch(&event).await.unwrap();

    assert_eq!(result.email, ChannelOutcome::Skipped);
    // Push never configured, also skipped; the feed row still landed.
    assert_eq!(result.push, ChannelOutcome::Skipped);
    assert_eq!(pipeline.feed().count_for("cust-1").await.unwrap(), 1);
    assert!(email.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn missing_email_address_skips_without_failing() {
    let (pipeline, email) = pipeline_with_email(false).await;
    // No customer row at all.

    let event = DomainEvent {
        link_id: "l-1".to_string(),
        customer_id: "cust-1".to_string(),
        url: "https://broker.example/profile/1".to_string(),
        new_status: LinkStatus::Rejected,
        reason: Some("not removable".to_string()),
        locale: Locale::En,
        category: Category::Monitoring,
    };
    let result = pipeline.fanout().dispatch(&event).await.unwrap();

    assert_eq!(result.email, ChannelOutcome::Skipped);
    assert!(email.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn swedish_locale_renders_swedish_copy() {
    let (pipeline, email) = pipeline_with_email(false).await;
    pipeline
        .directory()
        .upsert("cust-1", Some("anna@example.se"), "sv")
        .await
        .unwrap();

    let link = pipeline
        .transitions()
        .record_hit("https://broker.example/profile/1", "cust-1")
        .await
        .unwrap();
    pipeline
        .decide(
            &link.id,
            LinkStatus::Rejected,
            Some("sidan svarar inte"),
            "cust-1",
            Locale::Sv,
        )
        .await
        .unwrap();

    let feed = pipeline.feed().list("cust-1", 10, 0).await.unwrap();
    assert_eq!(feed[0].title, "Borttagning nekad");
    assert!(feed[0].message.contains("Anledning: sidan svarar inte"));

    let sent = email.sent.lock().unwrap();
    assert_eq!(sent[0].1, "Borttagning nekad");
}

#[tokio::test]
async fn mark_read_is_owner_scoped_and_monotonic() {
    let (pipeline, _) = pipeline_with_email(false).await;

    let link = pipeline
        .transitions()
        .record_hit("https://broker.example/profile/1", "cust-1")
        .await
        .unwrap();
    pipeline
        .decide(&link.id, LinkStatus::Approved, None, "cust-1", Locale::En)
        .await
        .unwrap();

    let feed = pipeline.feed().list("cust-1", 10, 0).await.unwrap();
    let id = feed[0].id.clone();

    // Another user cannot mark it.
    assert!(!pipeline.feed().mark_read(&id, "cust-2").await.unwrap());
    assert!(pipeline.feed().mark_read(&id, "cust-1").await.unwrap());
    // Second mark is a no-op.
    assert!(!pipeline.feed().mark_read(&id, "cust-1").await.unwrap());
    assert_eq!(pipeline.feed().unread_count("cust-1").await.unwrap(), 0);
}

fn push_config(server: &MockServer) -> PushConfig {
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

async fn mount_oauth(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "ya29.test-token",
            "expires_in": 3600,
            "token_type": "Bearer"
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn unregistered_tokens_are_pruned_during_fanout() {
    let server = MockServer::start().await;
    mount_oauth(&server).await;
    Mock::given(method("POST"))
        .and(path("/v1/projects/test-project/messages:send"))
        .and(body_string_contains("dead-token"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "error": { "status": "NOT_FOUND" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/projects/test-project/messages:send"))
        .and(body_string_contains("live-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "name": "projects/test-project/messages/1"
        })))
        .mount(&server)
        .await;

    let pool = db::memory_pool().await.unwrap();
    let push = Arc::new(PushGatewayClient::new(push_config(&server)).unwrap());
    let pipeline = Arc::new(NotificationPipeline::with_channels(pool, None, Some(push)));

    pipeline
        .registry()
        .register("cust-1", "dead-token", DeviceType::Ios)
        .await
        .unwrap();
    pipeline
        .registry()
        .register("cust-1", "live-token", DeviceType::Android)
        .await
        .unwrap();

    let event = DomainEvent {
        link_id: "l-1".to_string(),
        customer_id: "cust-1".to_string(),
        url: "https://broker.example/profile/1".to_string(),
        new_status: LinkStatus::Approved,
        reason: None,
        locale: Locale::En,
        category: Category::Monitoring,
    };
    let result = pipeline.fanout().dispatch(&event).await.unwrap();

    assert_eq!(result.push, ChannelOutcome::Ok);
    assert_eq!(result.pruned_tokens, 1);

    let remaining = pipeline.registry().tokens_for("cust-1").await.unwrap();
    assert_eq!(remaining, vec!["live-token".to_string()]);
}

#[tokio::test]
async fn push_disabled_preference_skips_the_gateway_entirely() {
    // No mocks mounted; a request would hit a dead endpoint and fail.
    let server = MockServer::start().await;
    let pool = db::memory_pool().await.unwrap();
    let push = Arc::new(PushGatewayClient::new(push_config(&server)).unwrap());
    let pipeline = Arc::new(NotificationPipeline::with_channels(pool, None, Some(push)));

    pipeline
        .registry()
        .register("cust-1", "some-token", DeviceType::Web)
        .await
        .unwrap();
    let mut prefs = pipeline.preferences().get_or_default("cust-1").await.unwrap();
    prefs.push_enabled = false;
    pipeline.preferences().update(&prefs).await.unwrap();

    let event = DomainEvent {
        link_id: "l-1".to_string(),
        customer_id: "cust-1".to_string(),
        url: "https://broker.example/profile/1".to_string(),
        new_status: LinkStatus::Approved,
        reason: None,
        locale: Locale::En,
        category: Category::Monitoring,
    };
    let result = pipeline.fanout().dispatch(&event).await.unwrap();

    assert_eq!(result.push, ChannelOutcome::Skipped);
    assert_eq!(result.pruned_tokens, 0);
}

#[tokio::test]
async fn no_registered_tokens_skips_push() {
    let server = MockServer::start().await;
    let pool = db::memory_pool().await.unwrap();
    let push = Arc::new(PushGatewayClient::new(push_config(&server)).unwrap());
    let pipeline = Arc::new(NotificationPipeline::with_channels(pool, None, Some(push)));

    let event = DomainEvent {
        link_id: "l-1".to_string(),
        customer_id: "cust-1".to_string(),
        url: "https://broker.example/profile/1".to_string(),
        new_status: LinkStatus::Approved,
        reason: None,
        locale: Locale::En,
        category: Category::Monitoring,
    };
    let result = pipeline.fanout().dispatch(&event).await.unwrap();

    assert_eq!(result.push, ChannelOutcome::Skipped);
}
