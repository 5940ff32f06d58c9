mod common;

use common::{definition, Harness, WEBHOOK_SECRET};
use integration_gateway::config::GatewayConfig;
use integration_gateway::error::ErrorCode;
use integration_gateway::integration::{Headers, IntegrationEventType};
use integration_gateway::webhooks::{compute_signature, WebhookStatus};

const BODY: &[u8] = br#"{"id":"evt_1001","type":"order.created","order":{"id":42}}"#;

fn signed(body: &[u8]) -> Headers {
    [(
        "x-signature".to_string(),
        format!("sha256={}", compute_signature(WEBHOOK_SECRET.as_bytes(), None, body)),
    )]
    .into()
}

async fn harness() -> Harness {
    let harness = Harness::new(&GatewayConfig::default());
    harness.add(definition("shop")).await;
    harness
}

#[tokio::test]
async fn test_valid_webhook_is_processed() {
    let harness = harness().await;
    let mut events = harness.gateway.events().subscribe("test");

    let receipt = harness
        .gateway
        .handle_webhook("shop", &signed(BODY), BODY)
        .await
        .unwrap();

    assert_eq!(receipt.status, WebhookStatus::Processed);
    assert_eq!(receipt.event_id, "evt_1001");
    assert_eq!(receipt.event_type, "order.created");

    let processed = harness.handler.events.lock().clone();
    assert_eq!(processed.len(), 1);
    assert_eq!(processed[0].integration_id, "shop");
    assert_eq!(processed[0].payload["order"]["id"], 42);
    assert!(processed[0].signature.is_some());

    let events = events.drain();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, IntegrationEventType::WebhookProcessed);
    assert_eq!(events[0].data["event_id"], "evt_1001");
}

#[tokio::test]
async fn test_tampered_body_never_reaches_handler() {
    let harness = harness().await;
    let mut events = harness.gateway.events().subscribe("test");

    let headers = signed(BODY);
    let tampered = br#"{"id":"evt_1001","type":"order.created","order":{"id":43}}"#;
    let err = harness
        .gateway
        .handle_webhook("shop", &headers, tampered)
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::InvalidSignature);
    assert_eq!(harness.handler.count(), 0);

    let events = events.drain();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, IntegrationEventType::WebhookRejected);
    assert_eq!(events[0].data["error_code"], "INVALID_SIGNATURE");
}

#[tokio::test]
async fn test_missing_signature_rejected() {
    let harness = harness().await;
    let err = harness
        .gateway
        .handle_webhook("shop", &Headers::new(), BODY)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidSignature);
    assert_eq!(harness.handler.count(), 0);
}

#[tokio::test]
async fn test_redelivery_processed_once() {
    let harness = harness().await;
    let mut events = harness.gateway.events().subscribe("test");
    let headers = signed(BODY);

    let first = harness.gateway.handle_webhook("shop", &headers, BODY).await.unwrap();
    let second = harness.gateway.handle_webhook("shop", &headers, BODY).await.unwrap();

    assert_eq!(first.status, WebhookStatus::Processed);
    assert_eq!(second.status, WebhookStatus::Duplicate);
    assert_eq!(harness.handler.count(), 1);

    let types: Vec<_> = events.drain().into_iter().map(|e| e.event_type).collect();
    assert_eq!(
        types,
        vec![IntegrationEventType::WebhookProcessed, IntegrationEventType::WebhookDuplicate]
    );
}

#[tokio::test]
async fn test_replay_with_fresh_delivery_header_is_duplicate() {
    let harness = harness().await;

    let mut headers = signed(BODY);
    headers.insert("x-webhook-id".to_string(), "dlv_1".to_string());
    harness.gateway.handle_webhook("shop", &headers, BODY).await.unwrap();

    headers.insert("x-webhook-id".to_string(), "dlv_2".to_string());
    let replay = harness.gateway.handle_webhook("shop", &headers, BODY).await.unwrap();
    assert_eq!(replay.status, WebhookStatus::Duplicate);
    assert_eq!(replay.event_id, "evt_1001");
    assert_eq!(harness.handler.count(), 1);
}

#[tokio::test]
async fn test_same_event_id_on_different_integrations_is_not_duplicate() {
    let harness = harness().await;
    harness.add(definition("marketplace-eu")).await;

    let headers = signed(BODY);
    harness.gateway.handle_webhook("shop", &headers, BODY).await.unwrap();
    let receipt = harness
        .gateway
        .handle_webhook("marketplace-eu", &headers, BODY)
        .await
        .unwrap();
    assert_eq!(receipt.status, WebhookStatus::Processed);
    assert_eq!(harness.handler.count(), 2);
}

#[tokio::test]
async fn test_failed_processing_allows_redelivery() {
    let harness = harness().await;
    let mut events = harness.gateway.events().subscribe("test");
    let headers = signed(BODY);

    harness.handler.fail_next();
    let err = harness.gateway.handle_webhook("shop", &headers, BODY).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::TemporaryFailure);

    let retry = harness.gateway.handle_webhook("shop", &headers, BODY).await.unwrap();
    assert_eq!(retry.status, WebhookStatus::Processed);
    assert_eq!(harness.handler.count(), 1);

    let types: Vec<_> = events.drain().into_iter().map(|e| e.event_type).collect();
    assert_eq!(
        types,
        vec![IntegrationEventType::WebhookFailed, IntegrationEventType::WebhookProcessed]
    );
}

#[tokio::test]
async fn test_body_without_id_dedups_by_content() {
    let harness = harness().await;
    let body = br#"{"type":"inventory.updated","sku":"A-1"}"#;
    let headers = signed(body);

    let first = harness.gateway.handle_webhook("shop", &headers, body).await.unwrap();
    assert!(first.event_id.starts_with("sha256:"));
    let second = harness.gateway.handle_webhook("shop", &headers, body).await.unwrap();
    assert_eq!(second.status, WebhookStatus::Duplicate);
    assert_eq!(first.event_id, second.event_id);
}

#[tokio::test]
async fn test_invalid_json_rejected_after_signature() {
    let harness = harness().await;
    let body = b"not json";
    let err = harness
        .gateway
        .handle_webhook("shop", &signed(body), body)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidPayload);
    assert_eq!(harness.handler.count(), 0);
}

#[tokio::test]
async fn test_unknown_integration_is_not_found() {
    let harness = harness().await;
    let mut events = harness.gateway.events().subscribe("test");

    let err = harness
        .gateway
        .handle_webhook("nope", &signed(BODY), BODY)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::NotFound);

    let events = events.drain();
    assert_eq!(events[0].event_type, IntegrationEventType::WebhookRejected);
    assert_eq!(events[0].integration_id, "nope");
}
