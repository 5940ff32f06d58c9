mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use common::start_programmable_backend;
use integration_gateway::config::GatewayConfig;
use integration_gateway::error::ErrorCode;
use integration_gateway::integration::{
    Credentials, IntegrationRequest, IntegrationType, ProviderSettings, RateLimitSource,
};
use integration_gateway::provider::ProviderCatalog;
use integration_gateway::registry::IntegrationDefinition;
use integration_gateway::resilience::RetryPolicy;
use integration_gateway::Gateway;

const TOKEN: &str = "tok_live_5e6f7a8b";

fn no_backoff() -> RetryPolicy {
    RetryPolicy {
        initial_delay_ms: 1,
        max_delay_ms: 1,
        ..RetryPolicy::default()
    }
}

async fn gateway_for(addr: std::net::SocketAddr) -> Gateway {
    let gateway = Gateway::new(ProviderCatalog::builtin(), &GatewayConfig::default());
    gateway
        .register(
            IntegrationDefinition::new("erp", "http", IntegrationType::Accounting)
                .with_settings(ProviderSettings {
                    base_url: Some(format!("http://{addr}/api/v2")),
                    capabilities: vec!["invoices".to_string()],
                    ..ProviderSettings::default()
                })
                .with_retry(no_backoff()),
        )
        .unwrap();
    gateway
        .initialize("erp", Credentials::new().with_access_token(TOKEN))
        .await
        .unwrap();
    gateway
}

#[tokio::test]
async fn test_success_carries_auth_and_provider_quota() {
    let seen = Arc::new(Mutex::new(String::new()));
    let captured = seen.clone();
    let addr = start_programmable_backend(move |head| {
        *captured.lock() = head;
        async {
            (
                200,
                vec![
                    ("x-ratelimit-limit", "100".to_string()),
                    ("x-ratelimit-remaining", "42".to_string()),
                    ("x-ratelimit-reset", "30".to_string()),
                ],
                r#"{"invoices":[]}"#.to_string(),
            )
        }
    })
    .await;

    let gateway = gateway_for(addr).await;
    let response = gateway
        .execute("erp", IntegrationRequest::new("GET", "/invoices"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(response.status_code, 200);
    assert_eq!(response.json().unwrap()["invoices"], serde_json::json!([]));

    let head = seen.lock().to_ascii_lowercase();
    assert!(head.starts_with("get /api/v2/invoices "));
    assert!(head.contains(&format!("authorization: bearer {}", TOKEN.to_ascii_lowercase())));

    let quota = gateway.registry().rate_limit("erp").unwrap();
    assert_eq!(quota.source, RateLimitSource::Provider);
    assert_eq!(quota.requests_per_minute, 100);
    assert_eq!(quota.remaining, 42);
    assert_eq!(gateway.registry().capabilities("erp").unwrap(), vec!["invoices"]);
}

#[tokio::test]
async fn test_unavailable_is_retried_then_succeeds() {
    let hits = Arc::new(AtomicU32::new(0));
    let counter = hits.clone();
    let addr = start_programmable_backend(move |_| {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        async move {
            if n == 0 {
                (503, vec![], "maintenance".to_string())
            } else {
                (200, vec![], "{}".to_string())
            }
        }
    })
    .await;

    let gateway = gateway_for(addr).await;
    let response = gateway
        .execute("erp", IntegrationRequest::new("GET", "/status"), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(response.attempts, 2);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_reinitialize_during_backoff_lets_call_finish() {
    let hits = Arc::new(AtomicU32::new(0));
    let counter = hits.clone();
    let addr = start_programmable_backend(move |_| {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        async move {
            if n == 0 {
                (503, vec![], "maintenance".to_string())
            } else {
                (200, vec![], "{}".to_string())
            }
        }
    })
    .await;

    let gateway = Arc::new(Gateway::new(ProviderCatalog::builtin(), &GatewayConfig::default()));
    gateway
        .register(
            IntegrationDefinition::new("erp", "http", IntegrationType::Accounting)
                .with_settings(ProviderSettings {
                    base_url: Some(format!("http://{addr}/api/v2")),
                    ..ProviderSettings::default()
                })
                .with_retry(RetryPolicy {
                    initial_delay_ms: 400,
                    max_delay_ms: 400,
                    ..RetryPolicy::default()
                }),
        )
        .unwrap();
    gateway
        .initialize("erp", Credentials::new().with_access_token(TOKEN))
        .await
        .unwrap();

    let call = tokio::spawn({
        let gateway = gateway.clone();
        async move {
            gateway
                .execute("erp", IntegrationRequest::new("GET", "/status"), &CancellationToken::new())
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(150)).await;
    gateway
        .initialize("erp", Credentials::new().with_access_token("tok_rotated_1c2d"))
        .await
        .unwrap();

    let response = call.await.unwrap().unwrap();
    assert_eq!(response.attempts, 2);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert_eq!(gateway.registry().circuit("erp").unwrap().consecutive_failures, 0);
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let hits = Arc::new(AtomicU32::new(0));
    let counter = hits.clone();
    let addr = start_programmable_backend(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        async { (404, vec![], r#"{"error":"no such invoice"}"#.to_string()) }
    })
    .await;

    let gateway = gateway_for(addr).await;
    let err = gateway
        .execute("erp", IntegrationRequest::new("GET", "/invoices/9"), &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::NotFound);
    assert_eq!(err.status_code, Some(404));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_connection_refused_maps_to_unavailable() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let gateway = gateway_for(addr).await;
    let err = gateway
        .execute("erp", IntegrationRequest::new("GET", "/status"), &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ServiceUnavailable);
    assert_eq!(err.attempts, 3);
    assert!(!err.message.contains(TOKEN));
}

#[tokio::test]
async fn test_health_check_hits_health_path() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let captured = seen.clone();
    let addr = start_programmable_backend(move |head| {
        captured.lock().push(head.lines().next().unwrap_or_default().to_string());
        async { (200, vec![], "ok".to_string()) }
    })
    .await;

    let gateway = gateway_for(addr).await;
    assert_eq!(gateway.health_monitor().check_all().await, 1);
    assert_eq!(seen.lock()[0], "GET /api/v2/health HTTP/1.1");
}
