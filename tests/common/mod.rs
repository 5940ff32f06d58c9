//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use integration_gateway::config::GatewayConfig;
use integration_gateway::error::{ErrorCode, GatewayResult, IntegrationError};
use integration_gateway::integration::{
    Credentials, IntegrationRequest, IntegrationResponse, IntegrationType, ProviderSettings,
    WebhookEvent, WebhookSettings,
};
use integration_gateway::provider::{
    ProviderAdapter, ProviderCatalog, ProviderFactory, WebhookBinding, WebhookHandler,
};
use integration_gateway::registry::IntegrationDefinition;
use integration_gateway::webhooks::HmacSignatureValidator;
use integration_gateway::Gateway;

pub const PROVIDER: &str = "scripted";
pub const WEBHOOK_SECRET: &str = "whsec_test_4f9a2c";
pub const API_KEY: &str = "sk_live_9b8c7d6e5f";

/// Shared script driving every adapter a `ScriptedFactory` creates.
#[derive(Default)]
pub struct Script {
    responses: Mutex<VecDeque<GatewayResult<IntegrationResponse>>>,
    /// Delay applied to every call before answering.
    call_delay: Mutex<Option<Duration>>,
    pub calls: AtomicU32,
    pub health_checks: AtomicU32,
    pub closed: AtomicU32,
    unhealthy: AtomicBool,
}

impl Script {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_ok(&self, status: u16, body: &str) {
        self.responses
            .lock()
            .push_back(Ok(IntegrationResponse::new(status, body.to_string())));
    }

    pub fn push_err(&self, code: ErrorCode, message: &str) {
        self.responses
            .lock()
            .push_back(Err(IntegrationError::new(code, PROVIDER, message)));
    }

    pub fn set_call_delay(&self, delay: Duration) {
        *self.call_delay.lock() = Some(delay);
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.unhealthy.store(!healthy, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

pub struct ScriptedAdapter {
    script: Arc<Script>,
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    fn provider(&self) -> &str {
        PROVIDER
    }

    async fn initialize(&mut self, _credentials: &Credentials, _settings: &ProviderSettings) -> GatewayResult<()> {
        Ok(())
    }

    async fn call(&self, _request: &IntegrationRequest) -> GatewayResult<IntegrationResponse> {
        self.script.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.script.call_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.responses.lock().pop_front();
        next.unwrap_or_else(|| Ok(IntegrationResponse::new(200, "{}")))
    }

    async fn health_check(&self) -> GatewayResult<()> {
        self.script.health_checks.fetch_add(1, Ordering::SeqCst);
        if self.script.unhealthy.load(Ordering::SeqCst) {
            Err(IntegrationError::new(ErrorCode::ServiceUnavailable, PROVIDER, "health check failed"))
        } else {
            Ok(())
        }
    }

    fn capabilities(&self) -> Vec<String> {
        vec!["orders".to_string()]
    }

    async fn close(&self) -> GatewayResult<()> {
        self.script.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Records every event it is asked to process.
#[derive(Default)]
pub struct RecordingHandler {
    pub events: Mutex<Vec<WebhookEvent>>,
    fail_next: AtomicBool,
}

impl RecordingHandler {
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.events.lock().len()
    }
}

#[async_trait]
impl WebhookHandler for RecordingHandler {
    async fn process_webhook(&self, event: &WebhookEvent) -> GatewayResult<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(IntegrationError::new(
                ErrorCode::TemporaryFailure,
                PROVIDER,
                "downstream store unavailable",
            ));
        }
        self.events.lock().push(event.clone());
        Ok(())
    }
}

pub struct ScriptedFactory {
    pub script: Arc<Script>,
    pub handler: Arc<RecordingHandler>,
}

impl ProviderFactory for ScriptedFactory {
    fn provider(&self) -> &str {
        PROVIDER
    }

    fn create_adapter(&self) -> Box<dyn ProviderAdapter> {
        Box::new(ScriptedAdapter {
            script: self.script.clone(),
        })
    }

    fn webhook_binding(
        &self,
        credentials: &Credentials,
        settings: &ProviderSettings,
    ) -> GatewayResult<Option<WebhookBinding>> {
        let Some(webhook) = &settings.webhook else {
            return Ok(None);
        };
        let validator = HmacSignatureValidator::from_credentials(PROVIDER, credentials, webhook)?;
        Ok(Some(WebhookBinding {
            validator: Arc::new(validator),
            handler: self.handler.clone(),
        }))
    }
}

/// A gateway with one scripted provider registered.
pub struct Harness {
    pub gateway: Arc<Gateway>,
    pub script: Arc<Script>,
    pub handler: Arc<RecordingHandler>,
}

impl Harness {
    pub fn new(config: &GatewayConfig) -> Self {
        let script = Script::new();
        let handler = Arc::new(RecordingHandler::default());
        let mut catalog = ProviderCatalog::builtin();
        catalog.register(Arc::new(ScriptedFactory {
            script: script.clone(),
            handler: handler.clone(),
        }));
        Self {
            gateway: Arc::new(Gateway::new(catalog, config)),
            script,
            handler,
        }
    }

    /// Register and initialize `id` with webhook support and test secrets.
    pub async fn add(&self, definition: IntegrationDefinition) {
        let id = definition.id.clone();
        self.gateway.register(definition).unwrap();
        self.gateway.initialize(&id, credentials()).await.unwrap();
    }
}

pub fn credentials() -> Credentials {
    Credentials::new()
        .with_api_key(API_KEY)
        .with_extra("webhook_secret", WEBHOOK_SECRET)
}

/// Definition for a scripted integration that accepts webhooks.
pub fn definition(id: &str) -> IntegrationDefinition {
    IntegrationDefinition::new(id, PROVIDER, IntegrationType::Marketplace).with_settings(ProviderSettings {
        webhook: Some(WebhookSettings::default()),
        ..ProviderSettings::default()
    })
}

/// Start a programmable mock backend on an ephemeral port. `f` receives the
/// raw request head and returns `(status, extra headers, body)`.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, Vec<(&'static str, String)>, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let mut buf = vec![0u8; 8192];
                        let n = socket.read(&mut buf).await.unwrap_or(0);
                        let head = String::from_utf8_lossy(&buf[..n]).to_string();

                        let (status, headers, body) = f(head).await;
                        let status_text = match status {
                            200 => "200 OK",
                            401 => "401 Unauthorized",
                            404 => "404 Not Found",
                            429 => "429 Too Many Requests",
                            500 => "500 Internal Server Error",
                            503 => "503 Service Unavailable",
                            _ => "400 Bad Request",
                        };
                        let mut response = format!("HTTP/1.1 {status_text}\r\nContent-Length: {}\r\n", body.len());
                        for (name, value) in headers {
                            response.push_str(&format!("{name}: {value}\r\n"));
                        }
                        response.push_str("Connection: close\r\n\r\n");
                        response.push_str(&body);
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}
