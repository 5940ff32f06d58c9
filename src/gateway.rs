//! Gateway facade.
//!
//! Wires the registry, webhook dispatcher, event bus and health monitor
//! together from a `GatewayConfig`. This is the surface the application
//! (and the ingress server) talks to.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::{resolve_credentials, ConfigError, GatewayConfig, HealthCheckConfig};
use crate::error::{GatewayResult, IntegrationError};
use crate::events::EventBus;
use crate::health::HealthMonitor;
use crate::integration::{Credentials, Headers, Integration, IntegrationRequest, IntegrationResponse};
use crate::provider::ProviderCatalog;
use crate::registry::{IntegrationDefinition, IntegrationRegistry};
use crate::webhooks::{DedupCache, InMemoryDedupCache, WebhookDispatcher, WebhookReceipt};

/// Startup wiring failures.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to register integration '{id}': {source}")]
    Register {
        id: String,
        #[source]
        source: IntegrationError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Entry point for outbound calls and inbound webhooks.
pub struct Gateway {
    registry: Arc<IntegrationRegistry>,
    dispatcher: Arc<WebhookDispatcher>,
    events: EventBus,
    health: HealthCheckConfig,
}

impl Gateway {
    /// Build an empty gateway (no integrations registered yet).
    pub fn new(catalog: ProviderCatalog, config: &GatewayConfig) -> Self {
        let dedup = Arc::new(InMemoryDedupCache::new(
            config.webhooks.dedup_capacity,
            Duration::from_secs(config.webhooks.dedup_ttl_secs),
        ));
        Self::with_dedup(catalog, config, dedup)
    }

    /// Like `new`, with a caller-supplied dedup store.
    pub fn with_dedup(catalog: ProviderCatalog, config: &GatewayConfig, dedup: Arc<dyn DedupCache>) -> Self {
        let events = EventBus::new(config.events.capacity);
        let registry = Arc::new(IntegrationRegistry::new(
            catalog,
            config.defaults.clone(),
            events.clone(),
        ));
        let dispatcher = Arc::new(WebhookDispatcher::new(registry.clone(), dedup, events.clone()));
        Self {
            registry,
            dispatcher,
            events,
            health: config.health_check.clone(),
        }
    }

    /// Register every configured integration and initialize the enabled
    /// ones. Missing secrets and duplicate ids abort startup; a provider
    /// that fails to initialize stays `pending` with no live adapter and
    /// startup continues.
    pub async fn bootstrap(&self, config: &GatewayConfig) -> Result<(), GatewayError> {
        for integration in &config.integrations {
            self.registry
                .register(integration.to_definition())
                .map_err(|source| GatewayError::Register {
                    id: integration.id.clone(),
                    source,
                })?;

            if !integration.enabled {
                tracing::info!(integration_id = %integration.id, "Integration disabled in config, not initializing");
                continue;
            }

            let credentials = resolve_credentials(&integration.credentials)?;
            if let Err(e) = self.registry.initialize(&integration.id, credentials).await {
                tracing::error!(
                    integration_id = %integration.id,
                    error_code = e.code.as_str(),
                    error = %e.message,
                    "Integration failed to initialize; continuing without it"
                );
            }
        }

        tracing::info!(integrations = self.registry.len(), "Gateway bootstrapped");
        Ok(())
    }

    pub fn register(&self, definition: IntegrationDefinition) -> GatewayResult<Integration> {
        self.registry.register(definition)
    }

    pub async fn initialize(&self, integration_id: &str, credentials: Credentials) -> GatewayResult<()> {
        self.registry.initialize(integration_id, credentials).await
    }

    /// Execute a request against an integration with retries, circuit
    /// breaking and quota enforcement. `cancel` aborts in-flight attempts
    /// and backoff waits.
    pub async fn execute(
        &self,
        integration_id: &str,
        request: IntegrationRequest,
        cancel: &CancellationToken,
    ) -> GatewayResult<IntegrationResponse> {
        self.registry.execute(integration_id, request, cancel).await
    }

    /// Route one inbound webhook delivery.
    pub async fn handle_webhook(
        &self,
        integration_id: &str,
        headers: &Headers,
        body: &[u8],
    ) -> GatewayResult<WebhookReceipt> {
        self.dispatcher.handle(integration_id, headers, body).await
    }

    pub fn registry(&self) -> &Arc<IntegrationRegistry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Arc<WebhookDispatcher> {
        &self.dispatcher
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// A health monitor over this gateway's registry. Run it with
    /// `HealthMonitor::run`.
    pub fn health_monitor(&self) -> HealthMonitor {
        HealthMonitor::new(self.registry.clone(), self.health.clone())
    }

    /// Close every live adapter.
    pub async fn shutdown(&self) {
        self.registry.close_all().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::error::ErrorCode;
    use crate::integration::IntegrationStatus;

    #[tokio::test]
    async fn test_bootstrap_registers_disabled_integrations_as_pending() {
        let config = parse_config(
            r#"
            [[integrations]]
            id = "shop"
            provider = "http"
            type = "marketplace"
            enabled = false
            settings = { base_url = "https://api.example.com" }
            "#,
        )
        .unwrap();

        let gateway = Gateway::new(ProviderCatalog::builtin(), &config);
        gateway.bootstrap(&config).await.unwrap();

        let shop = gateway.registry().get("shop").unwrap();
        assert_eq!(shop.status, IntegrationStatus::Pending);

        let err = gateway
            .handle_webhook("shop", &Headers::new(), b"{}")
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_bootstrap_initializes_enabled_integrations() {
        let config = parse_config(
            r#"
            [[integrations]]
            id = "shop"
            provider = "http"
            type = "marketplace"
            settings = { base_url = "https://api.example.com" }
            "#,
        )
        .unwrap();

        let gateway = Gateway::new(ProviderCatalog::builtin(), &config);
        gateway.bootstrap(&config).await.unwrap();
        // Live, but pending until the first health sweep.
        assert_eq!(gateway.registry().get("shop").unwrap().status, IntegrationStatus::Pending);
        assert_eq!(gateway.registry().health_targets().len(), 1);
        gateway.shutdown().await;
    }

    #[tokio::test]
    async fn test_bootstrap_fails_on_missing_secret() {
        let config = parse_config(
            r#"
            [[integrations]]
            id = "pay"
            provider = "http"
            type = "payment"
            settings = { base_url = "https://api.example.com" }
            credentials = { api_key_env = "INTEGRATION_GATEWAY_TEST_UNSET_VARIABLE" }
            "#,
        )
        .unwrap();

        let gateway = Gateway::new(ProviderCatalog::builtin(), &config);
        let err = gateway.bootstrap(&config).await.unwrap_err();
        assert!(matches!(err, GatewayError::Config(ConfigError::MissingSecret(_))));
    }
}
