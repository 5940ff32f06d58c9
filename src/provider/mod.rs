//! Provider adapter contracts.
//!
//! Each third-party integration is reached through a `ProviderAdapter`
//! created by a `ProviderFactory` registered in the `ProviderCatalog`.
//! Providers that send webhooks also contribute a `WebhookBinding`: a
//! validator for signatures and a handler for the business side.
//!
//! Adapters report every failure as an `IntegrationError` carrying a
//! normalized `ErrorCode`; the executor decides what to retry.

pub mod http;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::GatewayResult;
use crate::integration::{
    get_header, Credentials, Headers, IntegrationRequest, IntegrationResponse, ProviderSettings,
    RateLimitInfo, WebhookEvent,
};

pub use self::http::{HttpProvider, HttpProviderFactory};

/// Headers providers commonly use for the event type.
const EVENT_TYPE_HEADERS: [&str; 2] = ["x-event-type", "x-webhook-event"];

/// Outbound side of an integration.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Provider name used in errors and logs.
    fn provider(&self) -> &str;

    /// Prepare the adapter. Called once before the adapter is shared.
    async fn initialize(
        &mut self,
        credentials: &Credentials,
        settings: &ProviderSettings,
    ) -> GatewayResult<()>;

    /// Perform one attempt of a request. No retries here.
    async fn call(&self, request: &IntegrationRequest) -> GatewayResult<IntegrationResponse>;

    /// Cheap liveness probe of the provider.
    async fn health_check(&self) -> GatewayResult<()>;

    fn capabilities(&self) -> Vec<String>;

    /// Latest quota reported by the provider, if it reports one.
    fn rate_limit(&self) -> Option<RateLimitInfo> {
        None
    }

    /// Release resources. Calls after close fail.
    async fn close(&self) -> GatewayResult<()>;
}

/// Checks that an inbound webhook really came from the provider.
#[async_trait]
pub trait WebhookValidator: Send + Sync {
    async fn validate_webhook(&self, headers: &Headers, body: &[u8]) -> GatewayResult<()>;

    /// Signature value carried by the request, if any.
    fn signature(&self, _headers: &Headers) -> Option<String> {
        None
    }
}

/// Business processing of a validated webhook event.
#[async_trait]
pub trait WebhookHandler: Send + Sync {
    async fn process_webhook(&self, event: &WebhookEvent) -> GatewayResult<()>;

    /// Provider-assigned event id, used for duplicate detection.
    ///
    /// Defaults to the payload `id`. Delivery-id headers sit outside the
    /// signed body, so override this only for providers whose signature
    /// covers them.
    fn event_id(&self, _headers: &Headers, payload: &Value) -> Option<String> {
        match payload.get("id") {
            Some(Value::String(id)) if !id.is_empty() => Some(id.clone()),
            Some(Value::Number(id)) => Some(id.to_string()),
            _ => None,
        }
    }

    fn event_type(&self, headers: &Headers, payload: &Value) -> String {
        EVENT_TYPE_HEADERS
            .iter()
            .find_map(|name| get_header(headers, name))
            .map(str::to_string)
            .or_else(|| {
                ["type", "event", "event_type"]
                    .iter()
                    .find_map(|key| payload.get(*key).and_then(Value::as_str))
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// Inbound side of an integration.
#[derive(Clone)]
pub struct WebhookBinding {
    pub validator: Arc<dyn WebhookValidator>,
    pub handler: Arc<dyn WebhookHandler>,
}

impl std::fmt::Debug for WebhookBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookBinding").finish_non_exhaustive()
    }
}

/// Creates adapters (and webhook bindings) for one provider name.
pub trait ProviderFactory: Send + Sync {
    fn provider(&self) -> &str;

    fn create_adapter(&self) -> Box<dyn ProviderAdapter>;

    /// Webhook wiring for an integration, built from its secrets and
    /// settings. `None` when the integration does not accept webhooks.
    fn webhook_binding(
        &self,
        _credentials: &Credentials,
        _settings: &ProviderSettings,
    ) -> GatewayResult<Option<WebhookBinding>> {
        Ok(None)
    }
}

/// Provider name -> factory.
#[derive(Clone, Default)]
pub struct ProviderCatalog {
    factories: HashMap<String, Arc<dyn ProviderFactory>>,
}

impl ProviderCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with the providers shipped in this crate.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        catalog.register(Arc::new(HttpProviderFactory));
        catalog
    }

    /// Register a factory, replacing any previous one for the same provider.
    pub fn register(&mut self, factory: Arc<dyn ProviderFactory>) {
        self.factories.insert(factory.provider().to_string(), factory);
    }

    pub fn get(&self, provider: &str) -> Option<Arc<dyn ProviderFactory>> {
        self.factories.get(provider).cloned()
    }

    pub fn providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for ProviderCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCatalog")
            .field("providers", &self.providers())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    struct Noop;

    #[async_trait]
    impl WebhookHandler for Noop {
        async fn process_webhook(&self, _event: &WebhookEvent) -> GatewayResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_event_id_comes_from_signed_payload() {
        let headers: Headers = [("X-Webhook-Id".to_string(), "evt_hdr".to_string())].into();
        let payload = json!({"id": "evt_body"});
        assert_eq!(Noop.event_id(&headers, &payload).as_deref(), Some("evt_body"));
        assert_eq!(Noop.event_id(&headers, &json!({})), None);
        assert_eq!(Noop.event_id(&Headers::new(), &json!({"id": ""})), None);
        assert_eq!(Noop.event_id(&Headers::new(), &json!({"id": 42})).as_deref(), Some("42"));
        assert_eq!(Noop.event_id(&Headers::new(), &json!({})), None);
    }

    #[test]
    fn test_event_type_fallbacks() {
        let headers: Headers = [("x-event-type".to_string(), "order.created".to_string())].into();
        assert_eq!(Noop.event_type(&headers, &json!({})), "order.created");
        assert_eq!(Noop.event_type(&Headers::new(), &json!({"event": "refund"})), "refund");
        assert_eq!(Noop.event_type(&Headers::new(), &json!([1, 2])), "unknown");
    }

    #[test]
    fn test_builtin_catalog() {
        let catalog = ProviderCatalog::builtin();
        assert_eq!(catalog.providers(), vec!["http"]);
        assert!(catalog.get("http").is_some());
        assert!(catalog.get("stripe").is_none());
    }
}
