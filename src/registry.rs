//! Integration registry.
//!
//! Owns every configured integration: its record, its metadata, its request
//! executor (breaker + limiter + retry policy) and the live adapter
//! instance. The index is a `DashMap`; each entry carries its own locks so
//! traffic on one integration never contends with another.
//!
//! The live adapter sits in an `ArcSwapOption`. Re-initializing swaps a new
//! instance in and retires the old one: it is closed right away when nothing
//! else holds it, otherwise when the last in-flight call drops its `Arc`.
//!
//! Status moves only on health evidence. `initialize` installs the adapter
//! and leaves the integration `pending` (or wherever the health sweep last
//! put it); the sweep promotes it to `active` after a successful check.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::DefaultsConfig;
use crate::error::{ErrorCode, GatewayResult, IntegrationError};
use crate::events::EventBus;
use crate::executor::RequestExecutor;
use crate::health::state::{HealthTracker, StatusTransition};
use crate::integration::{
    Credentials, Integration, IntegrationEvent, IntegrationEventType, IntegrationMetadata,
    IntegrationRequest, IntegrationResponse, IntegrationStatus, IntegrationType, ProviderSettings,
    RateLimitInfo,
};
use crate::observability::metrics;
use crate::provider::{ProviderAdapter, ProviderCatalog, WebhookBinding};
use crate::resilience::{CircuitBreakerConfig, CircuitSnapshot, RateLimitConfig, RetryPolicy};

/// Everything needed to register an integration. Policy fields left `None`
/// fall back to the gateway defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct IntegrationDefinition {
    pub id: String,
    pub name: String,
    pub provider: String,
    pub version: String,
    pub integration_type: IntegrationType,
    pub settings: ProviderSettings,
    pub retry: Option<RetryPolicy>,
    pub circuit_breaker: Option<CircuitBreakerConfig>,
    pub rate_limit: Option<RateLimitConfig>,
}

impl IntegrationDefinition {
    pub fn new(id: impl Into<String>, provider: impl Into<String>, integration_type: IntegrationType) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            provider: provider.into(),
            version: "v1".to_string(),
            integration_type,
            settings: ProviderSettings::default(),
            retry: None,
            circuit_breaker: None,
            rate_limit: None,
        }
    }

    pub fn with_settings(mut self, settings: ProviderSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = Some(config);
        self
    }

    pub fn with_rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit = Some(config);
        self
    }
}

/// An initialized adapter together with the secrets and webhook wiring it
/// was built from. Swapped as one unit.
///
/// Dropping the last reference closes the adapter on the current runtime.
pub struct LiveAdapter {
    integration_id: String,
    adapter: Arc<dyn ProviderAdapter>,
    webhooks: Option<WebhookBinding>,
    credentials: Credentials,
    closed: bool,
}

impl LiveAdapter {
    pub fn adapter(&self) -> &dyn ProviderAdapter {
        self.adapter.as_ref()
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    async fn close(mut self) {
        if let Err(e) = self.adapter.close().await {
            tracing::warn!(integration_id = %self.integration_id, error = %e, "Failed to close adapter");
        }
        self.closed = true;
    }
}

impl Drop for LiveAdapter {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let adapter = self.adapter.clone();
        let integration_id = std::mem::take(&mut self.integration_id);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    match adapter.close().await {
                        Ok(()) => tracing::debug!(integration_id = %integration_id, "Released adapter closed"),
                        Err(e) => {
                            tracing::warn!(integration_id = %integration_id, error = %e, "Failed to close adapter")
                        }
                    }
                });
            }
            Err(_) => tracing::warn!(integration_id = %integration_id, "No runtime left to close adapter"),
        }
    }
}

/// Close `live` now if this is the last reference; otherwise the final
/// in-flight call closes it on drop.
async fn retire(id: &str, live: Arc<LiveAdapter>) {
    match Arc::into_inner(live) {
        Some(live) => live.close().await,
        None => tracing::debug!(integration_id = id, "Adapter still in use; closing after in-flight calls"),
    }
}

/// Webhook resolution result for the dispatcher.
#[derive(Debug, Clone)]
pub struct WebhookTarget {
    pub provider: String,
    pub binding: WebhookBinding,
    /// Used to scrub validator and handler error messages.
    pub credentials: Credentials,
}

struct IntegrationEntry {
    /// Authoritative for everything but `metadata`.
    record: Mutex<Integration>,
    metadata: Arc<Mutex<IntegrationMetadata>>,
    executor: RequestExecutor,
    live: ArcSwapOption<LiveAdapter>,
}

impl IntegrationEntry {
    fn snapshot(&self) -> Integration {
        let mut integration = self.record.lock().clone();
        integration.metadata = self.metadata.lock().clone();
        integration
    }

    fn status(&self) -> IntegrationStatus {
        self.record.lock().status
    }

    /// Set the status; returns the transition if it changed.
    fn set_status(&self, to: IntegrationStatus) -> Option<StatusTransition> {
        let mut record = self.record.lock();
        let from = record.status;
        if from == to {
            return None;
        }
        record.status = to;
        record.updated_at = Utc::now();
        Some(StatusTransition { from, to })
    }
}

/// Registry of configured integrations.
pub struct IntegrationRegistry {
    entries: DashMap<String, Arc<IntegrationEntry>>,
    catalog: ProviderCatalog,
    defaults: DefaultsConfig,
    events: EventBus,
}

impl IntegrationRegistry {
    pub fn new(catalog: ProviderCatalog, defaults: DefaultsConfig, events: EventBus) -> Self {
        Self {
            entries: DashMap::new(),
            catalog,
            defaults,
            events,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, id: &str) -> GatewayResult<Arc<IntegrationEntry>> {
        self.entries
            .get(id)
            .map(|e| e.value().clone())
            .ok_or_else(|| IntegrationError::not_found(id, format!("integration '{id}' is not registered")))
    }

    /// Add an integration in `pending` status.
    pub fn register(&self, definition: IntegrationDefinition) -> GatewayResult<Integration> {
        let now = Utc::now();
        let metadata = Arc::new(Mutex::new(IntegrationMetadata {
            capabilities: definition.settings.capabilities.clone(),
            ..IntegrationMetadata::default()
        }));
        let executor = RequestExecutor::new(
            definition.id.as_str(),
            definition.provider.as_str(),
            definition.retry.clone().unwrap_or_else(|| self.defaults.retry.clone()),
            definition
                .circuit_breaker
                .as_ref()
                .unwrap_or(&self.defaults.circuit_breaker),
            definition.rate_limit.as_ref().unwrap_or(&self.defaults.rate_limit),
            metadata.clone(),
            self.events.clone(),
        );
        let record = Integration {
            id: definition.id.clone(),
            name: definition.name,
            provider: definition.provider,
            version: definition.version,
            integration_type: definition.integration_type,
            status: IntegrationStatus::Pending,
            settings: definition.settings,
            metadata: IntegrationMetadata::default(),
            created_at: now,
            updated_at: now,
        };

        let entry = Arc::new(IntegrationEntry {
            record: Mutex::new(record),
            metadata,
            executor,
            live: ArcSwapOption::empty(),
        });
        match self.entries.entry(definition.id.clone()) {
            Entry::Occupied(_) => Err(IntegrationError::new(
                ErrorCode::Configuration,
                definition.id.as_str(),
                format!("integration '{}' is already registered", definition.id),
            )),
            Entry::Vacant(slot) => {
                let snapshot = entry.snapshot();
                slot.insert(entry);
                tracing::info!(integration_id = %snapshot.id, provider = %snapshot.provider, "Integration registered");
                Ok(snapshot)
            }
        }
    }

    /// Build, initialize and install a live adapter for `id`, retiring any
    /// previous instance. A failure leaves the current adapter and status in
    /// place.
    pub async fn initialize(&self, id: &str, credentials: Credentials) -> GatewayResult<()> {
        let entry = self.entry(id)?;
        let (provider, settings) = {
            let record = entry.record.lock();
            (record.provider.clone(), record.settings.clone())
        };
        let factory = self.catalog.get(&provider).ok_or_else(|| {
            IntegrationError::not_found(provider.as_str(), format!("no provider factory registered for '{provider}'"))
        })?;

        let mut adapter = factory.create_adapter();
        let prepared = match adapter.initialize(&credentials, &settings).await {
            Ok(()) => factory.webhook_binding(&credentials, &settings),
            Err(err) => Err(err),
        };
        let webhooks = match prepared {
            Ok(webhooks) => webhooks,
            Err(mut err) => {
                err.message = credentials.redact(&err.message);
                tracing::error!(
                    integration_id = id,
                    error_code = err.code.as_str(),
                    error = %err.message,
                    "Integration initialization failed"
                );
                self.events.publish(
                    IntegrationEvent::new(IntegrationEventType::InitializationFailed, id)
                        .with("provider", provider)
                        .with("error_code", err.code.as_str())
                        .with("message", err.message.as_str()),
                );
                return Err(err);
            }
        };

        let capabilities = adapter.capabilities();
        let live = Arc::new(LiveAdapter {
            integration_id: id.to_string(),
            adapter: Arc::from(adapter),
            webhooks,
            credentials,
            closed: false,
        });
        let previous = entry.live.swap(Some(live));
        entry.metadata.lock().capabilities = capabilities.clone();
        // Back into the health sweep; it decides when the integration is active.
        let transition = {
            let mut record = entry.record.lock();
            (record.status == IntegrationStatus::Inactive).then(|| {
                record.status = IntegrationStatus::Pending;
                record.updated_at = Utc::now();
                StatusTransition {
                    from: IntegrationStatus::Inactive,
                    to: IntegrationStatus::Pending,
                }
            })
        };

        if let Some(previous) = previous {
            retire(id, previous).await;
        }

        tracing::info!(integration_id = id, provider = %provider, "Integration initialized");
        self.events.publish(
            IntegrationEvent::new(IntegrationEventType::Initialized, id)
                .with("provider", provider)
                .with("capabilities", capabilities),
        );
        if let Some(transition) = transition {
            self.publish_transition(id, transition, "initialized");
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> GatewayResult<Integration> {
        Ok(self.entry(id)?.snapshot())
    }

    /// All integrations, ordered by id.
    pub fn list(&self) -> Vec<Integration> {
        let mut all: Vec<Integration> = self.entries.iter().map(|e| e.value().snapshot()).collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Replace an integration's settings. Takes effect on the next
    /// `initialize`.
    pub fn update_settings(&self, id: &str, settings: ProviderSettings) -> GatewayResult<Integration> {
        let entry = self.entry(id)?;
        {
            let mut record = entry.record.lock();
            record.settings = settings;
            record.updated_at = Utc::now();
        }
        Ok(entry.snapshot())
    }

    /// Mark inactive and release the live adapter. In-flight calls finish
    /// against it.
    pub async fn deactivate(&self, id: &str) -> GatewayResult<()> {
        let entry = self.entry(id)?;
        let transition = entry.set_status(IntegrationStatus::Inactive);
        if let Some(previous) = entry.live.swap(None) {
            retire(id, previous).await;
        }

        tracing::info!(integration_id = id, "Integration deactivated");
        self.events
            .publish(IntegrationEvent::new(IntegrationEventType::Deactivated, id));
        if let Some(transition) = transition {
            self.publish_transition(id, transition, "deactivated");
        }
        Ok(())
    }

    /// Deactivate and forget an integration.
    pub async fn remove(&self, id: &str) -> GatewayResult<Integration> {
        self.deactivate(id).await?;
        let (_, entry) = self
            .entries
            .remove(id)
            .ok_or_else(|| IntegrationError::not_found(id, format!("integration '{id}' is not registered")))?;
        tracing::info!(integration_id = id, "Integration removed");
        Ok(entry.snapshot())
    }

    /// Capabilities of the live adapter, or the configured ones when the
    /// integration is not initialized.
    pub fn capabilities(&self, id: &str) -> GatewayResult<Vec<String>> {
        let entry = self.entry(id)?;
        let capabilities = match entry.live.load_full() {
            Some(live) => live.adapter.capabilities(),
            None => entry.metadata.lock().capabilities.clone(),
        };
        Ok(capabilities)
    }

    /// Quota snapshot: a fresh adapter report wins over the executor's view.
    pub fn rate_limit(&self, id: &str) -> GatewayResult<RateLimitInfo> {
        let entry = self.entry(id)?;
        let reported = entry
            .live
            .load_full()
            .and_then(|live| live.adapter.rate_limit())
            .filter(|info| info.reset_at > Utc::now());
        Ok(reported.unwrap_or_else(|| entry.executor.rate_limit()))
    }

    pub fn circuit(&self, id: &str) -> GatewayResult<CircuitSnapshot> {
        Ok(self.entry(id)?.executor.breaker().snapshot())
    }

    /// Force the breaker closed.
    pub fn reset_circuit(&self, id: &str) -> GatewayResult<CircuitSnapshot> {
        let entry = self.entry(id)?;
        entry.executor.breaker().reset();
        tracing::info!(integration_id = id, "Circuit manually reset");
        Ok(entry.executor.breaker().snapshot())
    }

    /// Run a request through the integration's executor.
    pub async fn execute(
        &self,
        id: &str,
        request: IntegrationRequest,
        cancel: &CancellationToken,
    ) -> GatewayResult<IntegrationResponse> {
        let entry = self.entry(id)?;
        let Some(live) = entry.live.load_full() else {
            let (provider, status) = {
                let record = entry.record.lock();
                (record.provider.clone(), record.status)
            };
            tracing::debug!(integration_id = id, status = status.as_str(), "Call to integration without live adapter");
            return Err(IntegrationError::new(
                ErrorCode::ServiceUnavailable,
                provider,
                format!("integration '{id}' is {}", status.as_str()),
            )
            .with_request_id(request.request_id));
        };
        entry
            .executor
            .execute(live.adapter(), live.credentials(), request, cancel)
            .await
    }

    /// Webhook wiring for `id`; `NOT_FOUND` when unknown, not live, or not
    /// configured for webhooks.
    pub fn webhook_target(&self, id: &str) -> GatewayResult<WebhookTarget> {
        let entry = self.entry(id)?;
        let provider = entry.record.lock().provider.clone();
        let live = entry
            .live
            .load_full()
            .ok_or_else(|| IntegrationError::not_found(provider.as_str(), format!("integration '{id}' is not active")))?;
        let binding = live.webhooks.clone().ok_or_else(|| {
            IntegrationError::not_found(provider.as_str(), format!("integration '{id}' does not accept webhooks"))
        })?;
        Ok(WebhookTarget {
            provider,
            binding,
            credentials: live.credentials.clone(),
        })
    }

    /// Live adapters due for a health check.
    pub fn health_targets(&self) -> Vec<(String, Arc<LiveAdapter>)> {
        self.entries
            .iter()
            .filter(|e| e.value().status() != IntegrationStatus::Inactive)
            .filter_map(|e| e.value().live.load_full().map(|live| (e.key().clone(), live)))
            .collect()
    }

    /// Apply one health check result.
    pub fn record_health(&self, id: &str, result: &GatewayResult<()>, tracker: &HealthTracker) {
        let Ok(entry) = self.entry(id) else {
            return;
        };

        let (transition, failures) = {
            let mut record = entry.record.lock();
            let mut metadata = entry.metadata.lock();
            metadata.last_health_check = Some(Utc::now());
            let transition = tracker.observe(
                &mut record.status,
                &mut metadata.consecutive_health_failures,
                result.is_ok(),
            );
            if transition.is_some() {
                record.updated_at = Utc::now();
            }
            (transition, metadata.consecutive_health_failures)
        };

        if let Err(err) = result {
            let message = entry
                .live
                .load_full()
                .map(|live| live.credentials.redact(&err.message))
                .unwrap_or_else(|| err.message.clone());
            tracing::warn!(
                integration_id = id,
                error_code = err.code.as_str(),
                consecutive_failures = failures,
                error = %message,
                "Health check failed"
            );
            self.events.publish(
                IntegrationEvent::new(IntegrationEventType::HealthCheckFailed, id)
                    .with("error_code", err.code.as_str())
                    .with("message", message)
                    .with("consecutive_failures", failures),
            );
        }

        metrics::record_integration_health(id, entry.status() != IntegrationStatus::Error);
        if let Some(transition) = transition {
            self.publish_transition(id, transition, "health check");
        }
    }

    /// Close every live adapter. Used on shutdown.
    pub async fn close_all(&self) {
        let live: Vec<(String, Arc<LiveAdapter>)> = self
            .entries
            .iter()
            .filter_map(|e| e.value().live.swap(None).map(|live| (e.key().clone(), live)))
            .collect();
        for (id, adapter) in live {
            retire(&id, adapter).await;
        }
        tracing::info!("All integration adapters closed");
    }

    fn publish_transition(&self, id: &str, transition: StatusTransition, reason: &str) {
        tracing::info!(
            integration_id = id,
            from = transition.from.as_str(),
            to = transition.to.as_str(),
            reason,
            "Integration status changed"
        );
        self.events.publish(
            IntegrationEvent::new(IntegrationEventType::StatusChanged, id)
                .with("from", transition.from.as_str())
                .with("to", transition.to.as_str())
                .with("reason", reason),
        );
    }
}

impl std::fmt::Debug for IntegrationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrationRegistry")
            .field("integrations", &self.entries.len())
            .field("catalog", &self.catalog)
            .finish()
    }
}
