//! Built-in event subscribers.

use async_trait::async_trait;

use crate::events::bus::EventSubscriber;
use crate::integration::{IntegrationEvent, IntegrationEventType};

/// Writes one structured audit line per event.
#[derive(Debug, Default)]
pub struct LogSubscriber;

#[async_trait]
impl EventSubscriber for LogSubscriber {
    fn name(&self) -> &str {
        "audit-log"
    }

    async fn handle(&self, event: &IntegrationEvent) {
        let data = serde_json::Value::Object(event.data.clone());
        match event.event_type {
            IntegrationEventType::CallFailed
            | IntegrationEventType::WebhookRejected
            | IntegrationEventType::WebhookFailed
            | IntegrationEventType::InitializationFailed
            | IntegrationEventType::HealthCheckFailed => tracing::warn!(
                target: "integration_gateway::audit",
                event_id = %event.id,
                event_type = event.event_type.as_str(),
                integration_id = %event.integration_id,
                data = %data,
                "Integration event"
            ),
            _ => tracing::info!(
                target: "integration_gateway::audit",
                event_id = %event.id,
                event_type = event.event_type.as_str(),
                integration_id = %event.integration_id,
                data = %data,
                "Integration event"
            ),
        }
    }
}
