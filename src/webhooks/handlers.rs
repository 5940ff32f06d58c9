//! Built-in webhook handlers.

use async_trait::async_trait;

use crate::error::GatewayResult;
use crate::integration::WebhookEvent;
use crate::provider::WebhookHandler;

/// Accepts every validated event without further work. Used when the
/// business side consumes webhooks from the event bus instead of inline.
#[derive(Debug, Clone)]
pub struct AcknowledgingHandler {
    provider: String,
}

impl AcknowledgingHandler {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
        }
    }
}

#[async_trait]
impl WebhookHandler for AcknowledgingHandler {
    async fn process_webhook(&self, event: &WebhookEvent) -> GatewayResult<()> {
        tracing::debug!(
            provider = %self.provider,
            integration_id = %event.integration_id,
            event_id = %event.id,
            event_type = %event.event_type,
            "Webhook acknowledged"
        );
        Ok(())
    }
}
