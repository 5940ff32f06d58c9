//! Inbound webhook pipeline.
//!
//! ```text
//! resolve integration → validate signature → parse JSON → dedup check
//!     → business handler (first delivery only) → IntegrationEvent
//! ```
//!
//! Every delivery ends in exactly one event on the bus, whatever the outcome.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{ErrorCode, GatewayResult, IntegrationError};
use crate::events::EventBus;
use crate::integration::{Headers, IntegrationEvent, IntegrationEventType, WebhookEvent};
use crate::observability::metrics;
use crate::registry::IntegrationRegistry;
use crate::webhooks::dedup::DedupCache;

/// How an accepted delivery was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookStatus {
    Processed,
    Duplicate,
}

/// Acknowledgement returned to the provider for an accepted delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookReceipt {
    pub integration_id: String,
    pub event_id: String,
    pub event_type: String,
    pub status: WebhookStatus,
}

/// Validates, deduplicates and routes inbound webhooks.
pub struct WebhookDispatcher {
    registry: Arc<IntegrationRegistry>,
    dedup: Arc<dyn DedupCache>,
    events: EventBus,
}

impl WebhookDispatcher {
    pub fn new(registry: Arc<IntegrationRegistry>, dedup: Arc<dyn DedupCache>, events: EventBus) -> Self {
        Self {
            registry,
            dedup,
            events,
        }
    }

    /// Handle one delivery. `body` is the raw request body, unparsed.
    pub async fn handle(&self, integration_id: &str, headers: &Headers, body: &[u8]) -> GatewayResult<WebhookReceipt> {
        let target = match self.registry.webhook_target(integration_id) {
            Ok(target) => target,
            Err(err) => {
                self.rejected(integration_id, &err);
                return Err(err);
            }
        };

        if let Err(err) = target.binding.validator.validate_webhook(headers, body).await {
            let mut err = err;
            err.message = target.credentials.redact(&err.message);
            self.rejected(integration_id, &err);
            return Err(err);
        }

        let payload: Value = match serde_json::from_slice(body) {
            Ok(payload) => payload,
            Err(e) => {
                let err = IntegrationError::new(
                    ErrorCode::InvalidPayload,
                    target.provider.as_str(),
                    format!("webhook body is not valid JSON: {e}"),
                );
                self.rejected(integration_id, &err);
                return Err(err);
            }
        };

        let handler = &target.binding.handler;
        let event_id = handler
            .event_id(headers, &payload)
            .unwrap_or_else(|| content_id(body));
        let event_type = handler.event_type(headers, &payload);

        let mut receipt = WebhookReceipt {
            integration_id: integration_id.to_string(),
            event_id: event_id.clone(),
            event_type: event_type.clone(),
            status: WebhookStatus::Processed,
        };

        let dedup_key = format!("{integration_id}:{event_id}");
        if self.dedup.check_and_insert(&dedup_key) {
            tracing::info!(integration_id, event_id = %event_id, event_type = %event_type, "Duplicate webhook ignored");
            metrics::record_webhook(integration_id, "duplicate");
            self.events.publish(
                IntegrationEvent::new(IntegrationEventType::WebhookDuplicate, integration_id)
                    .with("event_id", event_id)
                    .with("event_type", event_type),
            );
            receipt.status = WebhookStatus::Duplicate;
            return Ok(receipt);
        }

        let event = WebhookEvent {
            id: event_id.clone(),
            integration_id: integration_id.to_string(),
            event_type: event_type.clone(),
            timestamp: Utc::now(),
            headers: headers.clone(),
            payload,
            signature: target.binding.validator.signature(headers),
        };

        match handler.process_webhook(&event).await {
            Ok(()) => {
                tracing::info!(integration_id, event_id = %event_id, event_type = %event_type, "Webhook processed");
                metrics::record_webhook(integration_id, "processed");
                self.events.publish(
                    IntegrationEvent::new(IntegrationEventType::WebhookProcessed, integration_id)
                        .with("event_id", event_id)
                        .with("event_type", event_type),
                );
                Ok(receipt)
            }
            Err(mut err) => {
                // The provider will redeliver; let that attempt through.
                self.dedup.forget(&dedup_key);
                err.message = target.credentials.redact(&err.message);
                tracing::warn!(
                    integration_id,
                    event_id = %event_id,
                    error_code = err.code.as_str(),
                    error = %err.message,
                    "Webhook processing failed"
                );
                metrics::record_webhook(integration_id, "failed");
                self.events.publish(
                    IntegrationEvent::new(IntegrationEventType::WebhookFailed, integration_id)
                        .with("event_id", event_id)
                        .with("event_type", event_type)
                        .with("error_code", err.code.as_str())
                        .with("message", err.message.clone()),
                );
                Err(err)
            }
        }
    }

    fn rejected(&self, integration_id: &str, err: &IntegrationError) {
        tracing::warn!(
            integration_id,
            error_code = err.code.as_str(),
            reason = %err.message,
            "Webhook rejected"
        );
        metrics::record_webhook(integration_id, "rejected");
        self.events.publish(
            IntegrationEvent::new(IntegrationEventType::WebhookRejected, integration_id)
                .with("error_code", err.code.as_str())
                .with("reason", err.message.clone()),
        );
    }
}

/// Stable id for deliveries that carry none: a digest of the body.
fn content_id(body: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(body)))
}
