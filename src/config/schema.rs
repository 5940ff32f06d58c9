//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::integration::{IntegrationType, ProviderSettings};
use crate::registry::IntegrationDefinition;
use crate::resilience::{CircuitBreakerConfig, RateLimitConfig, RetryPolicy};

/// Placeholder admin key; validation rejects it when the admin API is on.
pub const ADMIN_KEY_PLACEHOLDER: &str = "CHANGE_ME_IN_PRODUCTION";

/// Root configuration for the integration gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Ingress listener (webhooks + admin API).
    pub listener: ListenerConfig,

    /// Admin API settings.
    pub admin: AdminConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Policies applied to integrations without their own overrides.
    pub defaults: DefaultsConfig,

    /// Health check sweep settings.
    pub health_check: HealthCheckConfig,

    /// Event bus settings.
    pub events: EventBusConfig,

    /// Webhook ingestion settings.
    pub webhooks: WebhookConfig,

    /// Configured integrations.
    pub integrations: Vec<IntegrationConfig>,
}

/// Ingress listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Overall request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Maximum accepted webhook body in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Mount the admin routes on the ingress listener.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: ADMIN_KEY_PLACEHOLDER.to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Gateway-wide default policies, built once at startup.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct DefaultsConfig {
    pub retry: RetryPolicy,
    pub circuit_breaker: CircuitBreakerConfig,
    pub rate_limit: RateLimitConfig,
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable the periodic sweep.
    pub enabled: bool,

    /// Sweep interval in seconds.
    pub interval_secs: u64,

    /// Per-check timeout in seconds.
    pub timeout_secs: u64,

    /// Consecutive failures before an integration is marked `error`.
    pub unhealthy_threshold: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
            timeout_secs: 5,
            unhealthy_threshold: 3,
        }
    }
}

/// Event bus configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EventBusConfig {
    /// Per-subscriber queue depth.
    pub capacity: usize,

    /// Attach the audit log subscriber.
    pub audit_log: bool,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            audit_log: true,
        }
    }
}

/// Webhook ingestion configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Recent event ids remembered for duplicate detection.
    pub dedup_capacity: usize,

    /// How long an event id is remembered, in seconds.
    pub dedup_ttl_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            dedup_capacity: 10_000,
            dedup_ttl_secs: 24 * 3600,
        }
    }
}

/// Names of the environment variables that hold an integration's secrets.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct CredentialsConfig {
    pub api_key_env: Option<String>,
    pub api_secret_env: Option<String>,
    pub access_token_env: Option<String>,
    pub refresh_token_env: Option<String>,
    /// Provider-specific secret name -> environment variable.
    pub extra_env: HashMap<String, String>,
}

/// One configured integration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IntegrationConfig {
    /// Unique integration identifier.
    pub id: String,

    /// Display name (defaults to the id).
    #[serde(default)]
    pub name: Option<String>,

    /// Provider implementation to use (e.g. "http").
    pub provider: String,

    /// Provider API version.
    #[serde(default = "default_version")]
    pub version: String,

    #[serde(rename = "type")]
    pub integration_type: IntegrationType,

    /// Initialize at startup.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub settings: ProviderSettings,

    #[serde(default)]
    pub credentials: CredentialsConfig,

    /// Per-integration overrides of the gateway defaults.
    #[serde(default)]
    pub retry: Option<RetryPolicy>,

    #[serde(default)]
    pub circuit_breaker: Option<CircuitBreakerConfig>,

    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,
}

fn default_version() -> String {
    "v1".to_string()
}

fn default_enabled() -> bool {
    true
}

impl IntegrationConfig {
    pub fn to_definition(&self) -> IntegrationDefinition {
        IntegrationDefinition {
            id: self.id.clone(),
            name: self.name.clone().unwrap_or_else(|| self.id.clone()),
            provider: self.provider.clone(),
            version: self.version.clone(),
            integration_type: self.integration_type,
            settings: self.settings.clone(),
            retry: self.retry.clone(),
            circuit_breaker: self.circuit_breaker.clone(),
            rate_limit: self.rate_limit.clone(),
        }
    }
}
