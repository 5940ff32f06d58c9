//! Integration records and the transport-agnostic envelopes that flow
//! through the gateway.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::IntegrationError;

/// Header map. Lookups go through `get_header`, which ignores case.
pub type Headers = HashMap<String, String>;

/// Case-insensitive header lookup.
pub fn get_header<'a>(headers: &'a Headers, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Header names whose values never leave the process.
pub fn is_sensitive_header(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    matches!(
        name.as_str(),
        "authorization" | "proxy-authorization" | "cookie" | "set-cookie" | "x-api-key" | "api-key"
    ) || ["token", "secret", "signature", "password", "apikey", "api-key"]
        .iter()
        .any(|needle| name.contains(needle))
}

fn serialize_redacted_headers<S: Serializer>(headers: &Headers, s: S) -> Result<S::Ok, S::Error> {
    let redacted: BTreeMap<&str, &str> = headers
        .iter()
        .map(|(k, v)| {
            let value = if is_sensitive_header(k) { "[REDACTED]" } else { v.as_str() };
            (k.as_str(), value)
        })
        .collect();
    redacted.serialize(s)
}

fn serialize_duration_ms<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

fn serialize_opt_duration_ms<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
    match d {
        Some(d) => s.serialize_some(&(d.as_millis() as u64)),
        None => s.serialize_none(),
    }
}

/// Bodies may carry secrets (token exchanges, signed payloads); only the
/// size is emitted.
fn serialize_opaque_body<S: Serializer>(body: &Bytes, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format!("<{} bytes>", body.len()))
}

/// The path only. Query strings and fragments can carry API keys.
pub fn endpoint_path(endpoint: &str) -> &str {
    endpoint
        .find(|c| c == '?' || c == '#')
        .map_or(endpoint, |end| &endpoint[..end])
}

fn serialize_endpoint<S: Serializer>(endpoint: &str, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(endpoint_path(endpoint))
}

/// Functional category of an integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationType {
    Payment,
    Marketplace,
    Shipping,
    Accounting,
    Communication,
    Analytics,
    Ai,
    Storage,
    Auth,
}

/// Lifecycle status of an integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationStatus {
    Active,
    Inactive,
    Error,
    #[default]
    Pending,
}

impl IntegrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Error => "error",
            Self::Pending => "pending",
        }
    }
}

/// Webhook verification settings for the generic HMAC validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookSettings {
    /// Header carrying the hex HMAC-SHA256 signature.
    pub signature_header: String,
    /// Optional header carrying the signing timestamp (unix seconds).
    pub timestamp_header: Option<String>,
    /// Maximum accepted age of a signed timestamp.
    pub tolerance_secs: u64,
    /// Key in `Credentials::extra` holding the shared secret.
    pub secret_key: String,
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            signature_header: "x-signature".to_string(),
            timestamp_header: None,
            tolerance_secs: 300,
            secret_key: "webhook_secret".to_string(),
        }
    }
}

/// Typed provider configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProviderSettings {
    /// Base URL for HTTP-based providers.
    pub base_url: Option<String>,
    /// Path probed by health checks.
    pub health_path: Option<String>,
    /// Default per-attempt timeout for requests that do not set one.
    pub timeout_ms: Option<u64>,
    /// Capabilities advertised by the provider.
    pub capabilities: Vec<String>,
    /// Webhook verification, if the provider sends webhooks.
    pub webhook: Option<WebhookSettings>,
    /// Provider fields unknown at compile time.
    pub extra: Map<String, Value>,
}

/// Where a rate-limit snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitSource {
    Local,
    Provider,
}

/// Snapshot of an integration's call quota.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitInfo {
    pub requests_per_minute: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
    pub source: RateLimitSource,
}

impl RateLimitInfo {
    /// Parse provider quota headers.
    ///
    /// Understands `x-ratelimit-limit`, `x-ratelimit-remaining` and
    /// `x-ratelimit-reset` (seconds until reset, or epoch seconds), falling back
    /// to `retry-after` for the reset time. Returns `None` when the provider
    /// reported neither limit nor remaining.
    pub fn from_headers(headers: &Headers, now: DateTime<Utc>) -> Option<Self> {
        let parse = |name: &str| get_header(headers, name).and_then(|v| v.trim().parse::<u64>().ok());

        let limit = parse("x-ratelimit-limit");
        let remaining = parse("x-ratelimit-remaining");
        if limit.is_none() && remaining.is_none() {
            return None;
        }

        // Values above ten years of seconds are treated as epoch timestamps.
        const EPOCH_CUTOFF: u64 = 10 * 365 * 24 * 3600;
        let reset_at = match parse("x-ratelimit-reset").or_else(|| parse("retry-after")) {
            Some(v) if v > EPOCH_CUTOFF => Utc.timestamp_opt(v as i64, 0).single().unwrap_or(now),
            Some(v) => now + chrono::Duration::seconds(v as i64),
            None => now + chrono::Duration::seconds(60),
        };

        let limit = limit.unwrap_or(0).min(u32::MAX as u64) as u32;
        let remaining = remaining.unwrap_or(limit as u64).min(u32::MAX as u64) as u32;
        Some(Self {
            requests_per_minute: limit,
            remaining,
            reset_at,
            source: RateLimitSource::Provider,
        })
    }
}

/// Operational metadata maintained by the registry and the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct IntegrationMetadata {
    pub last_health_check: Option<DateTime<Utc>>,
    pub last_sync: Option<DateTime<Utc>>,
    pub error_count: u64,
    pub success_count: u64,
    /// Mean response time over every call that reached the provider.
    pub avg_response_time_ms: f64,
    pub rate_limit: Option<RateLimitInfo>,
    pub capabilities: Vec<String>,
    pub consecutive_health_failures: u32,
}

impl IntegrationMetadata {
    /// Fold one provider call into the counters and the running mean.
    pub fn record_call(&mut self, success: bool, elapsed: Duration) {
        if success {
            self.success_count += 1;
            self.last_sync = Some(Utc::now());
        } else {
            self.error_count += 1;
        }
        let total = (self.success_count + self.error_count) as f64;
        let sample = elapsed.as_secs_f64() * 1000.0;
        self.avg_response_time_ms += (sample - self.avg_response_time_ms) / total;
    }
}

/// A configured third-party integration. Credentials live beside the record
/// in the registry, never inside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Integration {
    pub id: String,
    pub name: String,
    pub provider: String,
    pub version: String,
    #[serde(rename = "type")]
    pub integration_type: IntegrationType,
    pub status: IntegrationStatus,
    pub settings: ProviderSettings,
    pub metadata: IntegrationMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outbound request envelope.
#[derive(Debug, Clone, Serialize)]
pub struct IntegrationRequest {
    pub request_id: Uuid,
    pub method: String,
    #[serde(serialize_with = "serialize_endpoint")]
    pub endpoint: String,
    #[serde(serialize_with = "serialize_redacted_headers")]
    pub headers: Headers,
    #[serde(serialize_with = "serialize_opaque_body")]
    pub body: Bytes,
    /// Per-attempt timeout.
    #[serde(rename = "timeout_ms", serialize_with = "serialize_duration_ms")]
    pub timeout: Duration,
    /// Overall budget across all attempts and backoff waits.
    #[serde(rename = "deadline_ms", serialize_with = "serialize_opt_duration_ms")]
    pub deadline: Option<Duration>,
    /// Attempts used so far; set by the executor before each attempt.
    pub attempts: u32,
}

impl IntegrationRequest {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(method: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            method: method.into(),
            endpoint: endpoint.into(),
            headers: Headers::new(),
            body: Bytes::new(),
            timeout: Self::DEFAULT_TIMEOUT,
            deadline: None,
            attempts: 0,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_json(self, value: &Value) -> Self {
        self.with_header("content-type", "application/json")
            .with_body(value.to_string())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Response envelope.
#[derive(Debug, Clone, Serialize)]
pub struct IntegrationResponse {
    pub request_id: Uuid,
    pub status_code: u16,
    #[serde(serialize_with = "serialize_redacted_headers")]
    pub headers: Headers,
    #[serde(serialize_with = "serialize_opaque_body")]
    pub body: Bytes,
    #[serde(rename = "duration_ms", serialize_with = "serialize_duration_ms")]
    pub duration: Duration,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<IntegrationError>,
}

impl IntegrationResponse {
    pub fn new(status_code: u16, body: impl Into<Bytes>) -> Self {
        Self {
            request_id: Uuid::nil(),
            status_code,
            headers: Headers::new(),
            body: body.into(),
            duration: Duration::ZERO,
            attempts: 0,
            error: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code) && self.error.is_none()
    }

    pub fn json(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// An inbound provider callback after validation and parsing.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookEvent {
    pub id: String,
    pub integration_id: String,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    #[serde(serialize_with = "serialize_redacted_headers")]
    pub headers: Headers,
    pub payload: Value,
    pub signature: Option<String>,
}

/// Kinds of lifecycle events published on the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationEventType {
    CallSucceeded,
    CallFailed,
    CallCancelled,
    CircuitOpen,
    RateLimited,
    WebhookProcessed,
    WebhookDuplicate,
    WebhookRejected,
    WebhookFailed,
    HealthCheckFailed,
    StatusChanged,
    Initialized,
    InitializationFailed,
    Deactivated,
}

impl IntegrationEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CallSucceeded => "call_succeeded",
            Self::CallFailed => "call_failed",
            Self::CallCancelled => "call_cancelled",
            Self::CircuitOpen => "circuit_open",
            Self::RateLimited => "rate_limited",
            Self::WebhookProcessed => "webhook_processed",
            Self::WebhookDuplicate => "webhook_duplicate",
            Self::WebhookRejected => "webhook_rejected",
            Self::WebhookFailed => "webhook_failed",
            Self::HealthCheckFailed => "health_check_failed",
            Self::StatusChanged => "status_changed",
            Self::Initialized => "initialized",
            Self::InitializationFailed => "initialization_failed",
            Self::Deactivated => "deactivated",
        }
    }
}

/// The unit published on the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationEvent {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub event_type: IntegrationEventType,
    pub integration_id: String,
    pub timestamp: DateTime<Utc>,
    pub data: Map<String, Value>,
}

impl IntegrationEvent {
    pub fn new(event_type: IntegrationEventType, integration_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            integration_id: integration_id.into(),
            timestamp: Utc::now(),
            data: Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }
}
