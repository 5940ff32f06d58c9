//! Error taxonomy shared by every gateway component.
//!
//! # Design Decisions
//! - One normalized `ErrorCode` enum; retry policies match on it exactly
//! - Locally raised `CIRCUIT_OPEN` / `RATE_LIMIT` carry no status code, so
//!   callers can tell fail-fast rejections from provider failures
//! - Every error carries provider, timestamp and the correlating request id
//! - Messages are scrubbed of credential values before an error leaves the
//!   executor (see `Credentials::redact`)

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Normalized error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// The integration's circuit breaker rejected the call.
    CircuitOpen,
    /// Call quota exhausted, locally or as reported by the provider.
    RateLimit,
    /// An attempt exceeded its timeout.
    Timeout,
    /// The caller cancelled or the request deadline passed.
    Cancelled,
    /// A webhook failed authenticity validation.
    InvalidSignature,
    /// A webhook body could not be parsed.
    InvalidPayload,
    /// Unknown integration, provider or remote resource.
    NotFound,
    /// Provider-specific failure; see `IntegrationError::provider_code`.
    ProviderError,
    /// Transient provider or transport failure.
    TemporaryFailure,
    /// Provider (or adapter) is unavailable.
    ServiceUnavailable,
    /// Integration is misconfigured or not initialized.
    Configuration,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CircuitOpen => "CIRCUIT_OPEN",
            Self::RateLimit => "RATE_LIMIT",
            Self::Timeout => "TIMEOUT",
            Self::Cancelled => "CANCELLED",
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::InvalidPayload => "INVALID_PAYLOAD",
            Self::NotFound => "NOT_FOUND",
            Self::ProviderError => "PROVIDER_ERROR",
            Self::TemporaryFailure => "TEMPORARY_FAILURE",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            Self::Configuration => "CONFIGURATION",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error produced while mediating a call to or from a provider.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{code} from {provider}: {message}")]
pub struct IntegrationError {
    pub code: ErrorCode,
    pub message: String,
    /// Originating provider (or integration id when the provider is unknown).
    pub provider: String,
    /// Provider-specific code wrapped by `PROVIDER_ERROR`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_code: Option<String>,
    pub retryable: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Attempts consumed before this error surfaced.
    #[serde(default)]
    pub attempts: u32,
}

impl IntegrationError {
    pub fn new(code: ErrorCode, provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider: provider.into(),
            provider_code: None,
            retryable: false,
            timestamp: Utc::now(),
            request_id: None,
            status_code: None,
            attempts: 0,
        }
    }

    pub fn circuit_open(provider: impl Into<String>) -> Self {
        Self::new(ErrorCode::CircuitOpen, provider, "circuit breaker is open")
    }

    pub fn rate_limited(provider: impl Into<String>) -> Self {
        Self::new(ErrorCode::RateLimit, provider, "local rate limit exceeded")
    }

    pub fn cancelled(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Cancelled, provider, message)
    }

    pub fn not_found(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, provider, message)
    }

    pub fn provider_error(
        provider: impl Into<String>,
        provider_code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let mut err = Self::new(ErrorCode::ProviderError, provider, message);
        err.provider_code = Some(provider_code.into());
        err
    }

    pub fn with_request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// True for rejections raised by the gateway itself before the provider
    /// was contacted.
    pub fn is_fail_fast(&self) -> bool {
        matches!(self.code, ErrorCode::CircuitOpen | ErrorCode::RateLimit) && self.status_code.is_none()
    }
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, IntegrationError>;
