//! Configuration validation.
//!
//! Semantic checks only; serde handles syntax. Every problem is reported,
//! not just the first one, so an operator can fix a config in one pass.

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;

use url::Url;

use crate::config::schema::{GatewayConfig, ADMIN_KEY_PLACEHOLDER};
use crate::resilience::{CircuitBreakerConfig, RateLimitConfig, RetryPolicy};

/// One semantic problem with a config, tied to the offending field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed config.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("invalid socket address '{}'", config.listener.bind_address),
        ));
    }
    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::new("listener.request_timeout_secs", "must be > 0"));
    }
    if config.listener.max_body_bytes == 0 {
        errors.push(ValidationError::new("listener.max_body_bytes", "must be > 0"));
    }

    if config.admin.enabled
        && (config.admin.api_key.trim().is_empty() || config.admin.api_key == ADMIN_KEY_PLACEHOLDER)
    {
        errors.push(ValidationError::new(
            "admin.api_key",
            "must be set to a non-placeholder value when the admin API is enabled",
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("invalid socket address '{}'", config.observability.metrics_address),
        ));
    }

    let health = &config.health_check;
    if health.interval_secs == 0 {
        errors.push(ValidationError::new("health_check.interval_secs", "must be > 0"));
    }
    if health.timeout_secs == 0 {
        errors.push(ValidationError::new("health_check.timeout_secs", "must be > 0"));
    }
    if health.unhealthy_threshold == 0 {
        errors.push(ValidationError::new("health_check.unhealthy_threshold", "must be > 0"));
    }

    if config.events.capacity == 0 {
        errors.push(ValidationError::new("events.capacity", "must be > 0"));
    }
    if config.webhooks.dedup_capacity == 0 {
        errors.push(ValidationError::new("webhooks.dedup_capacity", "must be > 0"));
    }
    if config.webhooks.dedup_ttl_secs == 0 {
        errors.push(ValidationError::new("webhooks.dedup_ttl_secs", "must be > 0"));
    }

    validate_retry("defaults.retry", &config.defaults.retry, &mut errors);
    validate_breaker("defaults.circuit_breaker", &config.defaults.circuit_breaker, &mut errors);
    validate_rate_limit("defaults.rate_limit", &config.defaults.rate_limit, &mut errors);

    let mut seen = HashSet::new();
    for (i, integration) in config.integrations.iter().enumerate() {
        let prefix = format!("integrations[{i}]");

        if integration.id.trim().is_empty() {
            errors.push(ValidationError::new(format!("{prefix}.id"), "must not be empty"));
        } else if !seen.insert(integration.id.as_str()) {
            errors.push(ValidationError::new(
                format!("{prefix}.id"),
                format!("duplicate integration id '{}'", integration.id),
            ));
        }
        if integration.provider.trim().is_empty() {
            errors.push(ValidationError::new(format!("{prefix}.provider"), "must not be empty"));
        }
        if let Some(base_url) = &integration.settings.base_url {
            if let Err(e) = Url::parse(base_url) {
                errors.push(ValidationError::new(
                    format!("{prefix}.settings.base_url"),
                    format!("invalid URL '{base_url}': {e}"),
                ));
            }
        }
        if integration.settings.timeout_ms == Some(0) {
            errors.push(ValidationError::new(format!("{prefix}.settings.timeout_ms"), "must be > 0"));
        }
        if let Some(webhook) = &integration.settings.webhook {
            if webhook.signature_header.trim().is_empty() {
                errors.push(ValidationError::new(
                    format!("{prefix}.settings.webhook.signature_header"),
                    "must not be empty",
                ));
            }
        }
        if let Some(retry) = &integration.retry {
            validate_retry(&format!("{prefix}.retry"), retry, &mut errors);
        }
        if let Some(breaker) = &integration.circuit_breaker {
            validate_breaker(&format!("{prefix}.circuit_breaker"), breaker, &mut errors);
        }
        if let Some(rate_limit) = &integration.rate_limit {
            validate_rate_limit(&format!("{prefix}.rate_limit"), rate_limit, &mut errors);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_retry(prefix: &str, retry: &RetryPolicy, errors: &mut Vec<ValidationError>) {
    if retry.max_attempts == 0 {
        errors.push(ValidationError::new(format!("{prefix}.max_attempts"), "must be >= 1"));
    }
    if retry.backoff_factor.is_nan() || retry.backoff_factor < 1.0 {
        errors.push(ValidationError::new(format!("{prefix}.backoff_factor"), "must be >= 1.0"));
    }
    if retry.initial_delay_ms > retry.max_delay_ms {
        errors.push(ValidationError::new(
            format!("{prefix}.initial_delay_ms"),
            "must not exceed max_delay_ms",
        ));
    }
}

fn validate_breaker(prefix: &str, breaker: &CircuitBreakerConfig, errors: &mut Vec<ValidationError>) {
    if breaker.failure_threshold == 0 {
        errors.push(ValidationError::new(format!("{prefix}.failure_threshold"), "must be >= 1"));
    }
    if breaker.success_threshold == 0 {
        errors.push(ValidationError::new(format!("{prefix}.success_threshold"), "must be >= 1"));
    }
    if breaker.half_open_max_calls == 0 {
        errors.push(ValidationError::new(format!("{prefix}.half_open_max_calls"), "must be >= 1"));
    }
    if breaker.open_timeout_ms == 0 {
        errors.push(ValidationError::new(format!("{prefix}.open_timeout_ms"), "must be > 0"));
    }
}

fn validate_rate_limit(prefix: &str, rate_limit: &RateLimitConfig, errors: &mut Vec<ValidationError>) {
    if rate_limit.requests_per_minute == 0 {
        errors.push(ValidationError::new(format!("{prefix}.requests_per_minute"), "must be >= 1"));
    }
}
