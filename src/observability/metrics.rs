//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_calls_total` (counter): terminal call outcomes by integration, outcome
//! - `gateway_call_duration_seconds` (histogram): end-to-end call latency
//! - `gateway_call_attempts` (histogram): attempts consumed per call
//! - `gateway_circuit_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `gateway_rate_limited_total` (counter): local quota denials
//! - `gateway_webhooks_total` (counter): webhooks by integration, outcome
//! - `gateway_integration_health` (gauge): 1=healthy, 0=unhealthy
//! - `gateway_events_dropped_total` (counter): events lost by lagging subscribers
//!
//! # Design Decisions
//! - Components record through the `metrics` facade only; the Prometheus
//!   exporter is installed by the binary
//! - Labels never carry credentials or payload data

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::CircuitState;

/// Install the Prometheus exporter with an HTTP scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Prometheus metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a terminal call outcome.
pub fn record_call(integration_id: &str, outcome: &'static str, attempts: u32, elapsed: Duration) {
    counter!(
        "gateway_calls_total",
        "integration" => integration_id.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    histogram!("gateway_call_duration_seconds", "integration" => integration_id.to_string())
        .record(elapsed.as_secs_f64());
    histogram!("gateway_call_attempts", "integration" => integration_id.to_string()).record(attempts as f64);
}

pub fn record_circuit_state(integration_id: &str, state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    };
    gauge!("gateway_circuit_state", "integration" => integration_id.to_string()).set(value);
}

pub fn record_rate_limited(integration_id: &str) {
    counter!("gateway_rate_limited_total", "integration" => integration_id.to_string()).increment(1);
}

pub fn record_webhook(integration_id: &str, outcome: &'static str) {
    counter!(
        "gateway_webhooks_total",
        "integration" => integration_id.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_integration_health(integration_id: &str, healthy: bool) {
    gauge!("gateway_integration_health", "integration" => integration_id.to_string())
        .set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_event_dropped(subscriber: &str, count: u64) {
    counter!("gateway_events_dropped_total", "subscriber" => subscriber.to_string()).increment(count);
}
