//! Request execution with rate limiting, circuit breaking and retries.
//!
//! # Flow
//! ```text
//! acquire rate-limit permit ──denied──▶ RATE_LIMIT
//!     │
//! breaker.allow() ──open──▶ CIRCUIT_OPEN
//!     │
//! attempt loop (≤ max_attempts)
//!     ├─ adapter.call under per-attempt timeout, racing cancel + deadline
//!     ├─ success ──▶ breaker success, metadata, event, return
//!     ├─ non-retryable ──▶ breaker failure, return
//!     ├─ retryable + attempts left ──▶ cancellable backoff wait
//!     └─ exhausted ──▶ breaker failure, return last error + attempt count
//! ```
//!
//! Cancellation (token or deadline) ends the call with `CANCELLED` and is
//! never reported to the breaker.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::error::{GatewayResult, IntegrationError};
use crate::events::EventBus;
use crate::integration::{
    endpoint_path, Credentials, IntegrationEvent, IntegrationEventType, IntegrationMetadata, IntegrationRequest,
    IntegrationResponse, RateLimitInfo,
};
use crate::observability::metrics;
use crate::provider::ProviderAdapter;
use crate::resilience::timeouts::with_timeout;
use crate::resilience::{CircuitBreaker, CircuitBreakerConfig, RateLimitConfig, RateLimiter, RetryPolicy};

/// Why an in-flight call stopped early.
#[derive(Debug, Clone, Copy)]
enum Interrupt {
    Cancelled,
    DeadlineExceeded,
}

impl Interrupt {
    fn message(self) -> &'static str {
        match self {
            Self::Cancelled => "cancelled by caller",
            Self::DeadlineExceeded => "deadline exceeded",
        }
    }
}

/// Resolves when the deadline passes; never, without one.
async fn deadline_reached(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Resilient call path for one integration.
///
/// Owns the integration's breaker and limiter; shares its metadata cell with
/// the registry record.
#[derive(Debug)]
pub struct RequestExecutor {
    integration_id: String,
    provider: String,
    policy: RetryPolicy,
    breaker: CircuitBreaker,
    limiter: RateLimiter,
    metadata: Arc<Mutex<IntegrationMetadata>>,
    events: EventBus,
}

impl RequestExecutor {
    pub fn new(
        integration_id: impl Into<String>,
        provider: impl Into<String>,
        policy: RetryPolicy,
        breaker: &CircuitBreakerConfig,
        rate_limit: &RateLimitConfig,
        metadata: Arc<Mutex<IntegrationMetadata>>,
        events: EventBus,
    ) -> Self {
        let integration_id = integration_id.into();
        Self {
            breaker: CircuitBreaker::new(integration_id.clone(), breaker.clone()),
            limiter: RateLimiter::new(integration_id.clone(), rate_limit),
            integration_id,
            provider: provider.into(),
            policy,
            metadata,
            events,
        }
    }

    pub fn integration_id(&self) -> &str {
        &self.integration_id
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Current quota estimate: the provider's report while fresh, else local.
    pub fn rate_limit(&self) -> RateLimitInfo {
        self.limiter.info()
    }

    /// Execute `request` against `adapter`.
    ///
    /// `credentials` are only used to scrub provider error messages.
    #[tracing::instrument(
        name = "integration_call",
        skip_all,
        fields(
            integration_id = %self.integration_id,
            request_id = %request.request_id,
            method = %request.method,
        )
    )]
    pub async fn execute(
        &self,
        adapter: &dyn ProviderAdapter,
        credentials: &Credentials,
        mut request: IntegrationRequest,
        cancel: &CancellationToken,
    ) -> GatewayResult<IntegrationResponse> {
        let started = Instant::now();
        let deadline = request.deadline.map(|budget| started + budget);

        if let Err(denied) = self.limiter.acquire() {
            tracing::debug!(retry_after_ms = denied.retry_after.as_millis() as u64, "Rate limit exceeded");
            metrics::record_rate_limited(&self.integration_id);
            metrics::record_call(&self.integration_id, "rate_limited", 0, started.elapsed());
            self.publish(
                self.call_event(IntegrationEventType::RateLimited, &request, credentials)
                    .with("retry_after_ms", denied.retry_after.as_millis() as u64),
            );
            return Err(IntegrationError::rate_limited(self.provider.as_str()).with_request_id(request.request_id));
        }

        let _permit = match self.breaker.allow() {
            Ok(permit) => permit,
            Err(open) => {
                tracing::debug!(retry_after_ms = open.retry_after.as_millis() as u64, "Circuit open, failing fast");
                metrics::record_call(&self.integration_id, "circuit_open", 0, started.elapsed());
                self.publish(
                    self.call_event(IntegrationEventType::CircuitOpen, &request, credentials)
                        .with("retry_after_ms", open.retry_after.as_millis() as u64),
                );
                return Err(IntegrationError::circuit_open(self.provider.as_str()).with_request_id(request.request_id));
            }
        };

        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            request.attempts = attempt;
            let attempt_started = Instant::now();

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(Interrupt::Cancelled),
                _ = deadline_reached(deadline) => Err(Interrupt::DeadlineExceeded),
                result = with_timeout(request.timeout, &self.provider, adapter.call(&request)) => Ok(result),
            };
            let attempt_elapsed = attempt_started.elapsed();

            let err = match outcome {
                Err(interrupt) => return Err(self.interrupted(interrupt, &request, credentials, started)),
                Ok(Ok(mut response)) => {
                    response.request_id = request.request_id;
                    response.attempts = attempt;
                    response.duration = started.elapsed();
                    self.on_success(&response, attempt_elapsed, &request, credentials);
                    return Ok(response);
                }
                Ok(Err(err)) => self.normalize(err, &request, credentials),
            };

            if !self.policy.is_retryable(err.code) {
                return Err(self.on_failure(err, attempt, attempt_elapsed, &request, credentials, started));
            }
            if attempt >= max_attempts {
                let mut err = err;
                if attempt > 1 {
                    err.message = format!("{} (after {attempt} attempts)", err.message);
                }
                return Err(self.on_failure(err, attempt, attempt_elapsed, &request, credentials, started));
            }

            let delay = self.policy.next_delay(attempt - 1);
            tracing::debug!(
                attempt,
                error_code = err.code.as_str(),
                delay_ms = delay.as_millis() as u64,
                "Retryable failure, backing off"
            );

            let interrupted = tokio::select! {
                biased;
                _ = cancel.cancelled() => Some(Interrupt::Cancelled),
                _ = deadline_reached(deadline) => Some(Interrupt::DeadlineExceeded),
                _ = sleep(delay) => None,
            };
            if let Some(interrupt) = interrupted {
                return Err(self.interrupted(interrupt, &request, credentials, started));
            }
        }
    }

    /// Stamp gateway fields onto an adapter error and scrub its message.
    fn normalize(&self, mut err: IntegrationError, request: &IntegrationRequest, credentials: &Credentials) -> IntegrationError {
        err.message = credentials.redact(&err.message);
        if err.provider.is_empty() {
            err.provider = self.provider.clone();
        }
        err.request_id = Some(request.request_id);
        err.attempts = request.attempts;
        err.retryable = self.policy.is_retryable(err.code);
        err
    }

    fn on_success(
        &self,
        response: &IntegrationResponse,
        attempt_elapsed: Duration,
        request: &IntegrationRequest,
        credentials: &Credentials,
    ) {
        self.breaker.record_success();
        if let Some(info) = RateLimitInfo::from_headers(&response.headers, Utc::now()) {
            self.limiter.observe_provider(info);
        }
        {
            let mut metadata = self.metadata.lock();
            metadata.record_call(true, attempt_elapsed);
            metadata.rate_limit = Some(self.limiter.info());
        }

        tracing::debug!(
            status_code = response.status_code,
            attempts = response.attempts,
            duration_ms = response.duration.as_millis() as u64,
            "Integration call succeeded"
        );
        metrics::record_call(&self.integration_id, "success", response.attempts, response.duration);
        self.publish(
            self.call_event(IntegrationEventType::CallSucceeded, request, credentials)
                .with("status_code", response.status_code)
                .with("attempts", response.attempts)
                .with("duration_ms", response.duration.as_millis() as u64),
        );
    }

    fn on_failure(
        &self,
        err: IntegrationError,
        attempt: u32,
        attempt_elapsed: Duration,
        request: &IntegrationRequest,
        credentials: &Credentials,
        started: Instant,
    ) -> IntegrationError {
        let err = err.with_attempts(attempt);
        self.breaker.record_failure();
        {
            let mut metadata = self.metadata.lock();
            metadata.record_call(false, attempt_elapsed);
            metadata.rate_limit = Some(self.limiter.info());
        }

        tracing::warn!(
            error_code = err.code.as_str(),
            attempts = attempt,
            error = %err.message,
            "Integration call failed"
        );
        metrics::record_call(&self.integration_id, "failure", attempt, started.elapsed());

        let mut event = self
            .call_event(IntegrationEventType::CallFailed, request, credentials)
            .with("error_code", err.code.as_str())
            .with("message", err.message.clone())
            .with("attempts", attempt)
            .with("retryable", err.retryable);
        if let Some(status) = err.status_code {
            event = event.with("status_code", status);
        }
        if let Some(code) = &err.provider_code {
            event = event.with("provider_code", code.clone());
        }
        self.publish(event);
        err
    }

    fn interrupted(
        &self,
        interrupt: Interrupt,
        request: &IntegrationRequest,
        credentials: &Credentials,
        started: Instant,
    ) -> IntegrationError {
        tracing::info!(attempts = request.attempts, reason = interrupt.message(), "Integration call cancelled");
        metrics::record_call(&self.integration_id, "cancelled", request.attempts, started.elapsed());
        self.publish(
            self.call_event(IntegrationEventType::CallCancelled, request, credentials)
                .with("reason", interrupt.message())
                .with("attempts", request.attempts),
        );
        IntegrationError::cancelled(self.provider.as_str(), interrupt.message())
            .with_request_id(request.request_id)
            .with_attempts(request.attempts)
    }

    /// Event skeleton for a call outcome. Only ids, method and the scrubbed
    /// endpoint path; headers and bodies stay out of the bus.
    fn call_event(
        &self,
        event_type: IntegrationEventType,
        request: &IntegrationRequest,
        credentials: &Credentials,
    ) -> IntegrationEvent {
        IntegrationEvent::new(event_type, self.integration_id.as_str())
            .with("request_id", request.request_id.to_string())
            .with("provider", self.provider.as_str())
            .with("method", request.method.as_str())
            .with("endpoint", credentials.redact(endpoint_path(&request.endpoint)))
    }

    fn publish(&self, event: IntegrationEvent) {
        self.events.publish(event);
    }
}
