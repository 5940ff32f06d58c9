//! Circuit breaker for provider protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: provider assumed down, calls fail fast with `CIRCUIT_OPEN`
//! - Half-Open: a bounded number of trial calls probe for recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= failure_threshold
//! Open → Half-Open: first call after open_timeout has elapsed
//! Half-Open → Closed: consecutive successes >= success_threshold
//! Half-Open → Open: any failure (open timer restarts)
//! ```
//!
//! # Design Decisions
//! - One breaker per integration, never global
//! - Half-open admission is an RAII permit; dropping it frees the trial slot
//! - Transitions are logged after the lock is released

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;

use crate::observability::metrics;

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures in Closed before opening.
    pub failure_threshold: u32,
    /// Consecutive trial successes in Half-Open before closing.
    pub success_threshold: u32,
    /// Time spent Open before a trial call is admitted.
    pub open_timeout_ms: u64,
    /// Maximum concurrent trial calls while Half-Open.
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            open_timeout_ms: 60_000,
            half_open_max_calls: 3,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }
}

/// Breaker phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// Rejection returned by `CircuitBreaker::allow`.
#[derive(Debug, Clone, Error)]
#[error("circuit {state:?}, retry after {retry_after:?}")]
pub struct CircuitOpenError {
    pub state: CircuitState,
    pub retry_after: Duration,
}

/// Point-in-time view of a breaker, for admin and metrics.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub half_open_in_flight: u32,
    pub open_for_ms: Option<u64>,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
    half_open_in_flight: u32,
    /// Bumped on every transition so stale permits don't touch new phases.
    generation: u64,
}

impl Inner {
    fn transition(&mut self, to: CircuitState, now: Instant) {
        self.state = to;
        self.generation = self.generation.wrapping_add(1);
        self.consecutive_successes = 0;
        self.half_open_in_flight = 0;
        match to {
            CircuitState::Open => self.opened_at = Some(now),
            CircuitState::HalfOpen => {}
            CircuitState::Closed => {
                self.consecutive_failures = 0;
                self.opened_at = None;
            }
        }
    }
}

/// Per-integration circuit breaker, shared by all callers.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Arc<Mutex<Inner>>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Arc::new(Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                opened_at: None,
                half_open_in_flight: 0,
                generation: 0,
            })),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Ask to place a call.
    pub fn allow(&self) -> Result<CircuitPermit, CircuitOpenError> {
        let now = Instant::now();
        let mut half_opened = false;

        let result = {
            let mut inner = self.inner.lock();
            match inner.state {
                CircuitState::Closed => Ok(CircuitPermit::unguarded()),
                CircuitState::Open => {
                    let timeout = self.config.open_timeout();
                    let elapsed = inner
                        .opened_at
                        .map(|at| now.saturating_duration_since(at))
                        .unwrap_or(timeout);
                    if elapsed >= timeout {
                        inner.transition(CircuitState::HalfOpen, now);
                        half_opened = true;
                        Ok(self.admit_trial(&mut inner))
                    } else {
                        Err(CircuitOpenError {
                            state: CircuitState::Open,
                            retry_after: timeout - elapsed,
                        })
                    }
                }
                CircuitState::HalfOpen => {
                    if inner.half_open_in_flight < self.config.half_open_max_calls {
                        Ok(self.admit_trial(&mut inner))
                    } else {
                        Err(CircuitOpenError {
                            state: CircuitState::HalfOpen,
                            retry_after: Duration::ZERO,
                        })
                    }
                }
            }
        };

        if half_opened {
            self.on_transition(CircuitState::HalfOpen);
        }
        result
    }

    fn admit_trial(&self, inner: &mut Inner) -> CircuitPermit {
        inner.half_open_in_flight += 1;
        CircuitPermit {
            trial: Some((self.inner.clone(), inner.generation)),
        }
    }

    /// Report a successful call.
    pub fn record_success(&self) {
        let transitioned = {
            let mut inner = self.inner.lock();
            match inner.state {
                CircuitState::Closed => {
                    inner.consecutive_failures = 0;
                    false
                }
                CircuitState::HalfOpen => {
                    inner.consecutive_successes += 1;
                    if inner.consecutive_successes >= self.config.success_threshold {
                        inner.transition(CircuitState::Closed, Instant::now());
                        true
                    } else {
                        false
                    }
                }
                // Late result from a call admitted before the breaker opened.
                CircuitState::Open => false,
            }
        };

        if transitioned {
            self.on_transition(CircuitState::Closed);
        }
    }

    /// Report a failed call.
    pub fn record_failure(&self) {
        let transitioned = {
            let mut inner = self.inner.lock();
            match inner.state {
                CircuitState::Closed => {
                    inner.consecutive_failures += 1;
                    if inner.consecutive_failures >= self.config.failure_threshold {
                        inner.transition(CircuitState::Open, Instant::now());
                        true
                    } else {
                        false
                    }
                }
                CircuitState::HalfOpen => {
                    inner.consecutive_failures += 1;
                    inner.transition(CircuitState::Open, Instant::now());
                    true
                }
                CircuitState::Open => false,
            }
        };

        if transitioned {
            self.on_transition(CircuitState::Open);
        }
    }

    /// Force the breaker closed (operator action).
    pub fn reset(&self) {
        self.inner.lock().transition(CircuitState::Closed, Instant::now());
        tracing::info!(integration_id = %self.name, "Circuit breaker manually reset");
        metrics::record_circuit_state(&self.name, CircuitState::Closed);
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let inner = self.inner.lock();
        CircuitSnapshot {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            consecutive_successes: inner.consecutive_successes,
            half_open_in_flight: inner.half_open_in_flight,
            open_for_ms: match inner.state {
                CircuitState::Open => inner
                    .opened_at
                    .map(|at| Instant::now().saturating_duration_since(at).as_millis() as u64),
                _ => None,
            },
        }
    }

    fn on_transition(&self, to: CircuitState) {
        match to {
            CircuitState::Open => tracing::warn!(
                integration_id = %self.name,
                failure_threshold = self.config.failure_threshold,
                open_timeout_ms = self.config.open_timeout_ms,
                "Circuit breaker opened"
            ),
            CircuitState::HalfOpen => tracing::info!(
                integration_id = %self.name,
                max_trial_calls = self.config.half_open_max_calls,
                "Circuit breaker half-open, probing"
            ),
            CircuitState::Closed => tracing::info!(integration_id = %self.name, "Circuit breaker closed"),
        }
        metrics::record_circuit_state(&self.name, to);
    }
}

/// Admission ticket returned by `CircuitBreaker::allow`.
#[derive(Debug)]
pub struct CircuitPermit {
    trial: Option<(Arc<Mutex<Inner>>, u64)>,
}

impl CircuitPermit {
    fn unguarded() -> Self {
        Self { trial: None }
    }

    /// True if this permit occupies a half-open trial slot.
    pub fn is_trial(&self) -> bool {
        self.trial.is_some()
    }
}

impl Drop for CircuitPermit {
    fn drop(&mut self) {
        if let Some((inner, generation)) = self.trial.take() {
            let mut inner = inner.lock();
            if inner.generation == generation && inner.state == CircuitState::HalfOpen {
                inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
            }
        }
    }
}
