//! Per-integration call quota.
//!
//! # Design Decisions
//! - Token bucket: capacity = requests per minute, refilled continuously at
//!   capacity / 60 per second
//! - A rolling 60 s grant log caps admissions at the configured ceiling in
//!   any window; the bucket alone would admit a refill on top of a full burst
//! - `acquire` never waits; denial is immediate
//! - Provider-reported quota overrides the local estimate for reporting only

use std::collections::VecDeque;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;

use crate::integration::{RateLimitInfo, RateLimitSource};

const WINDOW: Duration = Duration::from_secs(60);

/// Rate limit configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
        }
    }
}

/// Denial returned by `RateLimiter::acquire`.
#[derive(Debug, Clone, Error)]
#[error("rate limit of {requests_per_minute}/min exceeded, retry after {retry_after:?}")]
pub struct RateLimitExceeded {
    pub requests_per_minute: u32,
    pub retry_after: Duration,
}

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn refill(&mut self, now: Instant, capacity: f64, refill_rate: f64) {
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;
    }
}

#[derive(Debug)]
struct LimiterState {
    bucket: TokenBucket,
    grants: VecDeque<Instant>,
    provider: Option<RateLimitInfo>,
}

impl LimiterState {
    fn prune(&mut self, now: Instant) {
        while let Some(front) = self.grants.front() {
            if now.saturating_duration_since(*front) >= WINDOW {
                self.grants.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Token-bucket limiter for one integration.
#[derive(Debug)]
pub struct RateLimiter {
    name: String,
    requests_per_minute: u32,
    capacity: f64,
    refill_rate: f64,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    pub fn new(name: impl Into<String>, config: &RateLimitConfig) -> Self {
        let rpm = config.requests_per_minute;
        let capacity = rpm as f64;
        Self {
            name: name.into(),
            requests_per_minute: rpm,
            capacity,
            refill_rate: capacity / 60.0,
            state: Mutex::new(LimiterState {
                bucket: TokenBucket {
                    tokens: capacity,
                    last_update: Instant::now(),
                },
                grants: VecDeque::with_capacity(rpm.min(4096) as usize),
                provider: None,
            }),
        }
    }

    pub fn requests_per_minute(&self) -> u32 {
        self.requests_per_minute
    }

    /// Take one permit or fail immediately.
    pub fn acquire(&self) -> Result<(), RateLimitExceeded> {
        let now = Instant::now();
        let mut state = self.state.lock();
        state.bucket.refill(now, self.capacity, self.refill_rate);
        state.prune(now);

        let window_full = state.grants.len() >= self.requests_per_minute as usize;
        if state.bucket.tokens >= 1.0 && !window_full {
            state.bucket.tokens -= 1.0;
            state.grants.push_back(now);
            return Ok(());
        }

        let retry_after = self.retry_after(&state, now);
        drop(state);

        tracing::debug!(
            integration_id = %self.name,
            retry_after_ms = retry_after.as_millis() as u64,
            "Rate limit exceeded"
        );
        Err(RateLimitExceeded {
            requests_per_minute: self.requests_per_minute,
            retry_after,
        })
    }

    fn retry_after(&self, state: &LimiterState, now: Instant) -> Duration {
        let token_wait = if state.bucket.tokens >= 1.0 || self.refill_rate <= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64((1.0 - state.bucket.tokens) / self.refill_rate)
        };
        let window_wait = if state.grants.len() >= self.requests_per_minute as usize {
            state
                .grants
                .front()
                .map(|oldest| WINDOW.saturating_sub(now.saturating_duration_since(*oldest)))
                .unwrap_or(Duration::ZERO)
        } else {
            Duration::ZERO
        };
        token_wait.max(window_wait)
    }

    /// Record quota reported by the provider.
    pub fn observe_provider(&self, info: RateLimitInfo) {
        self.state.lock().provider = Some(info);
    }

    /// Current quota view: the provider's report while it is still valid,
    /// otherwise the local estimate.
    pub fn info(&self) -> RateLimitInfo {
        let now = Instant::now();
        let wall_now = Utc::now();
        let mut state = self.state.lock();

        if let Some(provider) = &state.provider {
            if provider.reset_at > wall_now {
                return provider.clone();
            }
        }

        state.bucket.refill(now, self.capacity, self.refill_rate);
        state.prune(now);

        let window_left = (self.requests_per_minute as usize).saturating_sub(state.grants.len());
        let remaining = (state.bucket.tokens.floor() as usize).min(window_left) as u32;
        let reset_in = self.retry_after(&state, now);
        RateLimitInfo {
            requests_per_minute: self.requests_per_minute,
            remaining,
            reset_at: wall_now + chrono::Duration::from_std(reset_in).unwrap_or_else(|_| chrono::Duration::zero()),
            source: RateLimitSource::Local,
        }
    }
}
