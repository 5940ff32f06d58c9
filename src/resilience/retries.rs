//! Retry policy.
//!
//! # Design Decisions
//! - Retryability is exact membership of the normalized `ErrorCode` in the
//!   policy's set; unlisted codes surface immediately
//! - Jitter is off by default so the delay sequence is deterministic
//! - One policy per integration, built once at startup

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;
use crate::resilience::backoff::{exponential_delay, with_jitter};

/// Immutable retry configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
    /// Error codes retried automatically.
    pub retryable: HashSet<ErrorCode>,
    /// Add up to 10% random jitter to each wait.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            backoff_factor: 2.0,
            retryable: [
                ErrorCode::Timeout,
                ErrorCode::RateLimit,
                ErrorCode::TemporaryFailure,
                ErrorCode::ServiceUnavailable,
            ]
            .into_iter()
            .collect(),
            jitter: false,
        }
    }
}

impl RetryPolicy {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn is_retryable(&self, code: ErrorCode) -> bool {
        self.retryable.contains(&code)
    }

    /// Delay before the retry that follows attempt index `attempt` (0-based),
    /// without jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        exponential_delay(attempt, self.initial_delay(), self.backoff_factor, self.max_delay())
    }

    /// Delay actually waited, jittered if enabled.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let delay = self.delay_for(attempt);
        if self.jitter {
            with_jitter(delay)
        } else {
            delay
        }
    }

    /// The un-jittered delay schedule, one entry per attempt.
    pub fn delays(&self) -> Vec<Duration> {
        (0..self.max_attempts).map(|attempt| self.delay_for(attempt)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_sequence_is_exact() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            backoff_factor: 2.0,
            ..RetryPolicy::default()
        };

        let secs: Vec<Duration> = [1, 2, 4, 8, 16].into_iter().map(Duration::from_secs).collect();
        assert_eq!(policy.delays(), secs);
        assert_eq!(policy.next_delay(3), Duration::from_secs(8));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let policy = RetryPolicy {
            max_attempts: 8,
            ..RetryPolicy::default()
        };
        let delays = policy.delays();
        assert_eq!(delays[5], Duration::from_secs(30));
        assert_eq!(delays[7], Duration::from_secs(30));
    }

    #[test]
    fn test_retryable_is_exact_membership() {
        let policy = RetryPolicy::default();
        assert!(policy.is_retryable(ErrorCode::Timeout));
        assert!(policy.is_retryable(ErrorCode::ServiceUnavailable));
        assert!(!policy.is_retryable(ErrorCode::InvalidSignature));
        assert!(!policy.is_retryable(ErrorCode::NotFound));
        assert!(!policy.is_retryable(ErrorCode::ProviderError));
        assert!(!policy.is_retryable(ErrorCode::Cancelled));
    }

    #[test]
    fn test_policy_from_toml() {
        let policy: RetryPolicy = toml::from_str(
            r#"
            max_attempts = 4
            initial_delay_ms = 250
            retryable = ["TIMEOUT", "PROVIDER_ERROR"]
            "#,
        )
        .unwrap();
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.max_delay_ms, 30_000);
        assert!(policy.is_retryable(ErrorCode::ProviderError));
        assert!(!policy.is_retryable(ErrorCode::RateLimit));
    }
}
