//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound call:
//!     → rate_limit.rs (take a quota permit or fail fast)
//!     → circuit_breaker.rs (admit, or fail fast while open)
//!     → timeouts.rs (bound each attempt)
//!     → On failure: retries.rs (retryable code? wait backoff.rs delay)
//!     → circuit_breaker.rs (record the terminal outcome)
//! ```
//!
//! # Design Decisions
//! - Every external call has a deadline
//! - Breaker and limiter state is per integration; no cross-integration locks
//! - Backoff waits are the only suspension points and are cancellable

pub mod backoff;
pub mod circuit_breaker;
pub mod rate_limit;
pub mod retries;
pub mod timeouts;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitPermit, CircuitSnapshot, CircuitState};
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use retries::RetryPolicy;
