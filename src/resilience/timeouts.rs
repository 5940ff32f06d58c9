//! Timeout enforcement.
//!
//! Every provider call, health check included, runs under a deadline.
//! Timeout errors are distinct (`TIMEOUT`) from provider failures.

use std::future::Future;
use std::time::Duration;

use crate::error::{ErrorCode, IntegrationError};

/// Run `fut`, failing with `TIMEOUT` if it does not finish within `limit`.
pub async fn with_timeout<T, F>(limit: Duration, provider: &str, fut: F) -> Result<T, IntegrationError>
where
    F: Future<Output = Result<T, IntegrationError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(IntegrationError::new(
            ErrorCode::Timeout,
            provider,
            format!("timed out after {}ms", limit.as_millis()),
        )),
    }
}
