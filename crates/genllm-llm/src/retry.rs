//! Retry logic with exponential backoff
//!
//! [`RetryPolicy`] retries an async operation on transient [`LLMError`](crate::LLMError)s.
//! [`RetryTransport`] applies a policy to every request of another
//! transport, so a failed send inside a tool loop is retried on its own
//! without re-running the tools that preceded it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::transport::ChatTransport;
use crate::Result;
#[cfg(test)]
use crate::LLMError;

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,

    /// Initial backoff duration
    pub initial_backoff: Duration,

    /// Maximum backoff duration
    pub max_backoff: Duration,

    /// Backoff multiplier (typically 2.0 for exponential backoff)
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy
    pub fn new(
        max_attempts: u32,
        initial_backoff: Duration,
        max_backoff: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_attempts,
            initial_backoff,
            max_backoff,
            backoff_multiplier,
        }
    }

    /// Create a policy with no retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::from_secs(0),
            max_backoff: Duration::from_secs(0),
            backoff_multiplier: 1.0,
        }
    }

    /// Create a policy with fast retries (for testing)
    pub fn fast() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(100),
            backoff_multiplier: 2.0,
        }
    }

    /// Calculate backoff duration for a given attempt
    fn backoff_duration(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::from_secs(0);
        }

        let backoff_ms = self.initial_backoff.as_millis() as f64
            * self.backoff_multiplier.powi((attempt - 1) as i32);

        Duration::from_millis(backoff_ms as u64).min(self.max_backoff)
    }

    /// Execute an async operation with retry logic
    ///
    /// # Arguments
    ///
    /// * `operation_name` - Name of the operation (for logging)
    /// * `operation` - Async operation to execute
    ///
    /// # Returns
    ///
    /// Result of the operation, or the last error if all attempts fail
    pub async fn execute<F, Fut, T>(&self, operation_name: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(operation = operation_name, attempt, max_attempts = attempts, "Attempting operation");

            match operation().await {
                Ok(result) => {
                    if attempt > 1 {
                        debug!(operation = operation_name, retries = attempt - 1, "Operation succeeded after retries");
                    }
                    return Ok(result);
                }
                Err(e) if !e.is_retryable() => {
                    debug!(operation = operation_name, error = %e, "Operation failed with non-retryable error");
                    return Err(e);
                }
                Err(e) if attempt >= attempts => {
                    warn!(operation = operation_name, attempts, error = %e, "Operation failed after all attempts");
                    return Err(e);
                }
                Err(e) => {
                    let backoff = self.backoff_duration(attempt);
                    warn!(
                        operation = operation_name,
                        attempt,
                        max_attempts = attempts,
                        error = %e,
                        backoff_ms = backoff.as_millis() as u64,
                        "Operation failed, retrying"
                    );
                    sleep(backoff).await;
                }
            }
        }
    }
}

/// [`ChatTransport`] decorator that retries transient failures
pub struct RetryTransport {
    inner: Arc<dyn ChatTransport>,
    policy: RetryPolicy,
}

impl RetryTransport {
    /// Wrap `inner` with `policy`
    pub fn new(inner: Arc<dyn ChatTransport>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// The active policy
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl ChatTransport for RetryTransport {
    async fn send(&self, body: Value) -> Result<Value> {
        let name = self.inner.name().to_string();
        self.policy
            .execute(&name, || {
                let body = body.clone();
                async move { self.inner.send(body).await }
            })
            .await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

/// Convenience for boxing a retry-wrapped transport
pub fn with_retry(inner: Arc<dyn ChatTransport>, policy: RetryPolicy) -> Arc<dyn ChatTransport> {
    if policy.max_attempts <= 1 {
        return inner;
    }
    Arc::new(RetryTransport::new(inner, policy))
}
