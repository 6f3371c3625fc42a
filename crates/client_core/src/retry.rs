use std::{fmt, future::Future, sync::Arc, time::Duration};

use tracing::warn;

use crate::error::StoreError;

pub type RetryPredicate = Arc<dyn Fn(&StoreError) -> bool + Send + Sync>;

/// Bounded exponential backoff around one remote call.
#[derive(Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt; `0` means a single attempt.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub should_retry: RetryPredicate,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            backoff_multiplier: 2.0,
            should_retry: Arc::new(StoreError::is_transient),
        }
    }
}

impl fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_retries", &self.max_retries)
            .field("initial_delay", &self.initial_delay)
            .field("max_delay", &self.max_delay)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .finish_non_exhaustive()
    }
}

impl RetryConfig {
    /// One attempt, no waiting.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn with_predicate(
        mut self,
        should_retry: impl Fn(&StoreError) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.should_retry = Arc::new(should_retry);
        self
    }

    /// Wait before retry `attempt` (0-based):
    /// `min(initial_delay * backoff_multiplier^attempt, max_delay)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let scaled = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let cap = self.max_delay.as_secs_f64();
        if !scaled.is_finite() || scaled >= cap {
            return self.max_delay;
        }
        Duration::from_secs_f64(scaled.max(0.0))
    }
}

/// Runs `operation` until it succeeds, returns a non-retryable error, or
/// the retry budget is spent. The last error wins.
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    label: &str,
    mut operation: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= config.max_retries || !(config.should_retry)(&err) {
                    return Err(err);
                }
                let delay = config.delay_for(attempt);
                attempt += 1;
                warn!(
                    operation = label,
                    attempt,
                    max_retries = config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying remote call"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/retry_tests.rs"]
mod tests;
