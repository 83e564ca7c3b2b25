use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::config::RetryConfig;

/// Bounded retry with a fixed delay between attempts.
///
/// Every error from the work unit is treated as recoverable and retried
/// identically; classification happens in the error taxonomy, not here.
/// The work unit must be idempotent: it is only re-invoked after a
/// confirmed failure, but each invocation repeats its side effects.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, delay: Duration::from_secs(5) }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{label} gave up after {attempts} attempts: {source}")]
pub struct RetryExhausted<E>
where
    E: std::error::Error + 'static,
{
    pub label: &'static str,
    pub attempts: u32,
    #[source]
    pub source: E,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            delay: Duration::from_secs(config.delay_secs),
        }
    }
}

impl RetryPolicy {
    /// Invoke `op` until it succeeds or `max_attempts` failures have been
    /// observed. The first `Ok` is returned immediately; the final `Err`
    /// is wrapped in [`RetryExhausted`] tagged with the attempt count.
    pub async fn run<T, E, F, Fut>(
        &self,
        label: &'static str,
        mut op: F,
    ) -> Result<T, RetryExhausted<E>>
    where
        E: std::error::Error + 'static,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    warn!(
                        label,
                        attempt,
                        max_attempts,
                        error = %error,
                        "attempt failed"
                    );

                    if attempt >= max_attempts {
                        return Err(RetryExhausted { label, attempts: attempt, source: error });
                    }

                    if !self.delay.is_zero() {
                        tokio::time::sleep(self.delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}
