//! Bounded exponential backoff for access service calls.

use crate::types::{RetryConfig, ServiceError};
use backoff::ExponentialBackoffBuilder;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_interval: Duration,
    multiplier: f64,
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_interval: Duration::from_millis(config.initial_interval_ms),
            multiplier: config.multiplier,
        }
    }

    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_interval: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether `err` may be retried.
    ///
    /// Idempotent requests retry on any transport failure. Others only retry when the
    /// connection was never established, so the server cannot have seen them.
    pub fn should_retry(err: &ServiceError, idempotent: bool) -> bool {
        match err {
            ServiceError::Connect(_) => true,
            ServiceError::Transport(_) => idempotent,
            _ => false,
        }
    }

    /// Run `operation` until it succeeds, fails permanently or runs out of attempts
    pub async fn run<T, F, Fut>(&self, idempotent: bool, mut operation: F) -> Result<T, ServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_interval)
            .with_multiplier(self.multiplier)
            .with_max_elapsed_time(None)
            .build();

        let max_attempts = self.max_attempts;
        let mut attempts = 0u32;

        backoff::future::retry(backoff, || {
            attempts += 1;
            let attempt = attempts;
            let call = operation();

            async move {
                call.await.map_err(|err| {
                    if attempt < max_attempts && Self::should_retry(&err, idempotent) {
                        log::warn!("Attempt {attempt}/{max_attempts} failed, retrying: {err}");
                        backoff::Error::transient(err)
                    } else {
                        backoff::Error::permanent(err)
                    }
                })
            }
        })
        .await
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&RetryConfig::default())
    }
}
