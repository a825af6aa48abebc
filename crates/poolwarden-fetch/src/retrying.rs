//! Live pool fetching with exponential backoff

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use poolwarden_api::MachinePool;
use poolwarden_driver::Driver;
use tracing::{debug, instrument, warn};

use crate::error::FetchError;
use crate::traits::{FetchOptions, PoolFetcher};

/// Retry bound and backoff for live fetches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each further retry
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_backoff: Duration) -> Self {
        Self {
            max_retries,
            initial_backoff,
        }
    }

    /// Delay before retry `retry` (1-based): `initial_backoff * 2^(retry - 1)`
    #[must_use]
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.initial_backoff.saturating_mul(1u32 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(3))
    }
}

/// Fetcher that lists machines through the driver on every call
///
/// Transient driver errors are retried with exponential backoff; other
/// errors fail immediately. Nothing is cached. Dropping the returned
/// future cancels any pending backoff sleep.
pub struct RetryingPoolFetcher {
    driver: Arc<dyn Driver>,
    policy: RetryPolicy,
}

impl RetryingPoolFetcher {
    pub fn new(driver: Arc<dyn Driver>, policy: RetryPolicy) -> Self {
        Self { driver, policy }
    }

    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }
}

#[async_trait]
impl PoolFetcher for RetryingPoolFetcher {
    #[instrument(skip(self), fields(driver = self.driver.driver_type()))]
    async fn get(&self, _options: FetchOptions) -> Result<MachinePool, FetchError> {
        let mut attempt: u32 = 1;

        loop {
            let started_at = Utc::now();
            match self.driver.list_machines().await {
                Ok(machines) => {
                    debug!(attempt, machines = machines.len(), "fetched machine pool");
                    return Ok(MachinePool::new(machines, started_at));
                }
                Err(e) if !e.is_retryable() => {
                    warn!(attempt, error = %e, "non-retryable pool fetch failure");
                    return Err(FetchError::Driver(e));
                }
                Err(e) if attempt > self.policy.max_retries => {
                    warn!(attempts = attempt, error = %e, "pool fetch retries exhausted");
                    return Err(FetchError::RetriesExhausted {
                        attempts: attempt,
                        source: e,
                    });
                }
                Err(e) => {
                    let delay = self.policy.delay_for_retry(attempt);
                    debug!(attempt, delay = ?delay, error = %e, "pool fetch failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
