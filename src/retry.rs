//! Retry with capped exponential backoff.
//!
//! Wraps every external call: source providers, firewall reads and
//! firewall writes. Validation failures never reach this layer, so
//! everything it sees is treated as transient.

use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::RetrySettings;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Randomize each delay between half and all of its nominal value
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryPolicy {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            jitter: true,
        }
    }

    /// Single attempt, no waiting.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            jitter: false,
        }
    }

    #[must_use]
    pub const fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    #[must_use]
    pub const fn initial_backoff(mut self, duration: Duration) -> Self {
        self.initial_backoff = duration;
        self
    }

    #[must_use]
    pub const fn max_backoff(mut self, duration: Duration) -> Self {
        self.max_backoff = duration;
        self
    }

    #[must_use]
    pub const fn jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// Nominal delay before retry number `retry` (0-based), without jitter.
    #[must_use]
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let factor = 2u64.checked_pow(retry).unwrap_or(u64::MAX);
        let backoff = (self.initial_backoff.as_millis() as u64).saturating_mul(factor);
        let max = self.max_backoff.as_millis() as u64;
        Duration::from_millis(backoff.min(max))
    }

    fn delay_for(&self, retry: u32) -> Duration {
        let nominal = self.backoff_for(retry);
        if !self.jitter || nominal.is_zero() {
            return nominal;
        }
        let millis = nominal.as_millis() as u64;
        Duration::from_millis(rand::rng().random_range(millis / 2..=millis))
    }

    /// Run `op` until it succeeds or attempts run out, returning the last error.
    pub async fn run<T, E, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= attempts => {
                    if attempts > 1 {
                        warn!("{} failed after {} attempts: {}", operation, attempts, e);
                    }
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.delay_for(attempt - 1);
                    warn!(
                        "{} failed (attempt {}/{}): {}, retrying in {}ms",
                        operation,
                        attempt,
                        attempts,
                        e,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    debug!("{}: attempt {}/{}", operation, attempt, attempts);
                }
            }
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self::new()
            .max_attempts(settings.max_attempts)
            .initial_backoff(Duration::from_millis(settings.initial_backoff_ms))
            .max_backoff(Duration::from_millis(settings.max_backoff_ms))
            .jitter(settings.jitter)
    }
}
