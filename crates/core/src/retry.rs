//! Retry with exponential backoff and jitter for release downloads

use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Jitter strategy for retry delays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JitterStrategy {
    /// Random delay between 0 and the calculated delay
    #[default]
    FullJitter,
    /// Half the calculated delay plus a random half
    EqualJitter,
}

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the initial attempt
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: JitterStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            jitter: JitterStrategy::default(),
        }
    }
}

impl RetryConfig {
    /// No retries, for tests
    pub fn none() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponential = self
            .base_delay
            .as_millis()
            .saturating_mul(2_u128.saturating_pow(attempt));
        let capped = exponential.min(self.max_delay.as_millis()) as u64;

        match self.jitter {
            JitterStrategy::FullJitter => Duration::from_millis(fastrand::u64(0..=capped)),
            JitterStrategy::EqualJitter => {
                let half = capped / 2;
                Duration::from_millis(half + fastrand::u64(0..=half))
            }
        }
    }
}

/// Whether a failed attempt is worth retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    Stop,
}

/// Retry an async operation, classifying each error
#[instrument(level = "debug", skip(operation, classify))]
pub async fn retry_async<T, E, Fut, Op>(
    config: &RetryConfig,
    operation: Op,
    classify: fn(&E) -> RetryDecision,
) -> Result<T, E>
where
    Op: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if attempt >= config.max_attempts || classify(&error) == RetryDecision::Stop {
                    if attempt > 0 {
                        warn!("Giving up after {} attempts: {}", attempt + 1, error);
                    }
                    return Err(error);
                }

                let delay = config.calculate_delay(attempt);
                debug!("Attempt {} failed ({}), retrying in {:?}", attempt + 1, error, delay);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
