use crate::error::ErrorCategory;
use crate::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
    /// Maximum jitter as percentage of delay
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.1, // 10% jitter
        }
    }
}

impl RetryConfig {
    /// Create config for rate limited retries
    #[must_use]
    pub const fn rate_limited() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(120),
            multiplier: 2.0,
            jitter: 0.3,
        }
    }

    /// Same backoff shape with `retries` retries after the first attempt
    #[must_use]
    pub const fn with_retries(mut self, retries: u32) -> Self {
        self.max_attempts = retries.saturating_add(1);
        self
    }
}

/// Retry policy that determines retry behavior based on error
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    default_config: RetryConfig,
    rate_limited_config: RetryConfig,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            default_config: RetryConfig::default(),
            rate_limited_config: RetryConfig::rate_limited(),
        }
    }
}

impl RetryPolicy {
    /// Default backoff shapes with `retries` retries for every retryable error
    #[must_use]
    pub fn with_max_retries(retries: u32) -> Self {
        Self {
            default_config: RetryConfig::default().with_retries(retries),
            rate_limited_config: RetryConfig::rate_limited().with_retries(retries),
        }
    }

    /// One config for every retryable error
    #[must_use]
    pub fn uniform(config: RetryConfig) -> Self {
        Self {
            default_config: config.clone(),
            rate_limited_config: config,
        }
    }

    /// Policy that never retries
    #[must_use]
    pub fn none() -> Self {
        Self::uniform(RetryConfig::default().with_retries(0))
    }

    /// Get retry config based on error
    #[must_use]
    pub fn config_for_error(&self, error: &Error) -> Option<&RetryConfig> {
        match error.category() {
            ErrorCategory::Permanent => None, // Don't retry permanent errors
            ErrorCategory::RateLimited => Some(&self.rate_limited_config),
            ErrorCategory::Transient => Some(&self.default_config),
        }
    }
}

/// Execute an operation with retry logic
pub async fn retry_with_policy<T, F, Fut>(
    operation: F,
    policy: &RetryPolicy,
    operation_name: &str,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;

    loop {
        debug!(
            "Executing operation '{}' (attempt {})",
            operation_name, attempt
        );

        let error = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(
                        "Operation '{}' succeeded after {} attempts",
                        operation_name, attempt
                    );
                }
                return Ok(value);
            }
            Err(error) => error,
        };

        // Check if error is retryable
        let Some(retry_config) = policy.config_for_error(&error) else {
            debug!(
                "Operation '{}' failed with non-retryable error: {}",
                operation_name, error
            );
            return Err(error);
        };

        // Check if we've exceeded max attempts
        if attempt >= retry_config.max_attempts {
            warn!(
                "Operation '{}' failed after {} attempts: {}",
                operation_name, attempt, error
            );
            return Err(error);
        }

        let delay = calculate_delay(attempt - 1, retry_config, &error);

        debug!(
            "Operation '{}' failed (attempt {}), retrying after {:?}: {}",
            operation_name, attempt, delay, error
        );

        sleep(delay).await;
        attempt += 1;
    }
}

/// Calculate delay for retry attempt
fn calculate_delay(attempt: u32, config: &RetryConfig, error: &Error) -> Duration {
    // Use error-specific delay if available (e.g., Retry-After header)
    if let Some(retry_after) = error.retry_after() {
        return retry_after.min(config.max_delay);
    }

    let base_delay_ms = config.initial_delay.as_millis() as f64;
    let exponential_delay_ms =
        base_delay_ms * config.multiplier.powi(i32::try_from(attempt).unwrap_or(i32::MAX));
    let capped_delay_ms = exponential_delay_ms.min(config.max_delay.as_millis() as f64);
    let delay = Duration::from_millis(capped_delay_ms as u64);

    add_jitter(delay, config.jitter)
}

/// Add jitter to delay
fn add_jitter(delay: Duration, jitter_factor: f64) -> Duration {
    if jitter_factor <= 0.0 {
        return delay;
    }

    use rand::Rng;
    let mut rng = rand::thread_rng();
    let jitter_ms = (delay.as_millis() as f64 * jitter_factor) as u64;
    let jitter = rng.gen_range(0..=jitter_ms);

    delay + Duration::from_millis(jitter)
}
