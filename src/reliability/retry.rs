//! Retry utilities with exponential backoff.
//!
//! Provides bounded retry logic for transient artifact failures using the
//! `backon` crate.
//!
//! # Example
//!
//! ```rust,ignore
//! use pinboard::reliability::{retry_async, RetryConfig};
//!
//! let result = retry_async(
//!     RetryConfig::default(),
//!     "save x.jpg",
//!     || async { apply(&request).await },
//!     |e| e.is_transient(),
//! ).await;
//! ```

use backon::{ExponentialBuilder, Retryable};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not including the initial attempt).
    pub max_retries: u32,
    /// Initial delay before first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff (e.g., 2.0 doubles delay each retry).
    pub factor: f32,
    /// Add random jitter to each delay.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: crate::constants::DEFAULT_QUEUE_MAX_RETRIES,
            initial_delay: Duration::from_millis(crate::constants::DEFAULT_QUEUE_INITIAL_DELAY_MS),
            max_delay: Duration::from_millis(crate::constants::DEFAULT_QUEUE_MAX_DELAY_MS),
            factor: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a config for quick operations (few retries, millisecond delays).
    ///
    /// Used by tests and by callers that would rather dead-letter early.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            factor: 2.0,
            jitter: false,
        }
    }

    /// Set maximum number of retries.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set initial delay.
    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set maximum delay.
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Build the exponential backoff strategy.
    fn build_backoff(&self) -> ExponentialBuilder {
        let builder = ExponentialBuilder::default()
            .with_min_delay(self.initial_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries as usize)
            .with_factor(self.factor);
        if self.jitter {
            builder.with_jitter()
        } else {
            builder
        }
    }
}

/// Retry an async operation with exponential backoff.
///
/// # Arguments
///
/// * `config` - Retry configuration
/// * `operation_name` - Name for logging
/// * `operation` - The async operation to retry
/// * `is_retryable` - Predicate to determine if an error is transient
///
/// # Returns
///
/// The result of the operation, or the last error if all retries failed
/// or the error was not retryable.
pub async fn retry_async<F, Fut, T, E, R>(
    config: &RetryConfig,
    operation_name: &str,
    operation: F,
    is_retryable: R,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    R: Fn(&E) -> bool,
{
    let backoff = config.build_backoff();
    let max_retries = config.max_retries;

    let mut attempt = 0u32;
    let notify = |err: &E, dur: Duration| {
        attempt += 1;
        warn!(
            operation = %operation_name,
            attempt = attempt,
            max_retries = max_retries,
            next_delay_ms = dur.as_millis() as u64,
            error = %err,
            "Operation failed, will retry"
        );
    };

    let result = operation
        .retry(backoff)
        .when(move |e| is_retryable(e))
        .notify(notify)
        .await;

    if let Err(ref e) = result {
        debug!(operation = %operation_name, error = %e, "Giving up");
    }
    result
}
