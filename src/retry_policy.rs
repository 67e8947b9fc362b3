//! Retry policy shared by the metadata fetcher and the image workers.
//!
//! Implements exponential backoff with configurable parameters.

use crate::config::{FetcherSettings, ImageSettings};
use std::time::Duration;

/// Errors that know whether another attempt could succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Retry policy implementing exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries before giving up.
    pub max_retries: u32,
    /// Backoff before the first retry, in milliseconds.
    pub initial_backoff_ms: u64,
    /// Maximum backoff in milliseconds (cap for exponential growth).
    pub max_backoff_ms: u64,
    /// Multiplier applied to backoff after each retry.
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    /// Transport-error retries for metadata requests (1s, 2s, 4s, ...).
    pub fn for_fetcher(settings: &FetcherSettings) -> Self {
        Self {
            max_retries: settings.transport_retries,
            initial_backoff_ms: settings.initial_backoff_ms,
            max_backoff_ms: settings.max_backoff_ms,
            backoff_multiplier: 2.0,
        }
    }

    pub fn for_images(settings: &ImageSettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            initial_backoff_ms: settings.initial_backoff_ms,
            max_backoff_ms: settings.max_backoff_ms,
            backoff_multiplier: 2.0,
        }
    }

    /// Check if an error should be retried given the current retry count.
    ///
    /// Returns true if the error is retryable and the retry count is below `max_retries`.
    pub fn should_retry<E: Retryable + ?Sized>(&self, error: &E, retry_count: u32) -> bool {
        error.is_retryable() && retry_count < self.max_retries
    }

    /// Backoff before retry number `retry_count` (zero-based).
    ///
    /// Uses `initial_backoff * multiplier^retry_count`, capped at `max_backoff_ms`.
    pub fn backoff(&self, retry_count: u32) -> Duration {
        let exponent = retry_count.min(i32::MAX as u32) as i32;
        let backoff = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(exponent);
        Duration::from_millis(backoff.min(self.max_backoff_ms as f64) as u64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}
