//! Retry utilities: backoff builders.
//!
//! Uses `backon` for exponential backoff with jitter.

use std::time::Duration;

use backon::ExponentialBuilder;

/// Backoff for scheduler-driven draws hitting transient storage errors.
///
/// - Min delay: 50ms
/// - Max delay: 5s
/// - Max attempts: `max_attempts` (retries after the first try)
/// - Jitter enabled
pub fn draw_backoff(max_attempts: usize) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(50))
        .with_max_delay(Duration::from_secs(5))
        .with_max_times(max_attempts.saturating_sub(1))
        .with_jitter()
}
