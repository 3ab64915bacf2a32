//! Bounded polling with exponential backoff and jitter.
//!
//! The spawner uses this to wait for the mirror to reach a condition (pod
//! running, pod gone) without an event subscription. Both the sleep between
//! checks and the deadline itself are jittered so many waits started together
//! do not re-align.
//!
//! # Example
//!
//! ```ignore
//! use podmirror::retry::{exponential_backoff, BackoffConfig};
//!
//! exponential_backoff(
//!     &BackoffConfig::with_timeout(Duration::from_secs(300)),
//!     "pod jupyter-alice did not start in 300 seconds!",
//!     || mirror.contains_key(&key),
//! ).await?;
//! ```

use std::time::Duration;

use rand::Rng;
use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::error::{Error, Result};

/// Shape of an `exponential_backoff` wait
#[derive(Clone, Debug)]
pub struct BackoffConfig {
    /// Upper bound of the first (uniformly random) sleep
    pub start_wait: Duration,
    /// Multiplier applied to the sleep bound after each check
    pub scale_factor: f64,
    /// No single sleep is longer than this
    pub max_wait: Duration,
    /// Total time allowed before giving up
    pub timeout: Duration,
    /// Fraction of `timeout` by which the deadline is randomly moved
    pub timeout_tolerance: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            start_wait: Duration::from_millis(200),
            scale_factor: 2.0,
            max_wait: Duration::from_secs(5),
            timeout: Duration::from_secs(10),
            timeout_tolerance: 0.1,
        }
    }
}

impl BackoffConfig {
    /// Default shape with a different overall timeout
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Default::default()
        }
    }

    fn deadline(&self, start: Instant) -> Instant {
        if self.timeout_tolerance <= 0.0 {
            return start + self.timeout;
        }
        let tolerance = self.timeout_tolerance.min(1.0);
        let factor = rand::thread_rng().gen_range((1.0 - tolerance)..=(1.0 + tolerance));
        start + self.timeout.mul_f64(factor)
    }
}

/// Re-check `pass` with growing, jittered sleeps until it returns true.
///
/// # Errors
///
/// Returns `Error::Timeout(fail_message)` once the deadline passes with `pass`
/// still false
pub async fn exponential_backoff<F>(
    config: &BackoffConfig,
    fail_message: &str,
    mut pass: F,
) -> Result<()>
where
    F: FnMut() -> bool,
{
    let deadline = config.deadline(Instant::now());
    let mut scale = 1.0_f64;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        if pass() {
            return Ok(());
        }

        let now = Instant::now();
        if now >= deadline {
            break;
        }
        let remaining = deadline - now;

        let max_wait = config.max_wait.as_secs_f64();
        let bound = (config.start_wait.as_secs_f64() * scale).min(max_wait);
        let jittered = Duration::from_secs_f64(rand::thread_rng().gen_range(0.0..=bound));
        let wait = jittered.min(config.max_wait).min(remaining);
        // stop growing once the bound is pinned at max_wait
        if bound < max_wait {
            scale *= config.scale_factor;
        }

        debug!(
            attempt = attempt,
            wait_ms = wait.as_millis(),
            "Condition not met, backing off"
        );
        sleep(wait).await;
    }

    Err(Error::Timeout(fail_message.to_string()))
}
