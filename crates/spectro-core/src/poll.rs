//! Bounded polling with backoff.
//!
//! Every wait on hardware state (actuator idle, optical fork) goes through
//! [`poll_until`], which gives up with [`SpectroError::StallTimeout`] instead of
//! spinning forever on a stalled device.

use crate::error::{SpectroError, SpectroResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Timeout and backoff for a poll loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollPolicy {
    /// Total time before giving up.
    pub timeout: Duration,
    /// Delay after the first unsuccessful check.
    pub initial_interval: Duration,
    /// Upper bound on the delay between checks.
    pub max_interval: Duration,
    /// Multiplier applied to the delay after each unsuccessful check.
    pub backoff_factor: f64,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(1),
            backoff_factor: 1.5,
        }
    }
}

impl PollPolicy {
    /// Same policy with a different timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn next_interval(&self, current: Duration) -> Duration {
        let scaled = current.as_secs_f64() * self.backoff_factor.max(1.0);
        Duration::from_secs_f64(scaled).min(self.max_interval)
    }
}

/// Call `check` until it returns `Ok(true)`, sleeping with backoff between
/// calls.
///
/// - an `Err` from `check` is a hardware failure and is returned immediately
/// - when the deadline passes the result is `StallTimeout { what, .. }`
///
/// The condition is always checked at least once, and once more at the
/// deadline, so a device that finishes exactly on time is not reported as
/// stalled.
pub async fn poll_until<F, Fut>(what: &str, policy: &PollPolicy, mut check: F) -> SpectroResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<bool>>,
{
    let start = Instant::now();
    let deadline = start + policy.timeout;
    let mut interval = policy.initial_interval;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let done = check()
            .await
            .map_err(|e| SpectroError::hardware(&format!("polling {}", what), e))?;
        if done {
            debug!(what, attempts, elapsed = ?start.elapsed(), "poll condition met");
            return Ok(());
        }

        let now = Instant::now();
        if now >= deadline {
            warn!(what, attempts, "poll timed out");
            return Err(SpectroError::StallTimeout {
                what: what.to_string(),
                waited: now - start,
            });
        }

        let remaining = deadline - now;
        tokio::time::sleep(interval.min(remaining)).await;
        interval = policy.next_interval(interval);
    }
}
