//! Per-session request pacing.
//!
//! The governor spaces permitted calls by a uniformly random interval so
//! request cadence does not look scripted. Callers are served one at a
//! time; the first call of a session goes out immediately.

use std::time::Duration;

use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};
use tracing::debug;

/// Randomized inter-request spacing for one session.
#[derive(Debug)]
pub struct RateGovernor {
    min: Duration,
    max: Duration,
    last: Mutex<Option<Instant>>,
}

impl RateGovernor {
    /// Creates a governor with the given bounds.
    ///
    /// Inverted bounds are swapped.
    pub fn new(min: Duration, max: Duration) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self {
            min,
            max,
            last: Mutex::new(None),
        }
    }

    /// Creates a governor from millisecond bounds.
    pub fn from_millis(min_ms: u64, max_ms: u64) -> Self {
        Self::new(Duration::from_millis(min_ms), Duration::from_millis(max_ms))
    }

    /// A governor that never waits.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Returns the interval bounds.
    pub fn bounds(&self) -> (Duration, Duration) {
        (self.min, self.max)
    }

    fn next_interval(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        let min_ms = u64::try_from(self.min.as_millis()).unwrap_or(u64::MAX);
        let max_ms = u64::try_from(self.max.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(rand::thread_rng().gen_range(min_ms..=max_ms))
    }

    /// Waits until this session may send its next request.
    ///
    /// Returns how long the caller waited.
    pub async fn await_turn(&self) -> Duration {
        let mut last = self.last.lock().await;
        let mut waited = Duration::ZERO;

        if let Some(previous) = *last {
            let target = previous + self.next_interval();
            let now = Instant::now();
            if target > now {
                waited = target - now;
                debug!(wait_ms = waited.as_millis() as u64, "Pacing request");
                sleep_until(target).await;
            }
        }

        *last = Some(Instant::now());
        waited
    }
}

impl Default for RateGovernor {
    fn default() -> Self {
        Self::from_millis(3_000, 8_000)
    }
}

// ============================================================================
// Tests
// ============================================================================
