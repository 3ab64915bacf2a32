use std::time::Duration;

/// Retry delay for a failing watch loop.
///
/// The delay is doubled before every sleep and reset to its floor whenever an
/// event is processed. Once the doubled delay passes the ceiling the watch is
/// considered unrecoverable.
#[derive(Debug, Clone)]
pub struct WatchBackoff {
    floor: Duration,
    ceiling: Duration,
    delay: Duration,
}

impl WatchBackoff {
    #[must_use]
    pub const fn new(floor: Duration, ceiling: Duration) -> Self {
        Self {
            floor,
            ceiling,
            delay: floor,
        }
    }

    pub const fn reset(&mut self) {
        self.delay = self.floor;
    }

    #[must_use]
    pub const fn current(&self) -> Duration {
        self.delay
    }

    /// Delay to sleep before the next retry, or `None` to give up
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.delay = self.delay.saturating_mul(2);
        if self.delay > self.ceiling {
            None
        } else {
            Some(self.delay)
        }
    }
}
