use core::time::Duration;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// A time source for [`GenericRate`].
///
/// [`GenericRate`]: crate::GenericRate
pub trait Clock {
    /// Whether the clock is monotonic.
    const STEADY: bool;

    /// Time elapsed since the clock's epoch.
    fn now(&self) -> Duration;
}

/// Wall-clock time since the Unix epoch. May jump backwards.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    const STEADY: bool = false;

    fn now(&self) -> Duration {
        // A clock set before 1970 reads as the epoch.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
    }
}

/// Monotonic time since the clock was created.
#[derive(Clone, Copy, Debug)]
pub struct SteadyClock {
    origin: Instant,
}

impl SteadyClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SteadyClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SteadyClock {
    const STEADY: bool = true;

    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}
