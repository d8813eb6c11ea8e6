use core::time::Duration;
use std::sync::Arc;

use crate::{
    context::Context,
    time::{Clock, SteadyClock, SystemClock},
};

/// Keeps a loop running at a fixed period.
///
/// Each [`sleep`](Self::sleep) waits until one period after the previous
/// deadline, so time spent working between calls is absorbed. When a loop
/// falls behind by more than one full period the schedule restarts from the
/// current time instead of bursting to catch up.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use rclcore::WallRate;
///
/// let mut rate = WallRate::new(Duration::from_millis(1));
/// for _ in 0..3 {
///     rate.sleep();
/// }
/// assert!(rate.is_steady());
/// ```
#[derive(Debug)]
pub struct GenericRate<C> {
    period: Duration,
    last_interval: Duration,
    clock: C,
    context: Option<Arc<Context>>,
}

/// A rate driven by the system clock.
pub type Rate = GenericRate<SystemClock>;

/// A rate driven by the monotonic clock.
pub type WallRate = GenericRate<SteadyClock>;

impl<C: Clock + Default> GenericRate<C> {
    pub fn new(period: Duration) -> Self {
        Self::with_clock(period, C::default())
    }
}

impl<C: Clock> GenericRate<C> {
    pub fn with_clock(period: Duration, clock: C) -> Self {
        let last_interval = clock.now();
        Self {
            period,
            last_interval,
            clock,
            context: None,
        }
    }

    /// Makes sleeps return early when `context` shuts down.
    #[must_use]
    pub fn with_context(mut self, context: Arc<Context>) -> Self {
        self.context = Some(context);
        self
    }

    /// Sleeps until the next period boundary.
    ///
    /// Returns `false` without sleeping if the deadline has already passed,
    /// and `false` if an attached context shut down during the sleep.
    pub fn sleep(&mut self) -> bool {
        let now = self.clock.now();
        if now < self.last_interval {
            // the clock jumped backwards
            self.last_interval = now;
        }
        let next_interval = self.last_interval.saturating_add(self.period);
        self.last_interval = next_interval;

        if next_interval <= now {
            if now > next_interval.saturating_add(self.period) {
                self.last_interval = now;
            }
            return false;
        }

        let time_to_sleep = next_interval - now;
        match &self.context {
            Some(context) => context.sleep_for(time_to_sleep),
            None => {
                std::thread::sleep(time_to_sleep);
                true
            }
        }
    }

    /// Restarts the schedule from the current time.
    pub fn reset(&mut self) {
        self.last_interval = self.clock.now();
    }

    pub const fn is_steady(&self) -> bool {
        C::STEADY
    }

    pub const fn period(&self) -> Duration {
        self.period
    }
}
