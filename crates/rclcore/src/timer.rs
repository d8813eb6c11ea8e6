use core::{fmt, time::Duration};
use std::time::Instant;

use parking_lot::Mutex;
use portable_atomic::{AtomicBool, AtomicU64, Ordering};

use crate::{
    error::{Error, Result},
    executable::{TimerBase, TimerId},
};

static NEXT_TIMER_ID: AtomicU64 = AtomicU64::new(1);

type TimerCallback = Box<dyn Fn() + Send + Sync>;

/// A periodic callback driven by the monotonic clock.
///
/// Triggers that were missed while the timer waited for a worker are
/// coalesced: after a late execution the next trigger is one period after
/// the current time.
pub struct WallTimer {
    id: TimerId,
    period: Duration,
    next_call: Mutex<Instant>,
    canceled: AtomicBool,
    callback: TimerCallback,
}

impl WallTimer {
    /// Creates a timer first due one `period` from now.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for a zero period.
    pub fn new<F>(period: Duration, callback: F) -> Result<Self>
    where
        F: Fn() + Send + Sync + 'static,
    {
        if period.is_zero() {
            return Err(Error::InvalidConfig {
                reason: String::from("timer period must be non-zero"),
            });
        }
        Ok(Self {
            id: TimerId(NEXT_TIMER_ID.fetch_add(1, Ordering::Relaxed)),
            period,
            next_call: Mutex::new(Instant::now() + period),
            canceled: AtomicBool::new(false),
            callback: Box::new(callback),
        })
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Stops the timer from becoming ready.
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::Release);
    }

    /// Re-arms the timer one period from now, clearing a cancellation.
    pub fn reset(&self) {
        *self.next_call.lock() = Instant::now() + self.period;
        self.canceled.store(false, Ordering::Release);
    }
}

impl TimerBase for WallTimer {
    fn timer_id(&self) -> TimerId {
        self.id
    }

    fn is_ready(&self) -> bool {
        !self.is_canceled() && Instant::now() >= *self.next_call.lock()
    }

    fn time_until_trigger(&self) -> Duration {
        self.next_call
            .lock()
            .saturating_duration_since(Instant::now())
    }

    fn execute_callback(&self) -> Result<()> {
        {
            let now = Instant::now();
            let mut next_call = self.next_call.lock();
            *next_call += self.period;
            if *next_call <= now {
                *next_call = now + self.period;
            }
        }
        (self.callback)();
        Ok(())
    }

    fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }
}

impl fmt::Debug for WallTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WallTimer")
            .field("id", &self.id)
            .field("period", &self.period)
            .field("canceled", &self.is_canceled())
            .finish_non_exhaustive()
    }
}
