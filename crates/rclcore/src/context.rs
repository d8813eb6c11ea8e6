use core::{cell::Cell, fmt, time::Duration};
use std::time::Instant;

use crossbeam_utils::CachePadded;
use parking_lot::{Condvar, Mutex};
use portable_atomic::{AtomicBool, AtomicU64, Ordering};

type ShutdownHook = Box<dyn FnOnce() + Send>;

/// Identifies a hook registered with [`Context::on_shutdown`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ShutdownHookId(u64);

/// Process-level liveness shared by executors, wait-sets and rates.
///
/// A context starts running and is shut down at most once. Shutdown is
/// cooperative: it flips a flag, runs the registered hooks and wakes every
/// thread blocked in [`sleep_for`](Self::sleep_for).
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use rclcore::Context;
///
/// let context = Arc::new(Context::new());
/// let sleeper = {
///     let context = Arc::clone(&context);
///     std::thread::spawn(move || context.sleep_for(Duration::from_secs(60)))
/// };
/// context.shutdown();
/// assert!(!sleeper.join().unwrap());
/// assert!(!context.ok());
/// ```
pub struct Context {
    running: CachePadded<AtomicBool>,
    interrupt: Mutex<()>,
    interrupted: Condvar,
    hooks: Mutex<Vec<(ShutdownHookId, ShutdownHook)>>,
    next_hook: AtomicU64,
}

impl Context {
    pub fn new() -> Self {
        Self {
            running: CachePadded::new(AtomicBool::new(true)),
            interrupt: Mutex::new(()),
            interrupted: Condvar::new(),
            hooks: Mutex::new(Vec::new()),
            next_hook: AtomicU64::new(1),
        }
    }

    /// Whether the context has not been shut down.
    #[inline]
    pub fn ok(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Shuts the context down. Only the first call has any effect; it returns
    /// `true`.
    pub fn shutdown(&self) -> bool {
        if !self.running.swap(false, Ordering::AcqRel) {
            return false;
        }
        #[cfg(feature = "tracing")]
        tracing::debug!("context shutting down");

        let hooks = core::mem::take(&mut *self.hooks.lock());
        for (_, hook) in hooks {
            hook();
        }

        // Taking the lock orders the notify after any sleeper's flag check.
        let _guard = self.interrupt.lock();
        self.interrupted.notify_all();
        true
    }

    /// Registers `hook` to run once on shutdown, or runs it right away if the
    /// context is already shut down.
    pub fn on_shutdown<F>(&self, hook: F) -> ShutdownHookId
    where
        F: FnOnce() + Send + 'static,
    {
        let id = ShutdownHookId(self.next_hook.fetch_add(1, Ordering::Relaxed));
        {
            let mut hooks = self.hooks.lock();
            if self.ok() {
                hooks.push((id, Box::new(hook)));
                return id;
            }
        }
        hook();
        id
    }

    /// Unregisters a hook that has not run yet. Returns whether it was still
    /// registered.
    pub fn remove_shutdown_hook(&self, id: ShutdownHookId) -> bool {
        let mut hooks = self.hooks.lock();
        let before = hooks.len();
        hooks.retain(|(registered, _)| *registered != id);
        hooks.len() != before
    }

    /// Hooks still waiting for shutdown.
    pub fn shutdown_hook_count(&self) -> usize {
        self.hooks.lock().len()
    }

    /// Sleeps for `duration` unless interrupted by shutdown.
    ///
    /// Returns `true` if the whole duration elapsed and the context is still
    /// running.
    pub fn sleep_for(&self, duration: Duration) -> bool {
        let Some(deadline) = Instant::now().checked_add(duration) else {
            return self.sleep_forever();
        };
        let mut guard = self.interrupt.lock();
        while self.ok() {
            if self.interrupted.wait_until(&mut guard, deadline).timed_out() {
                return self.ok();
            }
        }
        false
    }

    fn sleep_forever(&self) -> bool {
        let mut guard = self.interrupt.lock();
        while self.ok() {
            self.interrupted.wait(&mut guard);
        }
        false
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context").field("ok", &self.ok()).finish()
    }
}

thread_local! {
    static WORKER_ID: Cell<Option<usize>> = const { Cell::new(None) };
}

/// The 1-based index of the executor worker running on this thread, or
/// `None` outside a worker.
pub fn current_worker_id() -> Option<usize> {
    WORKER_ID.with(Cell::get)
}

pub(crate) fn set_current_worker_id(id: Option<usize>) {
    WORKER_ID.with(|cell| cell.set(id));
}
