use core::fmt;
use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    thread,
};

use parking_lot::Mutex;
use portable_atomic::{AtomicUsize, Ordering};

use crate::{
    context::{set_current_worker_id, Context},
    error::{panic_message, Error, Result},
    executable::AnyExecutable,
    executor::{
        default_number_of_threads, execute_any_executable, log_failure, ExecutorConfig,
        FailureHook, WorkerFailure,
    },
    wait_set::WaitSet,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Dispatches ready entities of one wait-set across a pool of threads.
///
/// Every worker loops: acquire the selection gate, re-check the context,
/// select the next ready entity, release the gate, execute the entity. The
/// gate is held only around selection, so selection is strictly serialized
/// while up to `number_of_threads` entities execute concurrently.
///
/// Errors and panics raised while executing an entity are caught at the
/// worker boundary and handed to the failure hook; the worker keeps going.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use rclcore::{
///     Context, ExecutorConfig, LoopbackTransport, LoopbackWaitSet, MultiThreadedExecutor,
/// };
///
/// let context = Arc::new(Context::new());
/// let transport = Arc::new(LoopbackTransport::new());
/// let wait_set = Arc::new(LoopbackWaitSet::new(transport, &context));
/// let executor = MultiThreadedExecutor::with_config(
///     context.clone(),
///     wait_set,
///     ExecutorConfig::with_threads(2),
/// )
/// .unwrap();
///
/// context.shutdown();
/// executor.spin().unwrap();
/// ```
pub struct MultiThreadedExecutor {
    context: Arc<Context>,
    wait_set: Arc<dyn WaitSet>,
    number_of_threads: usize,
    wait_mutex: Mutex<()>,
    failure_hook: FailureHook,
    failures: AtomicUsize,
}

impl MultiThreadedExecutor {
    /// Creates an executor with one worker per hardware thread.
    pub fn new(context: Arc<Context>, wait_set: Arc<dyn WaitSet>) -> Self {
        Self::with_threads(context, wait_set, default_number_of_threads())
    }

    /// Creates an executor sized by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `config` asks for zero threads.
    pub fn with_config(
        context: Arc<Context>,
        wait_set: Arc<dyn WaitSet>,
        config: ExecutorConfig,
    ) -> Result<Self> {
        Ok(Self::with_threads(context, wait_set, config.resolve()?))
    }

    fn with_threads(
        context: Arc<Context>,
        wait_set: Arc<dyn WaitSet>,
        number_of_threads: usize,
    ) -> Self {
        Self {
            context,
            wait_set,
            number_of_threads,
            wait_mutex: Mutex::new(()),
            failure_hook: Arc::new(log_failure),
            failures: AtomicUsize::new(0),
        }
    }

    /// Replaces the default failure hook, which logs each failure.
    #[must_use]
    pub fn with_failure_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&WorkerFailure) + Send + Sync + 'static,
    {
        self.failure_hook = Arc::new(hook);
        self
    }

    pub fn number_of_threads(&self) -> usize {
        self.number_of_threads
    }

    /// Failures reported since the executor was created.
    pub fn failure_count(&self) -> usize {
        self.failures.load(Ordering::Acquire)
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    /// Runs the worker pool until the context shuts down.
    ///
    /// Workers start back to back. The call returns only after every worker
    /// has exited.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WorkerSpawn`] if not a single worker thread could be
    /// started. If only some fail to start, the pool runs with the ones that
    /// did.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self), fields(threads = self.number_of_threads))
    )]
    pub fn spin(&self) -> Result<()> {
        let (launched, spawn_error) = thread::scope(|s| {
            let mut launched = 0_usize;
            let mut spawn_error = None;
            for worker_id in 1..=self.number_of_threads {
                let spawned = thread::Builder::new()
                    .name(format!("rclcore-worker-{worker_id}"))
                    .spawn_scoped(s, move || self.run(worker_id));
                match spawned {
                    Ok(_) => launched += 1,
                    Err(e) => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(
                            "Started {launched} of {} workers: {e}",
                            self.number_of_threads
                        );
                        spawn_error = Some(e);
                        break;
                    }
                }
            }
            (launched, spawn_error)
        });

        match spawn_error {
            Some(e) if launched == 0 => Err(Error::WorkerSpawn(e)),
            _ => Ok(()),
        }
    }

    /// Selects and executes at most one entity on the calling thread.
    ///
    /// Returns `Ok(false)` if the context is shut down or the wait-set
    /// offered nothing.
    ///
    /// # Errors
    ///
    /// Returns the error or panic of the selection or of the execution.
    pub fn spin_once(&self) -> Result<bool> {
        let executable = {
            let _gate = self.wait_mutex.lock();
            if !self.context.ok() {
                return Ok(false);
            }
            self.select()?
        };
        match executable {
            Some(executable) => execute_guarded(&executable).map(|()| true),
            None => Ok(false),
        }
    }

    fn run(&self, worker_id: usize) {
        set_current_worker_id(Some(worker_id));
        #[cfg(feature = "tracing")]
        tracing::trace!("Worker {worker_id} started");

        while self.context.ok() {
            let selected = {
                let _gate = self.wait_mutex.lock();
                if !self.context.ok() {
                    break;
                }
                self.select()
            };
            let executable = match selected {
                Ok(Some(executable)) => executable,
                Ok(None) => continue,
                Err(error) => {
                    self.report(worker_id, String::from("wait-set"), error);
                    continue;
                }
            };
            if let Err(error) = execute_guarded(&executable) {
                self.report(worker_id, executable.kind().to_string(), error);
            }
        }

        #[cfg(feature = "tracing")]
        tracing::trace!("Worker {worker_id} stopped");
        set_current_worker_id(None);
    }

    fn select(&self) -> Result<Option<AnyExecutable>> {
        panic::catch_unwind(AssertUnwindSafe(|| {
            self.wait_set.select_next_ready(&self.context)
        }))
        .map_err(|payload| Error::SelectionPanicked {
            message: panic_message(&*payload),
        })
    }

    fn report(&self, worker_id: usize, entity: String, error: Error) {
        self.failures.fetch_add(1, Ordering::AcqRel);
        let failure = WorkerFailure {
            worker_id,
            entity,
            error,
        };
        // A panicking hook must not take the worker down with it.
        if let Err(_payload) =
            panic::catch_unwind(AssertUnwindSafe(|| (self.failure_hook)(&failure)))
        {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                worker_id,
                panic = %panic_message(&*_payload),
                "failure hook panicked"
            );
            log_failure(&failure);
        }
    }
}

fn execute_guarded(executable: &AnyExecutable) -> Result<()> {
    panic::catch_unwind(AssertUnwindSafe(|| execute_any_executable(executable))).unwrap_or_else(
        |payload| {
            Err(Error::CallbackPanicked {
                message: panic_message(&*payload),
            })
        },
    )
}

impl fmt::Debug for MultiThreadedExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiThreadedExecutor")
            .field("context", &self.context)
            .field("number_of_threads", &self.number_of_threads)
            .field("failures", &self.failure_count())
            .finish_non_exhaustive()
    }
}
