use core::fmt;
use std::sync::Arc;

use crate::error::Error;

/// One dispatch that failed on a worker.
///
/// Failures are reported and then discarded; they never stop the worker
/// that produced them.
#[derive(Debug)]
pub struct WorkerFailure {
    /// 1-based index of the worker.
    pub worker_id: usize,
    /// Human-readable description of the entity, e.g. ``service `add` ``.
    pub entity: String,
    pub error: Error,
}

impl fmt::Display for WorkerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker {} failed on {}: {}", self.worker_id, self.entity, self.error)
    }
}

/// Receives every [`WorkerFailure`] of an executor.
pub type FailureHook = Arc<dyn Fn(&WorkerFailure) + Send + Sync>;

/// The hook installed when none is given: logs the failure.
pub fn log_failure(_failure: &WorkerFailure) {
    #[cfg(feature = "tracing")]
    tracing::error!(
        worker_id = _failure.worker_id,
        entity = %_failure.entity,
        "Dispatch failed: {}",
        _failure.error
    );
}
