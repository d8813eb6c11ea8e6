use core::{fmt, time::Duration};

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};

use crate::{
    allocator::Shared,
    error::{Error, Result},
};

/// The eventual response to one request.
///
/// Fulfilled by the executor worker that handles the matching response,
/// before any completion callback registered with the request runs.
pub struct ResponseFuture<T> {
    service: String,
    sequence_number: i64,
    receiver: Receiver<Shared<T>>,
}

impl<T> ResponseFuture<T> {
    pub(crate) fn new(
        service: String,
        sequence_number: i64,
        receiver: Receiver<Shared<T>>,
    ) -> Self {
        Self {
            service,
            sequence_number,
            receiver,
        }
    }

    /// The sequence number the transport assigned to the request.
    pub fn sequence_number(&self) -> i64 {
        self.sequence_number
    }

    /// Blocks until the response arrives.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResponseAbandoned`] if the client was dropped first.
    pub fn wait(self) -> Result<Shared<T>> {
        self.receiver.recv().map_err(|_| self.abandoned())
    }

    /// Blocks for at most `timeout`. `Ok(None)` if it elapsed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResponseAbandoned`] if the client was dropped first.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<Option<Shared<T>>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(response) => Ok(Some(response)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(self.abandoned()),
        }
    }

    /// Takes the response if it already arrived.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResponseAbandoned`] if the client was dropped first.
    pub fn try_take(&self) -> Result<Option<Shared<T>>> {
        match self.receiver.try_recv() {
            Ok(response) => Ok(Some(response)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(self.abandoned()),
        }
    }

    fn abandoned(&self) -> Error {
        Error::ResponseAbandoned {
            service: self.service.clone(),
        }
    }
}

impl<T> fmt::Debug for ResponseFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseFuture")
            .field("service", &self.service)
            .field("sequence_number", &self.sequence_number)
            .finish_non_exhaustive()
    }
}
