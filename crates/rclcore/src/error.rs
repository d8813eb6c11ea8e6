//! Error types for the executor and the service dispatch layer.
//!
//! Errors raised while dispatching one work item never leave that dispatch:
//! the worker loop reports them through its failure hook and keeps selecting.
//!
//! ## Error Cases
//! - `Allocation`: a memory resource refused an allocation. Aborts the current
//!   dispatch only.
//! - `TransportSend`: a response could not be handed to the transport. Not
//!   retried.
//! - `CallbackPanicked`: application code panicked inside a dispatch.
//! - The remaining variants describe misuse of type-erased handles, unknown
//!   correlation ids and configuration problems.

use crate::{allocator::AllocError, transport::TransportError};

/// A result type defaulting to [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All errors `rclcore` can produce.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A memory resource refused to back a new object.
    #[error(transparent)]
    Allocation(#[from] AllocError),

    /// Sending a response through the transport failed.
    #[error("failed to send response for service `{service}`: {source}")]
    TransportSend {
        service: String,
        #[source]
        source: TransportError,
    },

    /// Any other transport operation failed (endpoint setup, take, request
    /// send).
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// An erased handle did not hold the type it was reinterpreted as.
    #[error("handle type mismatch: expected `{expected}`, found `{found}`")]
    HandleTypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// An erased handle was reinterpreted through an allocator whose memory
    /// resource did not produce it.
    #[error("handle of type `{type_name}` was not allocated by the expected memory resource")]
    ForeignAllocator { type_name: &'static str },

    /// A handle that must be written in place is shared with another owner.
    #[error("handle of type `{type_name}` is shared and cannot be written")]
    AliasedHandle { type_name: &'static str },

    /// A response arrived for a sequence number the client never issued (or
    /// already completed).
    #[error("client for `{service}` has no pending request with sequence number {sequence_number}")]
    UnknownSequence { service: String, sequence_number: i64 },

    /// The client was dropped before the response for a pending request
    /// arrived.
    #[error("pending request on `{service}` was dropped before a response arrived")]
    ResponseAbandoned { service: String },

    /// A subscription, timer, service or client callback panicked.
    #[error("callback panicked: {message}")]
    CallbackPanicked { message: String },

    /// The wait-set panicked while selecting the next ready entity.
    #[error("wait-set selection panicked: {message}")]
    SelectionPanicked { message: String },

    /// The operating system refused to start a worker thread.
    #[error("failed to spawn worker thread: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    /// A configuration value was rejected.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

/// Renders a panic payload caught by `catch_unwind` as text.
pub(crate) fn panic_message(payload: &(dyn core::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        String::from("non-string panic payload")
    }
}
