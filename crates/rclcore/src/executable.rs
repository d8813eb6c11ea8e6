use core::{fmt, time::Duration};
use std::sync::Arc;

use crate::{
    allocator::ErasedHandle,
    error::{Error, Result},
    message::{Message, RequestId},
    transport::EndpointHandle,
};

/// An entity delivering messages published on a topic.
pub trait SubscriptionBase: Send + Sync {
    fn topic_name(&self) -> &str;

    fn endpoint(&self) -> &EndpointHandle;

    /// Allocates an empty message slot.
    fn create_message(&self) -> Result<ErasedHandle>;

    /// Fills `message` from the transport. `Ok(false)` if nothing was pending.
    fn take_message(&self, message: &mut ErasedHandle) -> Result<bool>;

    fn handle_message(&self, message: ErasedHandle) -> Result<()>;
}

/// A service responder, seen without its service type.
///
/// The executor drives a ready service through these operations in order:
/// `create_request_identifier`, `create_request`, `take_request` and, if a
/// request was taken, `handle_request`.
pub trait ServiceBase: Send + Sync {
    fn service_name(&self) -> &str;

    fn endpoint(&self) -> &EndpointHandle;

    /// Allocates a default request through the request allocator.
    fn create_request(&self) -> Result<ErasedHandle>;

    /// Allocates a [`RequestId`] through the header allocator.
    fn create_request_identifier(&self) -> Result<ErasedHandle>;

    /// Fills both handles from the transport. `Ok(false)` if nothing was
    /// pending.
    fn take_request(&self, header: &mut ErasedHandle, request: &mut ErasedHandle) -> Result<bool>;

    /// Runs the callback on a taken request and sends its response.
    fn handle_request(&self, header: ErasedHandle, request: ErasedHandle) -> Result<()>;
}

/// A service client, seen without its service type.
pub trait ClientBase: Send + Sync {
    fn service_name(&self) -> &str;

    fn endpoint(&self) -> &EndpointHandle;

    fn create_response(&self) -> Result<ErasedHandle>;

    fn create_request_header(&self) -> Result<ErasedHandle>;

    fn take_response(&self, header: &mut ErasedHandle, response: &mut ErasedHandle) -> Result<bool>;

    /// Completes the pending request matching `header`.
    fn handle_response(&self, header: ErasedHandle, response: ErasedHandle) -> Result<()>;
}

/// Process-unique timer identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub(crate) u64);

impl TimerId {
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A periodic callback.
pub trait TimerBase: Send + Sync {
    fn timer_id(&self) -> TimerId;

    /// Whether the timer is due and not canceled.
    fn is_ready(&self) -> bool;

    /// Time left until the timer is due; zero when it already is.
    fn time_until_trigger(&self) -> Duration;

    /// Runs the callback and schedules the next trigger.
    fn execute_callback(&self) -> Result<()>;

    fn is_canceled(&self) -> bool;
}

/// The kinds of entity a wait-set can offer.
#[derive(Clone)]
pub enum ExecutableKind {
    Subscription(Arc<dyn SubscriptionBase>),
    Timer(Arc<dyn TimerBase>),
    Service(Arc<dyn ServiceBase>),
    Client(Arc<dyn ClientBase>),
}

impl fmt::Display for ExecutableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Subscription(subscription) => {
                write!(f, "subscription `{}`", subscription.topic_name())
            }
            Self::Timer(timer) => write!(f, "timer {}", timer.timer_id()),
            Self::Service(service) => write!(f, "service `{}`", service.service_name()),
            Self::Client(client) => write!(f, "client `{}`", client.service_name()),
        }
    }
}

impl fmt::Debug for ExecutableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

type Completion = Box<dyn FnOnce() + Send>;

/// One unit of ready work, owned by the worker executing it.
///
/// Dropping the item reports completion to the selection policy that
/// produced it, so an entity becomes selectable again only after its
/// dispatch has finished, panicked or been abandoned.
pub struct AnyExecutable {
    kind: ExecutableKind,
    on_complete: Option<Completion>,
}

impl AnyExecutable {
    pub fn new(kind: ExecutableKind) -> Self {
        Self {
            kind,
            on_complete: None,
        }
    }

    /// Attaches a callback run when the item is dropped.
    #[must_use]
    pub fn with_completion<F>(mut self, on_complete: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_complete = Some(Box::new(on_complete));
        self
    }

    pub fn kind(&self) -> &ExecutableKind {
        &self.kind
    }
}

impl Drop for AnyExecutable {
    fn drop(&mut self) {
        if let Some(on_complete) = self.on_complete.take() {
            on_complete();
        }
    }
}

impl fmt::Debug for AnyExecutable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyExecutable")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Exclusive access to the object behind a freshly created handle.
pub(crate) fn writable(handle: &mut ErasedHandle) -> Result<&mut dyn Message> {
    let type_name = handle.type_name();
    handle
        .message_mut()
        .ok_or(Error::AliasedHandle { type_name })
}

/// Exclusive access to a header slot.
pub(crate) fn writable_header(handle: &mut ErasedHandle) -> Result<&mut RequestId> {
    let found = handle.type_name();
    writable(handle)?
        .as_any_mut()
        .downcast_mut::<RequestId>()
        .ok_or(Error::HandleTypeMismatch {
            expected: core::any::type_name::<RequestId>(),
            found,
        })
}
