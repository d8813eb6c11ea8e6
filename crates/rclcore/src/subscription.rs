use core::fmt;
use std::sync::Arc;

use crate::{
    allocator::{reinterpret_owned, Allocator, ErasedHandle, Shared},
    error::Result,
    executable::{writable, SubscriptionBase},
    message::Message,
    transport::{EndpointHandle, EndpointKind, Transport},
};

type MessageCallback<M> = Box<dyn Fn(Shared<M>) + Send + Sync>;

/// Delivers messages published on one topic to a callback.
pub struct Subscription<M> {
    topic_name: String,
    endpoint: EndpointHandle,
    transport: Arc<dyn Transport>,
    callback: MessageCallback<M>,
    allocator: Allocator<M>,
}

impl<M> Subscription<M>
where
    M: Message + Default,
{
    /// Opens a subscription endpoint for `topic_name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`](crate::Error::Transport) if the endpoint
    /// cannot be created.
    pub fn new<F>(
        transport: Arc<dyn Transport>,
        topic_name: &str,
        callback: F,
        allocator: Option<Allocator<M>>,
    ) -> Result<Self>
    where
        F: Fn(Shared<M>) + Send + Sync + 'static,
    {
        let endpoint = transport.create_endpoint(EndpointKind::Subscription, topic_name)?;
        Ok(Self {
            topic_name: topic_name.to_owned(),
            endpoint,
            transport,
            callback: Box::new(callback),
            allocator: allocator.unwrap_or_default(),
        })
    }

    pub fn topic_name(&self) -> &str {
        &self.topic_name
    }
}

impl<M> SubscriptionBase for Subscription<M>
where
    M: Message + Default,
{
    fn topic_name(&self) -> &str {
        &self.topic_name
    }

    fn endpoint(&self) -> &EndpointHandle {
        &self.endpoint
    }

    fn create_message(&self) -> Result<ErasedHandle> {
        Ok(self.allocator.allocate_default()?.into())
    }

    fn take_message(&self, message: &mut ErasedHandle) -> Result<bool> {
        let message = writable(message)?;
        Ok(self.transport.take_message(&self.endpoint, message)?)
    }

    fn handle_message(&self, message: ErasedHandle) -> Result<()> {
        let message = reinterpret_owned(message, &self.allocator)?;
        (self.callback)(message);
        Ok(())
    }
}

impl<M> Drop for Subscription<M> {
    fn drop(&mut self) {
        if let Err(_e) = self.transport.destroy_endpoint(&self.endpoint) {
            #[cfg(feature = "tracing")]
            tracing::warn!("Failed to destroy endpoint for topic `{}`: {}", self.topic_name, _e);
        }
    }
}

impl<M> fmt::Debug for Subscription<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("topic_name", &self.topic_name)
            .field("endpoint", &self.endpoint.id())
            .finish_non_exhaustive()
    }
}
