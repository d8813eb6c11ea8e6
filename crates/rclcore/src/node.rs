use core::{fmt, time::Duration};
use std::sync::Arc;

use crate::{
    allocator::{Allocator, Shared},
    client::Client,
    error::Result,
    executable::{ClientBase, ServiceBase, SubscriptionBase, TimerBase},
    message::{Message, ServiceType},
    service::{AnyServiceCallback, Service, ServiceAllocators},
    subscription::Subscription,
    timer::WallTimer,
    transport::Transport,
    wait_set::EntityRegistry,
};

/// Creates entities on a transport and registers them for dispatch.
///
/// The node hands out strong references; the registry only keeps weak ones,
/// so an entity stops being dispatched once the caller drops it.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use rclcore::{Context, LoopbackTransport, LoopbackWaitSet, Node};
///
/// let context = Arc::new(Context::new());
/// let transport = Arc::new(LoopbackTransport::new());
/// let wait_set = Arc::new(LoopbackWaitSet::new(transport.clone(), &context));
/// let node = Node::new("talker", transport, wait_set.clone());
///
/// let _sub = node
///     .create_subscription::<String, _>("chatter", |msg| println!("{}", *msg), None)
///     .unwrap();
/// assert_eq!(wait_set.len(), 1);
/// ```
pub struct Node {
    name: String,
    transport: Arc<dyn Transport>,
    registry: Arc<dyn EntityRegistry>,
}

impl Node {
    pub fn new(
        name: &str,
        transport: Arc<dyn Transport>,
        registry: Arc<dyn EntityRegistry>,
    ) -> Self {
        Self {
            name: name.to_owned(),
            transport,
            registry,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Creates a service answering `service_name` with `callback`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`](crate::Error::Transport) if the
    /// endpoint cannot be created, e.g. because the name is already served.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            level = "debug",
            skip(self, callback, allocators),
            fields(node = %self.name)
        )
    )]
    pub fn create_service<S: ServiceType>(
        &self,
        service_name: &str,
        callback: AnyServiceCallback<S>,
        allocators: Option<ServiceAllocators<S>>,
    ) -> Result<Arc<Service<S>>> {
        let service = Arc::new(Service::new(
            Arc::clone(&self.transport),
            service_name,
            callback,
            allocators,
        )?);
        let erased: Arc<dyn ServiceBase> = service.clone();
        self.registry.add_service(&erased);
        Ok(service)
    }

    /// Creates a client for `service_name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`](crate::Error::Transport) if the
    /// endpoint cannot be created.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip(self, allocators), fields(node = %self.name))
    )]
    pub fn create_client<S: ServiceType>(
        &self,
        service_name: &str,
        allocators: Option<ServiceAllocators<S>>,
    ) -> Result<Arc<Client<S>>> {
        let client = Arc::new(Client::new(Arc::clone(&self.transport), service_name, allocators)?);
        let erased: Arc<dyn ClientBase> = client.clone();
        self.registry.add_client(&erased);
        Ok(client)
    }

    /// Subscribes `callback` to `topic_name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`](crate::Error::Transport) if the
    /// endpoint cannot be created.
    pub fn create_subscription<M, F>(
        &self,
        topic_name: &str,
        callback: F,
        allocator: Option<Allocator<M>>,
    ) -> Result<Arc<Subscription<M>>>
    where
        M: Message + Default,
        F: Fn(Shared<M>) + Send + Sync + 'static,
    {
        let subscription = Arc::new(Subscription::new(
            Arc::clone(&self.transport),
            topic_name,
            callback,
            allocator,
        )?);
        let erased: Arc<dyn SubscriptionBase> = subscription.clone();
        self.registry.add_subscription(&erased);
        Ok(subscription)
    }

    /// Runs `callback` every `period`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`](crate::Error::InvalidConfig) for a
    /// zero period.
    pub fn create_wall_timer<F>(&self, period: Duration, callback: F) -> Result<Arc<WallTimer>>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let timer = Arc::new(WallTimer::new(period, callback)?);
        let erased: Arc<dyn TimerBase> = timer.clone();
        self.registry.add_timer(&erased);
        Ok(timer)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
