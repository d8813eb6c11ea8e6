use std::sync::Arc;

use crate::{
    context::Context,
    executable::{AnyExecutable, ClientBase, ServiceBase, SubscriptionBase, TimerBase},
};

/// The selection policy consulted by executor workers.
///
/// Calls are serialized by the executor: at most one worker is inside
/// `select_next_ready` at any time.
pub trait WaitSet: Send + Sync {
    /// Blocks until an entity is ready or the context shuts down.
    ///
    /// Returns `None` on shutdown or when the wait gave up without finding
    /// work; the caller re-checks the context and asks again. An entity
    /// whose previous [`AnyExecutable`] is still alive must not be returned.
    fn select_next_ready(&self, context: &Context) -> Option<AnyExecutable>;
}

/// A wait-set that entities register with on creation.
///
/// Registries hold entities weakly; dropping the last strong reference
/// removes an entity from selection.
pub trait EntityRegistry: Send + Sync {
    fn add_subscription(&self, subscription: &Arc<dyn SubscriptionBase>);
    fn add_service(&self, service: &Arc<dyn ServiceBase>);
    fn add_client(&self, client: &Arc<dyn ClientBase>);
    fn add_timer(&self, timer: &Arc<dyn TimerBase>);
}
