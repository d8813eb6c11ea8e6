use core::{fmt, time::Duration};
use std::{
    collections::HashSet,
    sync::{Arc, Weak},
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use crate::{
    context::{Context, ShutdownHookId},
    executable::{
        AnyExecutable, ClientBase, ExecutableKind, ServiceBase, SubscriptionBase, TimerBase,
        TimerId,
    },
    loopback::{LoopbackTransport, Wakeup},
    transport::EndpointId,
    wait_set::{EntityRegistry, WaitSet},
};

/// Upper bound on a single blocking wait.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum EntityKey {
    Endpoint(EndpointId),
    Timer(TimerId),
}

enum Entry {
    Subscription(Weak<dyn SubscriptionBase>),
    Timer(Weak<dyn TimerBase>),
    Service(Weak<dyn ServiceBase>),
    Client(Weak<dyn ClientBase>),
}

impl Entry {
    fn upgrade(&self) -> Option<ExecutableKind> {
        Some(match self {
            Self::Subscription(weak) => ExecutableKind::Subscription(weak.upgrade()?),
            Self::Timer(weak) => ExecutableKind::Timer(weak.upgrade()?),
            Self::Service(weak) => ExecutableKind::Service(weak.upgrade()?),
            Self::Client(weak) => ExecutableKind::Client(weak.upgrade()?),
        })
    }

    fn is_alive(&self) -> bool {
        match self {
            Self::Subscription(weak) => weak.strong_count() > 0,
            Self::Timer(weak) => weak.strong_count() > 0,
            Self::Service(weak) => weak.strong_count() > 0,
            Self::Client(weak) => weak.strong_count() > 0,
        }
    }
}

fn key_of(kind: &ExecutableKind) -> EntityKey {
    match kind {
        ExecutableKind::Subscription(subscription) => {
            EntityKey::Endpoint(subscription.endpoint().id())
        }
        ExecutableKind::Timer(timer) => EntityKey::Timer(timer.timer_id()),
        ExecutableKind::Service(service) => EntityKey::Endpoint(service.endpoint().id()),
        ExecutableKind::Client(client) => EntityKey::Endpoint(client.endpoint().id()),
    }
}

#[derive(Default)]
struct Entities {
    entries: Vec<Entry>,
    cursor: usize,
}

/// The outcome of one pass over the registered entities.
struct Scan {
    ready: Option<AnyExecutable>,
    next_timer: Option<Duration>,
}

/// A [`WaitSet`] over the entities of one [`LoopbackTransport`].
///
/// Entities are offered round-robin. An entity whose previous work item is
/// still executing is skipped; traffic that arrived for it in the meantime
/// is offered once that item completes. Consequently a callback is never
/// entered concurrently through this wait-set.
///
/// Selection blocks on transport notifications, bounded by the next timer
/// deadline and the poll interval, and wakes immediately when the context
/// shuts down.
pub struct LoopbackWaitSet {
    transport: Arc<LoopbackTransport>,
    wakeups: Receiver<Wakeup>,
    notifier: Sender<Wakeup>,
    entities: Mutex<Entities>,
    in_flight: Arc<Mutex<HashSet<EntityKey>>>,
    poll_interval: Duration,
    context: Weak<Context>,
    shutdown_hook: ShutdownHookId,
}

impl LoopbackWaitSet {
    /// Watches `transport`, waking blocked selections when `context` shuts
    /// down. The shutdown hook is unregistered when the wait-set is dropped.
    pub fn new(transport: Arc<LoopbackTransport>, context: &Arc<Context>) -> Self {
        let notifier = transport.notifier();
        let interrupt = notifier.clone();
        // A full channel already holds a wake-up, and the woken selection
        // re-checks the context before scanning.
        let shutdown_hook = context.on_shutdown(move || {
            let _ = interrupt.try_send(Wakeup::Interrupt);
        });
        Self {
            wakeups: transport.wakeups(),
            transport,
            notifier,
            entities: Mutex::new(Entities::default()),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            poll_interval: DEFAULT_POLL_INTERVAL,
            context: Arc::downgrade(context),
            shutdown_hook,
        }
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn transport(&self) -> &Arc<LoopbackTransport> {
        &self.transport
    }

    /// Registered entities that are still alive.
    pub fn len(&self) -> usize {
        let mut entities = self.entities.lock();
        entities.entries.retain(Entry::is_alive);
        entities.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entities currently executing.
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }

    fn register(&self, entry: Entry) {
        self.entities.lock().entries.push(entry);
        // a blocked selection should look at the new entity
        let _ = self.notifier.try_send(Wakeup::Ready);
    }

    fn is_ready(&self, kind: &ExecutableKind) -> bool {
        match kind {
            ExecutableKind::Subscription(subscription) => {
                self.transport.pending(subscription.endpoint().id()) > 0
            }
            ExecutableKind::Timer(timer) => timer.is_ready(),
            ExecutableKind::Service(service) => self.transport.pending(service.endpoint().id()) > 0,
            ExecutableKind::Client(client) => self.transport.pending(client.endpoint().id()) > 0,
        }
    }

    fn scan(&self) -> Scan {
        let mut entities = self.entities.lock();
        entities.entries.retain(Entry::is_alive);

        let len = entities.entries.len();
        let start = if len == 0 { 0 } else { entities.cursor % len };
        let mut next_timer: Option<Duration> = None;

        for offset in 0..len {
            let index = (start + offset) % len;
            let Some(kind) = entities.entries[index].upgrade() else {
                continue;
            };
            let key = key_of(&kind);
            if self.in_flight.lock().contains(&key) {
                continue;
            }
            if self.is_ready(&kind) {
                entities.cursor = index + 1;
                return Scan {
                    ready: Some(self.claim(kind, key)),
                    next_timer: None,
                };
            }
            if let ExecutableKind::Timer(timer) = &kind {
                if !timer.is_canceled() {
                    let due = timer.time_until_trigger();
                    next_timer = Some(next_timer.map_or(due, |current| current.min(due)));
                }
            }
        }
        Scan {
            ready: None,
            next_timer,
        }
    }

    fn claim(&self, kind: ExecutableKind, key: EntityKey) -> AnyExecutable {
        self.in_flight.lock().insert(key);
        let in_flight = Arc::clone(&self.in_flight);
        let notifier = self.notifier.clone();
        AnyExecutable::new(kind).with_completion(move || {
            in_flight.lock().remove(&key);
            // traffic that arrived meanwhile is now selectable
            let _ = notifier.try_send(Wakeup::Ready);
        })
    }
}

impl WaitSet for LoopbackWaitSet {
    fn select_next_ready(&self, context: &Context) -> Option<AnyExecutable> {
        if !context.ok() {
            return None;
        }
        let first = self.scan();
        if first.ready.is_some() {
            return first.ready;
        }

        let timeout = first
            .next_timer
            .map_or(self.poll_interval, |due| due.min(self.poll_interval));
        match self.wakeups.recv_timeout(timeout) {
            Ok(Wakeup::Interrupt) => return None,
            Ok(Wakeup::Ready) | Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return None,
        }
        // Coalesce the burst; the scan below observes everything it announced.
        while let Ok(wakeup) = self.wakeups.try_recv() {
            if wakeup == Wakeup::Interrupt {
                return None;
            }
        }
        if !context.ok() {
            return None;
        }
        self.scan().ready
    }
}

impl EntityRegistry for LoopbackWaitSet {
    fn add_subscription(&self, subscription: &Arc<dyn SubscriptionBase>) {
        self.register(Entry::Subscription(Arc::downgrade(subscription)));
    }

    fn add_service(&self, service: &Arc<dyn ServiceBase>) {
        self.register(Entry::Service(Arc::downgrade(service)));
    }

    fn add_client(&self, client: &Arc<dyn ClientBase>) {
        self.register(Entry::Client(Arc::downgrade(client)));
    }

    fn add_timer(&self, timer: &Arc<dyn TimerBase>) {
        self.register(Entry::Timer(Arc::downgrade(timer)));
    }
}

impl Drop for LoopbackWaitSet {
    fn drop(&mut self) {
        if let Some(context) = self.context.upgrade() {
            context.remove_shutdown_hook(self.shutdown_hook);
        }
    }
}

impl fmt::Debug for LoopbackWaitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackWaitSet")
            .field("entities", &self.entities.lock().entries.len())
            .field("in_flight", &self.in_flight())
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}
