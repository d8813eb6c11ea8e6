use core::fmt;
use std::collections::{HashMap, VecDeque};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use portable_atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::{
    message::{Message, Payload, RequestId},
    transport::{fill_slot, EndpointHandle, EndpointId, EndpointKind, Transport, TransportError},
};

/// Notifications from the transport to the wait-set watching it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Wakeup {
    /// Some entity may have become ready.
    Ready,
    /// The context shut down.
    Interrupt,
}

struct Endpoint {
    kind: EndpointKind,
    name: String,
    queue: VecDeque<(RequestId, Payload)>,
    next_sequence: i64,
}

#[derive(Default)]
struct State {
    endpoints: HashMap<EndpointId, Endpoint>,
    services: HashMap<String, EndpointId>,
    topics: HashMap<String, Vec<EndpointId>>,
}

impl State {
    fn endpoint_mut(&mut self, id: EndpointId) -> Result<&mut Endpoint, TransportError> {
        self.endpoints
            .get_mut(&id)
            .ok_or(TransportError::UnknownEndpoint(id))
    }

    fn pop(&mut self, id: EndpointId) -> Result<Option<(RequestId, Payload)>, TransportError> {
        Ok(self.endpoint_mut(id)?.queue.pop_front())
    }
}

/// A [`Transport`] that delivers everything within the current process.
///
/// Service requests are routed by service name, responses by the requesting
/// client's endpoint id (carried as the request's writer GUID), and
/// published messages to every subscription on the topic.
///
/// A transport is meant to be watched by a single [`LoopbackWaitSet`].
///
/// [`LoopbackWaitSet`]: crate::LoopbackWaitSet
pub struct LoopbackTransport {
    state: Mutex<State>,
    wakeup_tx: Sender<Wakeup>,
    wakeup_rx: Receiver<Wakeup>,
    next_endpoint: AtomicU64,
    fail_sends: AtomicUsize,
    responses_sent: AtomicU64,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        // One pending wake-up is enough: every selection rescans after waking.
        let (wakeup_tx, wakeup_rx) = crossbeam_channel::bounded(1);
        Self {
            state: Mutex::new(State::default()),
            wakeup_tx,
            wakeup_rx,
            next_endpoint: AtomicU64::new(1),
            fail_sends: AtomicUsize::new(0),
            responses_sent: AtomicU64::new(0),
        }
    }

    /// Delivers a copy of `message` to every subscription on `topic`,
    /// returning how many received it.
    pub fn publish(&self, topic: &str, message: &dyn Message) -> usize {
        let delivered = {
            let mut state = self.state.lock();
            let subscribers = state.topics.get(topic).cloned().unwrap_or_default();
            let mut delivered = 0;
            for id in subscribers {
                if let Some(endpoint) = state.endpoints.get_mut(&id) {
                    endpoint
                        .queue
                        .push_back((RequestId::default(), message.to_payload()));
                    delivered += 1;
                }
            }
            delivered
        };
        if delivered > 0 {
            self.notify(Wakeup::Ready);
        }
        delivered
    }

    /// Makes the next `n` response sends fail with
    /// [`TransportError::SendFailed`].
    pub fn fail_next_sends(&self, n: usize) {
        self.fail_sends.store(n, Ordering::Release);
    }

    /// Responses successfully sent so far.
    pub fn responses_sent(&self) -> u64 {
        self.responses_sent.load(Ordering::Acquire)
    }

    /// Items waiting to be taken by endpoint `id`.
    pub fn pending(&self, id: EndpointId) -> usize {
        self.state
            .lock()
            .endpoints
            .get(&id)
            .map_or(0, |endpoint| endpoint.queue.len())
    }

    pub(crate) fn wakeups(&self) -> Receiver<Wakeup> {
        self.wakeup_rx.clone()
    }

    pub(crate) fn notifier(&self) -> Sender<Wakeup> {
        self.wakeup_tx.clone()
    }

    fn notify(&self, wakeup: Wakeup) {
        // Full means a wake-up is already pending.
        let _ = self.wakeup_tx.try_send(wakeup);
    }
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LoopbackTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("LoopbackTransport")
            .field("endpoints", &state.endpoints.len())
            .field("services", &state.services.keys().collect::<Vec<_>>())
            .field("responses_sent", &self.responses_sent())
            .finish_non_exhaustive()
    }
}

impl Transport for LoopbackTransport {
    fn create_endpoint(
        &self,
        kind: EndpointKind,
        name: &str,
    ) -> Result<EndpointHandle, TransportError> {
        let mut state = self.state.lock();
        if kind == EndpointKind::Service && state.services.contains_key(name) {
            return Err(TransportError::NameInUse(name.to_owned()));
        }

        let id = EndpointId::new(self.next_endpoint.fetch_add(1, Ordering::Relaxed));
        match kind {
            EndpointKind::Service => {
                state.services.insert(name.to_owned(), id);
            }
            EndpointKind::Subscription => {
                state.topics.entry(name.to_owned()).or_default().push(id);
            }
            EndpointKind::Client => {}
        }
        state.endpoints.insert(
            id,
            Endpoint {
                kind,
                name: name.to_owned(),
                queue: VecDeque::new(),
                next_sequence: 0,
            },
        );

        #[cfg(feature = "tracing")]
        tracing::debug!("Created {kind} endpoint {id} for `{name}`");

        Ok(EndpointHandle::new(id, kind, name))
    }

    fn destroy_endpoint(&self, endpoint: &EndpointHandle) -> Result<(), TransportError> {
        let id = endpoint.id();
        let mut state = self.state.lock();
        let removed = state
            .endpoints
            .remove(&id)
            .ok_or(TransportError::UnknownEndpoint(id))?;
        match removed.kind {
            EndpointKind::Service => {
                if state.services.get(&removed.name) == Some(&id) {
                    state.services.remove(&removed.name);
                }
            }
            EndpointKind::Subscription => {
                if let Some(subscribers) = state.topics.get_mut(&removed.name) {
                    subscribers.retain(|subscriber| *subscriber != id);
                }
            }
            EndpointKind::Client => {}
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "Destroyed {} endpoint {id} for `{}` ({} pending dropped)",
            removed.kind,
            removed.name,
            removed.queue.len()
        );
        Ok(())
    }

    fn take_request(
        &self,
        endpoint: &EndpointHandle,
        header: &mut RequestId,
        request: &mut dyn Message,
    ) -> Result<bool, TransportError> {
        let Some((id, payload)) = self.state.lock().pop(endpoint.id())? else {
            return Ok(false);
        };
        fill_slot(request, payload)?;
        *header = id;
        Ok(true)
    }

    fn send_response(
        &self,
        _endpoint: &EndpointHandle,
        header: &RequestId,
        response: &dyn Message,
    ) -> Result<(), TransportError> {
        let failing = self
            .fail_sends
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(TransportError::SendFailed {
                reason: String::from("injected failure"),
            });
        }

        let client = EndpointId::new(header.writer_guid);
        self.state
            .lock()
            .endpoint_mut(client)?
            .queue
            .push_back((*header, response.to_payload()));
        self.responses_sent.fetch_add(1, Ordering::AcqRel);
        self.notify(Wakeup::Ready);
        Ok(())
    }

    fn send_request(
        &self,
        endpoint: &EndpointHandle,
        request: &dyn Message,
    ) -> Result<i64, TransportError> {
        let sequence_number = {
            let mut state = self.state.lock();
            let service = *state
                .services
                .get(endpoint.name())
                .ok_or_else(|| TransportError::ServiceUnavailable(endpoint.name().to_owned()))?;

            let client = state.endpoint_mut(endpoint.id())?;
            client.next_sequence += 1;
            let sequence_number = client.next_sequence;

            let header = RequestId::new(endpoint.id().get(), sequence_number);
            state
                .endpoint_mut(service)?
                .queue
                .push_back((header, request.to_payload()));
            sequence_number
        };
        self.notify(Wakeup::Ready);
        Ok(sequence_number)
    }

    fn take_response(
        &self,
        endpoint: &EndpointHandle,
        header: &mut RequestId,
        response: &mut dyn Message,
    ) -> Result<bool, TransportError> {
        let Some((id, payload)) = self.state.lock().pop(endpoint.id())? else {
            return Ok(false);
        };
        fill_slot(response, payload)?;
        *header = id;
        Ok(true)
    }

    fn take_message(
        &self,
        endpoint: &EndpointHandle,
        message: &mut dyn Message,
    ) -> Result<bool, TransportError> {
        let Some((_, payload)) = self.state.lock().pop(endpoint.id())? else {
            return Ok(false);
        };
        fill_slot(message, payload)?;
        Ok(true)
    }
}
