//! Shared fixtures for unit tests.

use core::time::Duration;
use std::{collections::VecDeque, sync::Arc};

use parking_lot::Mutex;
use portable_atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::{
    context::Context,
    error::{Error, Result},
    executable::{AnyExecutable, ExecutableKind, TimerBase, TimerId},
    message::{Message, Payload, RequestId, ServiceType},
    transport::{fill_slot, EndpointHandle, EndpointId, EndpointKind, Transport, TransportError},
    wait_set::WaitSet,
};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AddTwoIntsRequest {
    pub a: i64,
    pub b: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AddTwoIntsResponse {
    pub sum: i64,
}

pub struct AddTwoInts;

impl ServiceType for AddTwoInts {
    type Request = AddTwoIntsRequest;
    type Response = AddTwoIntsResponse;
}

/// A transport that records every send and replays queued traffic.
#[derive(Default)]
pub struct RecordingTransport {
    next_endpoint: AtomicU64,
    next_sequence: AtomicU64,
    requests: Mutex<VecDeque<(RequestId, Payload)>>,
    responses: Mutex<VecDeque<(RequestId, Payload)>>,
    sent_responses: Mutex<Vec<(EndpointId, RequestId, Payload)>>,
    sent_requests: Mutex<Vec<(EndpointId, Payload)>>,
    destroyed: Mutex<Vec<EndpointId>>,
    fail_sends: AtomicUsize,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_request<T: Message>(&self, header: RequestId, request: T) {
        self.requests.lock().push_back((header, Box::new(request)));
    }

    pub fn push_response<T: Message>(&self, header: RequestId, response: T) {
        self.responses.lock().push_back((header, Box::new(response)));
    }

    /// Makes the next `n` `send_response` calls fail.
    pub fn fail_next_sends(&self, n: usize) {
        self.fail_sends.store(n, Ordering::Release);
    }

    pub fn sent_responses<T: Clone + 'static>(&self) -> Vec<(RequestId, T)> {
        self.sent_responses
            .lock()
            .iter()
            .filter_map(|(_, header, payload)| {
                payload.downcast_ref::<T>().map(|r| (*header, r.clone()))
            })
            .collect()
    }

    pub fn sent_request_count(&self) -> usize {
        self.sent_requests.lock().len()
    }

    pub fn destroyed(&self) -> Vec<EndpointId> {
        self.destroyed.lock().clone()
    }
}

impl Transport for RecordingTransport {
    fn create_endpoint(
        &self,
        kind: EndpointKind,
        name: &str,
    ) -> Result<EndpointHandle, TransportError> {
        let id = self.next_endpoint.fetch_add(1, Ordering::Relaxed);
        Ok(EndpointHandle::new(EndpointId::new(id), kind, name))
    }

    fn destroy_endpoint(&self, endpoint: &EndpointHandle) -> Result<(), TransportError> {
        self.destroyed.lock().push(endpoint.id());
        Ok(())
    }

    fn take_request(
        &self,
        _endpoint: &EndpointHandle,
        header: &mut RequestId,
        request: &mut dyn Message,
    ) -> Result<bool, TransportError> {
        let Some((id, payload)) = self.requests.lock().pop_front() else {
            return Ok(false);
        };
        fill_slot(request, payload)?;
        *header = id;
        Ok(true)
    }

    fn send_response(
        &self,
        endpoint: &EndpointHandle,
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
        self.sent_responses
            .lock()
            .push((endpoint.id(), *header, response.to_payload()));
        Ok(())
    }

    fn send_request(
        &self,
        endpoint: &EndpointHandle,
        request: &dyn Message,
    ) -> Result<i64, TransportError> {
        self.sent_requests
            .lock()
            .push((endpoint.id(), request.to_payload()));
        Ok(self.next_sequence.fetch_add(1, Ordering::Relaxed) as i64 + 1)
    }

    fn take_response(
        &self,
        _endpoint: &EndpointHandle,
        header: &mut RequestId,
        response: &mut dyn Message,
    ) -> Result<bool, TransportError> {
        let Some((id, payload)) = self.responses.lock().pop_front() else {
            return Ok(false);
        };
        fill_slot(response, payload)?;
        *header = id;
        Ok(true)
    }

    fn take_message(
        &self,
        _endpoint: &EndpointHandle,
        _message: &mut dyn Message,
    ) -> Result<bool, TransportError> {
        Ok(false)
    }
}

type Task = Box<dyn Fn() -> Result<()> + Send + Sync>;

/// A timer that is always ready and runs an arbitrary task.
pub struct TaskTimer {
    id: TimerId,
    task: Task,
}

impl TaskTimer {
    pub fn new<F>(id: u64, task: F) -> Arc<Self>
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        Arc::new(Self {
            id: TimerId(id),
            task: Box::new(task),
        })
    }

    pub fn failing(id: u64) -> Arc<Self> {
        Self::new(id, || {
            Err(Error::InvalidConfig {
                reason: String::from("task failed"),
            })
        })
    }
}

impl TimerBase for TaskTimer {
    fn timer_id(&self) -> TimerId {
        self.id
    }

    fn is_ready(&self) -> bool {
        true
    }

    fn time_until_trigger(&self) -> Duration {
        Duration::ZERO
    }

    fn execute_callback(&self) -> Result<()> {
        (self.task)()
    }

    fn is_canceled(&self) -> bool {
        false
    }
}

/// A wait-set handing out a fixed script of work items.
///
/// Records how many callers were ever inside `select_next_ready` at once.
#[derive(Default)]
pub struct ScriptedWaitSet {
    queue: Mutex<VecDeque<AnyExecutable>>,
    inside: AtomicUsize,
    max_inside: AtomicUsize,
    selections: AtomicUsize,
    hold: Duration,
}

impl ScriptedWaitSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every selection hold for `hold` before returning.
    pub fn holding(hold: Duration) -> Self {
        Self {
            hold,
            ..Self::default()
        }
    }

    pub fn push(&self, kind: ExecutableKind) {
        self.queue.lock().push_back(AnyExecutable::new(kind));
    }

    pub fn push_timer(&self, timer: &Arc<TaskTimer>) {
        self.push(ExecutableKind::Timer(timer.clone()));
    }

    pub fn push_executable(&self, executable: AnyExecutable) {
        self.queue.lock().push_back(executable);
    }

    pub fn remaining(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn max_inside(&self) -> usize {
        self.max_inside.load(Ordering::Acquire)
    }

    pub fn selections(&self) -> usize {
        self.selections.load(Ordering::Acquire)
    }
}

impl WaitSet for ScriptedWaitSet {
    fn select_next_ready(&self, context: &Context) -> Option<AnyExecutable> {
        let inside = self.inside.fetch_add(1, Ordering::AcqRel) + 1;
        self.max_inside.fetch_max(inside, Ordering::AcqRel);
        self.selections.fetch_add(1, Ordering::AcqRel);

        if !self.hold.is_zero() {
            std::thread::sleep(self.hold);
        }
        let next = self.queue.lock().pop_front();
        self.inside.fetch_sub(1, Ordering::AcqRel);

        if next.is_none() {
            context.sleep_for(Duration::from_millis(1));
        }
        next
    }
}
