use core::fmt;
use std::{collections::HashMap, sync::Arc};

use crossbeam_channel::Sender;
use parking_lot::Mutex;

use crate::{
    allocator::{reinterpret_owned, ErasedHandle, Shared},
    client::ResponseFuture,
    error::{Error, Result},
    executable::{writable, writable_header, ClientBase},
    message::ServiceType,
    service::ServiceAllocators,
    transport::{EndpointHandle, EndpointKind, Transport},
};

type ResponseCallback<T> = Box<dyn FnOnce(Shared<T>) + Send>;

struct PendingRequest<T> {
    promise: Sender<Shared<T>>,
    callback: Option<ResponseCallback<T>>,
}

/// Sends requests to a service and routes responses back to their callers.
///
/// Responses are matched to requests by sequence number. A response carrying
/// a sequence number that is not pending is rejected with
/// [`Error::UnknownSequence`].
pub struct Client<S: ServiceType> {
    service_name: String,
    endpoint: EndpointHandle,
    transport: Arc<dyn Transport>,
    allocators: ServiceAllocators<S>,
    pending_requests: Mutex<HashMap<i64, PendingRequest<S::Response>>>,
}

impl<S: ServiceType> Client<S> {
    /// Opens a client endpoint for `service_name` on `transport`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the endpoint cannot be created.
    pub fn new(
        transport: Arc<dyn Transport>,
        service_name: &str,
        allocators: Option<ServiceAllocators<S>>,
    ) -> Result<Self> {
        let endpoint = transport.create_endpoint(EndpointKind::Client, service_name)?;
        Ok(Self {
            service_name: service_name.to_owned(),
            endpoint,
            transport,
            allocators: allocators.unwrap_or_default(),
            pending_requests: Mutex::new(HashMap::new()),
        })
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn endpoint(&self) -> &EndpointHandle {
        &self.endpoint
    }

    pub fn allocators(&self) -> &ServiceAllocators<S> {
        &self.allocators
    }

    /// Number of requests still waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.pending_requests.lock().len()
    }

    /// Sends `request` and returns a future for its response.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the transport rejects the request.
    pub fn async_send_request(&self, request: &S::Request) -> Result<ResponseFuture<S::Response>> {
        self.send(request, None)
    }

    /// Like [`async_send_request`](Self::async_send_request), additionally
    /// running `callback` on the executor worker that receives the response.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the transport rejects the request.
    pub fn async_send_request_with_callback<F>(
        &self,
        request: &S::Request,
        callback: F,
    ) -> Result<ResponseFuture<S::Response>>
    where
        F: FnOnce(Shared<S::Response>) + Send + 'static,
    {
        self.send(request, Some(Box::new(callback)))
    }

    fn send(
        &self,
        request: &S::Request,
        callback: Option<ResponseCallback<S::Response>>,
    ) -> Result<ResponseFuture<S::Response>> {
        let (promise, receiver) = crossbeam_channel::bounded(1);
        // Held across the send so a fast response cannot miss its entry.
        let mut pending = self.pending_requests.lock();
        let sequence_number = self.transport.send_request(&self.endpoint, request)?;
        pending.insert(sequence_number, PendingRequest { promise, callback });

        #[cfg(feature = "tracing")]
        tracing::trace!("Request {sequence_number} sent to `{}`", self.service_name);

        Ok(ResponseFuture::new(
            self.service_name.clone(),
            sequence_number,
            receiver,
        ))
    }
}

impl<S: ServiceType> ClientBase for Client<S> {
    fn service_name(&self) -> &str {
        &self.service_name
    }

    fn endpoint(&self) -> &EndpointHandle {
        &self.endpoint
    }

    fn create_response(&self) -> Result<ErasedHandle> {
        Ok(self.allocators.response.allocate_default()?.into())
    }

    fn create_request_header(&self) -> Result<ErasedHandle> {
        Ok(self.allocators.header.allocate_default()?.into())
    }

    fn take_response(
        &self,
        header: &mut ErasedHandle,
        response: &mut ErasedHandle,
    ) -> Result<bool> {
        let header = writable_header(header)?;
        let response = writable(response)?;
        Ok(self.transport.take_response(&self.endpoint, header, response)?)
    }

    fn handle_response(&self, header: ErasedHandle, response: ErasedHandle) -> Result<()> {
        let header = reinterpret_owned(header, &self.allocators.header)?;
        let response = reinterpret_owned(response, &self.allocators.response)?;
        let sequence_number = header.sequence_number;

        let pending = self.pending_requests.lock().remove(&sequence_number);
        let Some(PendingRequest { promise, callback }) = pending else {
            return Err(Error::UnknownSequence {
                service: self.service_name.clone(),
                sequence_number,
            });
        };

        if promise.send(response.clone()).is_err() {
            #[cfg(feature = "tracing")]
            tracing::trace!(
                "Future for request {sequence_number} on `{}` was dropped",
                self.service_name
            );
        }
        if let Some(callback) = callback {
            callback(response);
        }
        Ok(())
    }
}

impl<S: ServiceType> Drop for Client<S> {
    fn drop(&mut self) {
        if let Err(_e) = self.transport.destroy_endpoint(&self.endpoint) {
            #[cfg(feature = "tracing")]
            tracing::warn!("Failed to destroy endpoint for client `{}`: {}", self.service_name, _e);
        }
    }
}

impl<S: ServiceType> fmt::Debug for Client<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("service_name", &self.service_name)
            .field("endpoint", &self.endpoint.id())
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}
