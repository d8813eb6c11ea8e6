use core::fmt;
use std::sync::Arc;

use crate::{
    allocator::{reinterpret_owned, ErasedHandle, Shared},
    error::{Error, Result},
    executable::{writable, writable_header, ServiceBase},
    message::{RequestId, ServiceType},
    service::{AnyServiceCallback, ServiceAllocators},
    transport::{EndpointHandle, EndpointKind, Transport},
};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Answers requests for one service name.
///
/// A `Service` owns its transport endpoint exclusively and releases it when
/// dropped. Each handled request allocates one header, one request and one
/// response object, each through its own allocator, and produces exactly
/// one send.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use rclcore::{AnyServiceCallback, LoopbackTransport, Service, ServiceType};
///
/// #[derive(Clone, Default)]
/// struct Req { a: i64, b: i64 }
/// #[derive(Clone, Default)]
/// struct Resp { sum: i64 }
/// struct AddTwoInts;
/// impl ServiceType for AddTwoInts {
///     type Request = Req;
///     type Response = Resp;
/// }
///
/// let transport = Arc::new(LoopbackTransport::new());
/// let service = Service::<AddTwoInts>::new(
///     transport,
///     "add_two_ints",
///     AnyServiceCallback::<AddTwoInts>::new(|req, resp| resp.sum = req.a + req.b),
///     None,
/// )
/// .unwrap();
/// assert_eq!(service.service_name(), "add_two_ints");
/// ```
pub struct Service<S: ServiceType> {
    service_name: String,
    endpoint: EndpointHandle,
    transport: Arc<dyn Transport>,
    callback: AnyServiceCallback<S>,
    allocators: ServiceAllocators<S>,
}

impl<S: ServiceType> Service<S> {
    /// Opens a service endpoint named `service_name` on `transport`.
    ///
    /// Without `allocators` every role uses the global resource.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the endpoint cannot be created.
    pub fn new(
        transport: Arc<dyn Transport>,
        service_name: &str,
        callback: AnyServiceCallback<S>,
        allocators: Option<ServiceAllocators<S>>,
    ) -> Result<Self> {
        let endpoint = transport.create_endpoint(EndpointKind::Service, service_name)?;
        Ok(Self::from_endpoint(transport, endpoint, callback, allocators))
    }

    /// Wraps an endpoint that was already created on `transport`.
    pub fn from_endpoint(
        transport: Arc<dyn Transport>,
        endpoint: EndpointHandle,
        callback: AnyServiceCallback<S>,
        allocators: Option<ServiceAllocators<S>>,
    ) -> Self {
        Self {
            service_name: endpoint.name().to_owned(),
            endpoint,
            transport,
            callback,
            allocators: allocators.unwrap_or_default(),
        }
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

    /// Transmits `response` tagged with the correlation identity in
    /// `header`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransportSend`] if the transport rejects the send.
    /// The send is not retried.
    pub fn send_response(&self, header: &RequestId, response: &S::Response) -> Result<()> {
        self.transport
            .send_response(&self.endpoint, header, response)
            .map_err(|source| Error::TransportSend {
                service: self.service_name.clone(),
                source,
            })
    }
}

impl<S: ServiceType> ServiceBase for Service<S> {
    fn service_name(&self) -> &str {
        &self.service_name
    }

    fn endpoint(&self) -> &EndpointHandle {
        &self.endpoint
    }

    fn create_request(&self) -> Result<ErasedHandle> {
        Ok(self.allocators.request.allocate_default()?.into())
    }

    fn create_request_identifier(&self) -> Result<ErasedHandle> {
        Ok(self.allocators.header.allocate_default()?.into())
    }

    fn take_request(&self, header: &mut ErasedHandle, request: &mut ErasedHandle) -> Result<bool> {
        let header = writable_header(header)?;
        let request = writable(request)?;
        Ok(self.transport.take_request(&self.endpoint, header, request)?)
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "trace", skip_all, fields(service = %self.service_name))
    )]
    fn handle_request(&self, header: ErasedHandle, request: ErasedHandle) -> Result<()> {
        let header = reinterpret_owned(header, &self.allocators.header)?;
        let request = reinterpret_owned(request, &self.allocators.request)?;
        let mut response = self.allocators.response.allocate_default()?;

        let slot = Shared::get_mut(&mut response).ok_or(Error::AliasedHandle {
            type_name: core::any::type_name::<S::Response>(),
        })?;
        self.callback.dispatch(header.clone(), request, slot);

        self.send_response(&header, &response)
    }
}

impl<S: ServiceType> Drop for Service<S> {
    fn drop(&mut self) {
        if let Err(_e) = self.transport.destroy_endpoint(&self.endpoint) {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                "Failed to destroy endpoint for service `{}`: {}",
                self.service_name,
                _e
            );
        }
    }
}

impl<S: ServiceType> fmt::Debug for Service<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("service_name", &self.service_name)
            .field("endpoint", &self.endpoint.id())
            .field("callback", &self.callback)
            .finish_non_exhaustive()
    }
}
