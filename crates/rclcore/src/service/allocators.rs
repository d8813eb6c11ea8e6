use core::fmt;

use crate::{
    allocator::Allocator,
    message::{RequestId, ServiceType},
};

/// The three allocators behind one service endpoint.
///
/// Request, response and header objects are allocated independently, each
/// through its own role. [`from_allocator`](Self::from_allocator) rebinds a
/// single allocator to all three roles so they share one memory resource.
pub struct ServiceAllocators<S: ServiceType> {
    pub request: Allocator<S::Request>,
    pub response: Allocator<S::Response>,
    pub header: Allocator<RequestId>,
}

impl<S: ServiceType> ServiceAllocators<S> {
    pub fn new(
        request: Allocator<S::Request>,
        response: Allocator<S::Response>,
        header: Allocator<RequestId>,
    ) -> Self {
        Self {
            request,
            response,
            header,
        }
    }

    /// Rebinds `allocator` to the request, response and header types.
    pub fn from_allocator<T>(allocator: &Allocator<T>) -> Self {
        Self {
            request: allocator.rebind(),
            response: allocator.rebind(),
            header: allocator.rebind(),
        }
    }
}

impl<S: ServiceType> Default for ServiceAllocators<S> {
    fn default() -> Self {
        Self::from_allocator(&Allocator::<()>::default())
    }
}

impl<S: ServiceType> Clone for ServiceAllocators<S> {
    fn clone(&self) -> Self {
        Self {
            request: self.request.clone(),
            response: self.response.clone(),
            header: self.header.clone(),
        }
    }
}

impl<S: ServiceType> fmt::Debug for ServiceAllocators<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAllocators")
            .field("request", &self.request)
            .field("response", &self.response)
            .field("header", &self.header)
            .finish()
    }
}
