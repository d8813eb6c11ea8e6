use core::fmt;
use std::sync::Arc;

use crate::{
    allocator::Shared,
    message::{RequestId, ServiceType},
};

type RequestCallback<S> =
    dyn Fn(Shared<<S as ServiceType>::Request>, &mut <S as ServiceType>::Response) + Send + Sync;

type RequestWithHeaderCallback<S> = dyn Fn(
        Shared<RequestId>,
        Shared<<S as ServiceType>::Request>,
        &mut <S as ServiceType>::Response,
    ) + Send
    + Sync;

/// A user callback answering requests of service type `S`.
///
/// The two shapes differ only in whether the callback sees the request's
/// correlation header.
pub enum AnyServiceCallback<S: ServiceType> {
    Request(Arc<RequestCallback<S>>),
    RequestWithHeader(Arc<RequestWithHeaderCallback<S>>),
}

impl<S: ServiceType> AnyServiceCallback<S> {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(Shared<S::Request>, &mut S::Response) + Send + Sync + 'static,
    {
        Self::Request(Arc::new(callback))
    }

    pub fn with_header<F>(callback: F) -> Self
    where
        F: Fn(Shared<RequestId>, Shared<S::Request>, &mut S::Response) + Send + Sync + 'static,
    {
        Self::RequestWithHeader(Arc::new(callback))
    }

    /// Invokes the callback, filling `response`.
    pub fn dispatch(
        &self,
        header: Shared<RequestId>,
        request: Shared<S::Request>,
        response: &mut S::Response,
    ) {
        match self {
            Self::Request(callback) => callback(request, response),
            Self::RequestWithHeader(callback) => callback(header, request, response),
        }
    }
}

impl<S: ServiceType> Clone for AnyServiceCallback<S> {
    fn clone(&self) -> Self {
        match self {
            Self::Request(callback) => Self::Request(Arc::clone(callback)),
            Self::RequestWithHeader(callback) => Self::RequestWithHeader(Arc::clone(callback)),
        }
    }
}

impl<S: ServiceType> fmt::Debug for AnyServiceCallback<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Request(_) => "AnyServiceCallback::Request",
            Self::RequestWithHeader(_) => "AnyServiceCallback::RequestWithHeader",
        })
    }
}
