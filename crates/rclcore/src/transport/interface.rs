use crate::{
    message::{Message, Payload, RequestId},
    transport::{EndpointHandle, EndpointId, EndpointKind},
};

/// Failures reported by a [`Transport`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum TransportError {
    #[error("unknown endpoint {0}")]
    UnknownEndpoint(EndpointId),
    #[error("no service is serving `{0}`")]
    ServiceUnavailable(String),
    #[error("payload does not match the slot type `{expected}`")]
    PayloadMismatch { expected: &'static str },
    #[error("send failed: {reason}")]
    SendFailed { reason: String },
    #[error("name `{0}` is already served")]
    NameInUse(String),
}

/// The middleware seam.
///
/// Encoding, discovery and delivery live behind this trait. Every method
/// takes the endpoint it operates on and works on type-erased message slots,
/// so one transport instance serves every service and topic type.
///
/// All `take_*` methods return `Ok(false)` when nothing was pending; this is
/// not an error, as another worker or a spurious wake-up may have raced the
/// caller.
pub trait Transport: Send + Sync {
    /// Opens an endpoint of the given role under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NameInUse`] if a second service claims a
    /// name already served.
    fn create_endpoint(
        &self,
        kind: EndpointKind,
        name: &str,
    ) -> Result<EndpointHandle, TransportError>;

    /// Releases an endpoint. Pending traffic for it is discarded.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::UnknownEndpoint`] if it was already released.
    fn destroy_endpoint(&self, endpoint: &EndpointHandle) -> Result<(), TransportError>;

    /// Moves the next pending request into `request` and its correlation
    /// identity into `header`.
    fn take_request(
        &self,
        endpoint: &EndpointHandle,
        header: &mut RequestId,
        request: &mut dyn Message,
    ) -> Result<bool, TransportError>;

    /// Sends `response` back to the client identified by `header`.
    fn send_response(
        &self,
        endpoint: &EndpointHandle,
        header: &RequestId,
        response: &dyn Message,
    ) -> Result<(), TransportError>;

    /// Sends a request from a client endpoint, returning its sequence number.
    fn send_request(
        &self,
        endpoint: &EndpointHandle,
        request: &dyn Message,
    ) -> Result<i64, TransportError>;

    /// Moves the next pending response for a client endpoint.
    fn take_response(
        &self,
        endpoint: &EndpointHandle,
        header: &mut RequestId,
        response: &mut dyn Message,
    ) -> Result<bool, TransportError>;

    /// Moves the next pending message for a subscription endpoint.
    fn take_message(
        &self,
        endpoint: &EndpointHandle,
        message: &mut dyn Message,
    ) -> Result<bool, TransportError>;
}

/// Moves `payload` into `slot`, rejecting a payload of another type.
pub(crate) fn fill_slot(slot: &mut dyn Message, payload: Payload) -> Result<(), TransportError> {
    let expected = slot.type_name();
    slot.assign(payload)
        .map_err(|_| TransportError::PayloadMismatch { expected })
}
