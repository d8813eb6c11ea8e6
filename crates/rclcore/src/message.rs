use core::any::Any;

/// A message moved through a [`Transport`] without knowing its concrete type.
///
/// Wire encoding belongs to the transport; inside one process a payload is
/// simply an owned copy of the message.
///
/// [`Transport`]: crate::Transport
pub type Payload = Box<dyn Any + Send>;

/// Object-safe view of a message slot.
///
/// Transports and wait-sets only ever see `&dyn Message` / `&mut dyn Message`,
/// the same way a C middleware layer only sees `void *`. Unlike a raw pointer,
/// every access is checked against the concrete type.
///
/// Implemented for every `Clone + Send + Sync + 'static` type.
pub trait Message: Any + Send + Sync {
    /// The concrete type name, used in diagnostics.
    fn type_name(&self) -> &'static str;

    /// Copies the message into a transport payload.
    fn to_payload(&self) -> Payload;

    /// Overwrites the slot with a payload of the same concrete type.
    ///
    /// # Errors
    ///
    /// Returns the payload unchanged if it holds a different type.
    fn assign(&mut self, payload: Payload) -> Result<(), Payload>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T> Message for T
where
    T: Any + Clone + Send + Sync,
{
    fn type_name(&self) -> &'static str {
        core::any::type_name::<T>()
    }

    fn to_payload(&self) -> Payload {
        Box::new(self.clone())
    }

    fn assign(&mut self, payload: Payload) -> Result<(), Payload> {
        *self = *payload.downcast::<T>()?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Correlation identifier linking a response to the request that produced
/// it.
///
/// `writer_guid` identifies the requesting client endpoint and
/// `sequence_number` the request within that client.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RequestId {
    pub writer_guid: u64,
    pub sequence_number: i64,
}

impl RequestId {
    pub const fn new(writer_guid: u64, sequence_number: i64) -> Self {
        Self {
            writer_guid,
            sequence_number,
        }
    }
}

/// A request/response pair forming one service type.
///
/// # Example
///
/// ```
/// use rclcore::ServiceType;
///
/// #[derive(Clone, Debug, Default)]
/// struct AddTwoIntsRequest { a: i64, b: i64 }
///
/// #[derive(Clone, Debug, Default)]
/// struct AddTwoIntsResponse { sum: i64 }
///
/// struct AddTwoInts;
///
/// impl ServiceType for AddTwoInts {
///     type Request = AddTwoIntsRequest;
///     type Response = AddTwoIntsResponse;
/// }
/// ```
pub trait ServiceType: 'static {
    type Request: Clone + Default + Send + Sync + 'static;
    type Response: Clone + Default + Send + Sync + 'static;
}
