use core::fmt;

/// Identifier a transport assigns to one endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EndpointId(u64);

impl EndpointId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The role an endpoint plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EndpointKind {
    Service,
    Client,
    Subscription,
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Service => "service",
            Self::Client => "client",
            Self::Subscription => "subscription",
        })
    }
}

/// Exclusive ownership of one transport endpoint.
///
/// Deliberately not `Clone`: exactly one entity owns an endpoint and hands it
/// back through [`Transport::destroy_endpoint`] when it is dropped.
///
/// [`Transport::destroy_endpoint`]: crate::Transport::destroy_endpoint
#[derive(Debug, PartialEq, Eq)]
pub struct EndpointHandle {
    id: EndpointId,
    kind: EndpointKind,
    name: String,
}

impl EndpointHandle {
    pub fn new(id: EndpointId, kind: EndpointKind, name: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            name: name.into(),
        }
    }

    pub const fn id(&self) -> EndpointId {
        self.id
    }

    pub const fn kind(&self) -> EndpointKind {
        self.kind
    }

    /// Service name or topic.
    pub fn name(&self) -> &str {
        &self.name
    }
}
