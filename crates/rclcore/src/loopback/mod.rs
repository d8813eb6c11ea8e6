//! An in-process transport and wait-set.
//!
//! Requests, responses and published messages are moved between endpoints
//! of one [`LoopbackTransport`] through per-endpoint queues. A
//! [`LoopbackWaitSet`] turns queued traffic and due timers into work for an
//! executor.

mod transport;
mod wait_set;

pub use transport::*;
pub use wait_set::*;
