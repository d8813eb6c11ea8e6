#![doc = include_str!("../README.md")]

mod allocator;
mod client;
mod context;
mod error;
mod executable;
mod executor;
mod loopback;
mod message;
mod node;
mod service;
mod subscription;
#[cfg(test)]
mod testing;
mod time;
mod timer;
mod transport;
mod wait_set;

pub use crate::allocator::*;
pub use crate::client::*;
pub use crate::context::*;
pub use crate::error::*;
pub use crate::executable::*;
pub use crate::executor::*;
pub use crate::loopback::*;
pub use crate::message::*;
pub use crate::node::*;
pub use crate::service::*;
pub use crate::subscription::*;
pub use crate::time::*;
pub use crate::timer::*;
pub use crate::transport::*;
pub use crate::wait_set::*;
