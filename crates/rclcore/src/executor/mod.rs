//! Multi-threaded dispatch of ready entities.
//!
//! A fixed pool of worker threads shares one wait-set. Selection of the next
//! ready entity is serialized behind a single gate; execution of the selected
//! entity happens outside the gate, so up to `number_of_threads` entities run
//! in parallel.

mod config;
mod dispatch;
mod failure;
mod multi_threaded;
#[cfg(test)]
mod tests;

pub use config::*;
pub use dispatch::*;
pub use failure::*;
pub use multi_threaded::*;
