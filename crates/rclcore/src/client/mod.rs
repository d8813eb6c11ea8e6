mod future;
mod requester;

pub use future::*;
pub use requester::*;
