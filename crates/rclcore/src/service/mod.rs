mod allocators;
mod callback;
mod responder;

pub use allocators::*;
pub use callback::*;
pub use responder::*;
