mod handle;
mod interface;
mod resource;

pub use handle::*;
pub use interface::*;
pub use resource::*;
