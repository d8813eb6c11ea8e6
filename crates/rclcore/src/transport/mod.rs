mod endpoint;
mod interface;

pub use endpoint::*;
pub use interface::*;
