mod clock;
mod rate;

pub use clock::*;
pub use rate::*;
