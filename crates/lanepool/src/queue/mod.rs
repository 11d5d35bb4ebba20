mod bounded;
mod interface;

pub use bounded::*;
pub use interface::*;
