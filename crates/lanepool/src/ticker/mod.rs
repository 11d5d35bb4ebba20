mod interface;
mod periodic;

pub use interface::*;
pub use periodic::*;
