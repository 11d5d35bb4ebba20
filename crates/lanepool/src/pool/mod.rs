mod bound;
mod interface;
mod lane;
mod manager;
#[cfg(test)]
mod tests;

pub use bound::*;
pub use interface::*;
pub use lane::*;
pub use manager::*;
