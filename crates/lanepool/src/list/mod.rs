mod draining;
mod interface;
#[cfg(test)]
mod tests;

pub use draining::*;
pub use interface::*;
