#![doc = include_str!("../README.md")]

mod config;
mod error;
mod guard;
mod list;
mod pool;
mod queue;
mod ring;
mod ticker;

pub use crate::config::*;
pub use crate::error::*;
pub use crate::list::*;
pub use crate::pool::*;
pub use crate::queue::*;
pub use crate::ring::*;
pub use crate::ticker::*;
