//! Consistent hashing.
//!
//! Two ring flavours map arbitrary keys onto named nodes:
//!
//! - [`HashRing`]: a fixed number of replicas per node; adding a node twice is
//!   a harmless no-op.
//! - [`VirtualNodeRing`]: a weight (virtual positions, default 100) per node
//!   and an ordered list of the nodes added; nodes can be reweighted or
//!   removed, and adding a node twice is an [`crate::Error::DuplicateNode`].
//!
//! Both resolve a key to the first position at or after `hash(key)`,
//! wrapping around to the start of the ring.

mod fixed;
mod hash;
mod virtual_node;

pub use fixed::*;
pub use hash::*;
pub use virtual_node::*;

/// Index of the first position `>= hash`, wrapping to 0 past the end.
///
/// `positions` must be sorted and non-empty.
fn successor(positions: &[u32], hash: u32) -> usize {
    let idx = positions.partition_point(|&p| p < hash);
    if idx == positions.len() { 0 } else { idx }
}
