use super::{HashFn, crc32, successor};
use crate::{DEFAULT_VIRTUAL_NODE_COUNT, Error, Result};
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Default)]
struct RingState {
    positions: Vec<u32>,
    owners: HashMap<u32, String>,
    /// Names in insertion order.
    nodes: Vec<String>,
    /// Virtual positions per node; doubles as the membership index.
    weights: HashMap<String, usize>,
}

impl RingState {
    fn place(&mut self, hash: HashFn, node: &str, weight: usize) {
        for i in 0..weight {
            let position = hash(format!("{node}{i}").as_bytes());
            self.owners.insert(position, node.to_string());
            self.positions.push(position);
        }
    }

    /// Lays every node out again in insertion order, so a colliding position
    /// keeps going to the most recently added node.
    fn rebuild(&mut self, hash: HashFn) {
        self.positions.clear();
        self.owners.clear();
        let layout: Vec<(String, usize)> = self
            .nodes
            .iter()
            .map(|n| (n.clone(), self.weights.get(n).copied().unwrap_or_default()))
            .collect();
        for (node, weight) in layout {
            self.place(hash, &node, weight);
        }
        self.positions.sort_unstable();
    }
}

/// Consistent hash ring placing many virtual positions per node.
///
/// Virtual node `i` of `name` sits at `hash(name ++ i)`. A node's weight is
/// its number of virtual positions, so its share of the keys grows with it.
/// Unlike [`crate::HashRing`], adding the same node twice is an error, nodes
/// can be reweighted or removed, and the original node names can be
/// enumerated in insertion order.
///
/// Removing a node hands its keys to the successors of its positions; keys
/// owned by the other nodes stay where they are.
pub struct VirtualNodeRing {
    hash: HashFn,
    state: RwLock<RingState>,
}

impl Default for VirtualNodeRing {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualNodeRing {
    /// Empty CRC-32 ring.
    pub fn new() -> Self {
        Self::with_hasher(crc32)
    }

    pub fn with_hasher(hash: HashFn) -> Self {
        Self {
            hash,
            state: RwLock::new(RingState::default()),
        }
    }

    /// Adds `node` with [`DEFAULT_VIRTUAL_NODE_COUNT`] virtual positions.
    ///
    /// # Errors
    ///
    /// See [`VirtualNodeRing::add_with_count`].
    pub fn add(&self, node: &str) -> Result<()> {
        self.add_with_count(node, DEFAULT_VIRTUAL_NODE_COUNT)
    }

    /// Adds `node` with `count` virtual positions (`0` means the default).
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `node` is empty.
    /// - [`Error::DuplicateNode`] if `node` is already on the ring.
    pub fn add_with_count(&self, node: &str, count: usize) -> Result<()> {
        check_name(node)?;
        let count = if count == 0 {
            DEFAULT_VIRTUAL_NODE_COUNT
        } else {
            count
        };

        let mut state = self.state.write();
        if state.weights.contains_key(node) {
            return Err(Error::DuplicateNode {
                node: node.to_string(),
            });
        }
        state.nodes.push(node.to_string());
        state.weights.insert(node.to_string(), count);
        state.place(self.hash, node, count);
        state.positions.sort_unstable();
        Ok(())
    }

    /// Sets the number of virtual positions of a node already on the ring.
    ///
    /// A `weight` of zero removes the node. Returns `false` if `node` is not
    /// on the ring.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `node` is empty.
    pub fn update_weight(&self, node: &str, weight: usize) -> Result<bool> {
        check_name(node)?;
        if weight == 0 {
            return self.remove(node);
        }

        let mut state = self.state.write();
        match state.weights.get_mut(node) {
            Some(current) if *current == weight => return Ok(true),
            Some(current) => *current = weight,
            None => return Ok(false),
        }
        state.rebuild(self.hash);
        Ok(true)
    }

    /// Takes `node` and all of its virtual positions off the ring. Returns
    /// `false` if it was not there.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `node` is empty.
    pub fn remove(&self, node: &str) -> Result<bool> {
        check_name(node)?;

        let mut state = self.state.write();
        if state.weights.remove(node).is_none() {
            return Ok(false);
        }
        state.nodes.retain(|n| n != node);
        state.rebuild(self.hash);
        Ok(true)
    }

    /// Returns the node owning `key`, or `None` if the ring is empty.
    pub fn get_node(&self, key: &str) -> Option<String> {
        let state = self.state.read();
        if state.positions.is_empty() {
            return None;
        }

        let hash = (self.hash)(key.as_bytes());
        let position = state.positions[successor(&state.positions, hash)];
        state.owners.get(&position).cloned()
    }

    /// Original (non-virtual) node names in insertion order.
    pub fn nodes(&self) -> Vec<String> {
        self.state.read().nodes.clone()
    }

    /// Virtual positions of `node`, if it is on the ring.
    pub fn weight(&self, node: &str) -> Option<usize> {
        self.state.read().weights.get(node).copied()
    }

    /// Every node with its number of virtual positions.
    pub fn weights(&self) -> HashMap<String, usize> {
        self.state.read().weights.clone()
    }

    pub fn contains(&self, node: &str) -> bool {
        self.state.read().weights.contains_key(node)
    }

    pub fn len(&self) -> usize {
        self.state.read().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().nodes.is_empty()
    }
}

fn check_name(node: &str) -> Result<()> {
    if node.is_empty() {
        return Err(Error::invalid("node name must not be empty"));
    }
    Ok(())
}
