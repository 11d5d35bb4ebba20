use super::{HashFn, crc32, numeric_hash, successor};
use crate::{DEFAULT_HASHED_RING_REPLICAS, DEFAULT_RING_REPLICAS};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

#[derive(Default)]
struct RingState {
    positions: Vec<u32>,
    owners: HashMap<u32, String>,
    /// Names in insertion order.
    nodes: Vec<String>,
    members: HashSet<String>,
}

/// Consistent hash ring with a fixed number of replicas per node.
///
/// Replica `i` of node `name` sits at `hash(i ++ name)`. Adding a node that
/// is already present does nothing. When two replicas collide on the same
/// position the most recently added node owns it.
///
/// The ring is internally synchronized and can be shared across threads.
///
/// # Example
/// ```
/// use lanepool::HashRing;
///
/// let ring = HashRing::numeric();
/// ring.add(["0", "1"]);
/// assert_eq!(ring.get("11").as_deref(), Some("1"));
/// assert_eq!(ring.get("23").as_deref(), Some("0"));
/// ```
pub struct HashRing {
    hash: HashFn,
    replicas: usize,
    state: RwLock<RingState>,
}

impl Default for HashRing {
    /// CRC-32 ring with [`DEFAULT_HASHED_RING_REPLICAS`] replicas per node.
    fn default() -> Self {
        Self::new(DEFAULT_HASHED_RING_REPLICAS, None)
    }
}

impl HashRing {
    /// Creates an empty ring.
    ///
    /// `replicas == 0` selects [`DEFAULT_RING_REPLICAS`]; `hash == None`
    /// selects [`crc32`].
    pub fn new(replicas: usize, hash: Option<HashFn>) -> Self {
        Self {
            hash: hash.unwrap_or(crc32),
            replicas: if replicas == 0 {
                DEFAULT_RING_REPLICAS
            } else {
                replicas
            },
            state: RwLock::new(RingState::default()),
        }
    }

    /// A ring using [`numeric_hash`] and [`DEFAULT_RING_REPLICAS`] replicas,
    /// whose layout can be worked out by hand.
    pub fn numeric() -> Self {
        Self::new(DEFAULT_RING_REPLICAS, Some(numeric_hash))
    }

    pub fn replicas(&self) -> usize {
        self.replicas
    }

    /// Adds every node not already on the ring, then re-sorts it once.
    pub fn add<I, S>(&self, nodes: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut state = self.state.write();
        for node in nodes {
            let node = node.as_ref();
            if !state.members.insert(node.to_string()) {
                continue;
            }
            state.nodes.push(node.to_string());

            for i in 0..self.replicas {
                let position = (self.hash)(format!("{i}{node}").as_bytes());
                state.positions.push(position);
                state.owners.insert(position, node.to_string());
            }
        }
        state.positions.sort_unstable();
    }

    /// Returns the node owning `key`, or `None` if the ring is empty.
    pub fn get(&self, key: &str) -> Option<String> {
        let state = self.state.read();
        if state.positions.is_empty() {
            return None;
        }

        let hash = (self.hash)(key.as_bytes());
        let position = state.positions[successor(&state.positions, hash)];
        state.owners.get(&position).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().positions.is_empty()
    }

    /// Number of distinct nodes on the ring.
    pub fn len(&self) -> usize {
        self.state.read().nodes.len()
    }

    /// Node names in the order they were added.
    pub fn nodes(&self) -> Vec<String> {
        self.state.read().nodes.clone()
    }
}
