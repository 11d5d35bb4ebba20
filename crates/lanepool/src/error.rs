//! Error types for lanes, queues, tickers, lists and hash rings.
//!
//! Every fallible operation in this crate returns [`Error`]. Nothing panics
//! across the public API: panics raised inside user callbacks are caught at
//! the lane boundary and surface as [`Error::Internal`].
//!
//! ## Error Cases
//! - `InvalidArgument`: empty, zero or non-positive input.
//! - `QueueFull`: the target queue is at capacity (backpressure).
//! - `NoWorkers` / `NoSuchWorker` / `NoSuchObject`: routing or lookup miss.
//! - `AlreadyClosed`: the component has been shut down.
//! - `DuplicateNode`: a node was added twice to a [`crate::VirtualNodeRing`].
//! - `Unconfigured`: a request reached a queue with no processor registered.
//! - `ChannelError`: a reply channel was dropped before answering.
//! - `Callback`: a handler reported a failure of its own.
//! - `Internal`: a handler panicked.

use crate::{LaneId, ObjectId};

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the worker pool and its building blocks.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// The caller passed an empty, zero or otherwise unusable argument.
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// The queue already holds `capacity` requests.
    #[error("Queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// Routing was attempted on a pool without lanes.
    #[error("No workers available")]
    NoWorkers,

    /// The lane id is not (or no longer) part of the pool.
    #[error("No such worker: {lane}")]
    NoSuchWorker { lane: LaneId },

    /// The lane has no object bound under this id.
    #[error("No such object: {object}")]
    NoSuchObject { object: ObjectId },

    /// The component was shut down before the operation.
    #[error("Already closed")]
    AlreadyClosed,

    /// The node is already present on the ring.
    #[error("Node already exists: {node}")]
    DuplicateNode { node: String },

    /// A request arrived before the required callback was registered.
    #[error("Not configured: {what}")]
    Unconfigured { what: &'static str },

    /// Internal channel failure (reply sender dropped, receiver gone).
    #[error("Channel error: {context}")]
    ChannelError { context: String },

    /// A registered callback returned a failure.
    #[error("Callback failed: {reason}")]
    Callback { reason: String },

    /// A registered callback panicked; the panic was contained.
    #[error("Internal error: {reason}")]
    Internal { reason: String },
}

impl Error {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for handlers reporting their own failures.
    pub fn callback(reason: impl Into<String>) -> Self {
        Self::Callback {
            reason: reason.into(),
        }
    }
}
