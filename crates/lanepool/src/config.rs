use core::time::Duration;

/// Default number of requests a lane queue buffers before rejecting work.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Largest queue capacity the underlying Tokio channel accepts.
pub const MAX_QUEUE_CAPACITY: usize = usize::MAX >> 3;

/// Default ticker period.
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_secs(1);

/// Default pause of a [`crate::DrainingList`] consumer when the list is empty.
pub const DEFAULT_LIST_CONSUME_RATE: Duration = Duration::from_secs(1);

/// Replicas per node for [`crate::HashRing::numeric`].
pub const DEFAULT_RING_REPLICAS: usize = 3;

/// Replicas per node for the CRC-32 [`crate::HashRing`] default.
pub const DEFAULT_HASHED_RING_REPLICAS: usize = 32;

/// Virtual positions per node on a [`crate::VirtualNodeRing`].
pub const DEFAULT_VIRTUAL_NODE_COUNT: usize = 100;

/// Construction parameters shared by every lane of a
/// [`crate::WorkerPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Capacity of each lane's request queue.
    pub queue_capacity: usize,
    /// Ticker period used by [`crate::WorkerPool::create_workers`] when the
    /// caller asks for a ticker without naming a period.
    pub tick_period: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            tick_period: DEFAULT_TICK_PERIOD,
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub const fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    #[must_use]
    pub const fn with_tick_period(mut self, period: Duration) -> Self {
        self.tick_period = period;
        self
    }
}

/// Returns `value` unless it is zero, in which case `fallback`.
pub(crate) const fn or_default(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() { fallback } else { value }
}
