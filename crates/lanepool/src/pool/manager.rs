//! Sharded pool of single-threaded lanes.
//!
//! [`WorkerPool`] owns a set of [`Lane`]s, each with its own queue, bound
//! object table and optional ticker. Requests carrying an [`ObjectId`] are
//! routed by hashing the id over the current lane count, and with affinity
//! the chosen lane is remembered so an object keeps its lane even after the
//! pool grows. Requests without an object go to a random lane.
//!
//! The routing state lives behind one short-lived lock that is never held
//! across an `.await` or a handler call.

use super::{Lane, LaneHandler, LaneId, ObjectId};
use crate::{Error, MAX_QUEUE_CAPACITY, PoolConfig, Result, config::or_default, crc32};
use core::time::Duration;
use rand::{Rng, SeedableRng, rngs::StdRng};
use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicI32, Ordering},
    },
};

struct PoolState<H: LaneHandler> {
    lanes: HashMap<LaneId, Arc<Lane<H>>>,
    /// Object to lane assignments made with affinity.
    routes: HashMap<ObjectId, LaneId>,
    rng: StdRng,
}

/// A pool of [`Lane`]s sharing one [`LaneHandler`].
///
/// # Example
/// ```
/// use lanepool::{BoundObjects, LaneHandler, LaneId, Result, WorkerPool};
///
/// struct Counter;
///
/// impl LaneHandler for Counter {
///     type Request = u64;
///     type Response = u64;
///     type Object = u64;
///
///     fn process(&self, _lane: LaneId, objects: &BoundObjects<u64>, add: u64) -> Result<u64> {
///         objects.with_mut(|map| {
///             let total = map.entry(1).or_default();
///             *total += add;
///             Ok(*total)
///         })
///     }
/// }
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let pool = WorkerPool::new(Counter);
/// pool.create_workers(4, None).unwrap();
///
/// let replies = pool.send_data(5, &[1], true).await.unwrap();
/// assert_eq!(replies[&1], Ok(Some(5)));
///
/// pool.quit().await.unwrap();
/// # });
/// ```
pub struct WorkerPool<H: LaneHandler> {
    handler: Arc<H>,
    config: PoolConfig,
    /// Highest lane id handed out; lanes are numbered `1..=lane_count`.
    lane_count: AtomicI32,
    state: parking_lot::Mutex<PoolState<H>>,
}

/// Lane owning `object` when the pool has `count` lanes.
fn hash_route(object: ObjectId, count: LaneId) -> LaneId {
    // `count` is positive, so both casts are lossless.
    (crc32(&object.to_le_bytes()) % count as u32) as LaneId + 1
}

impl<H: LaneHandler> WorkerPool<H> {
    /// Creates an empty pool with [`PoolConfig::default`].
    pub fn new(handler: H) -> Self {
        Self::with_config(handler, PoolConfig::default())
    }

    pub fn with_config(handler: H, config: PoolConfig) -> Self {
        Self::with_seed(handler, config, rand::random())
    }

    /// Like [`WorkerPool::with_config`], with a fixed seed for the generator
    /// that places requests without an object id.
    pub fn with_seed(handler: H, config: PoolConfig, seed: u64) -> Self {
        Self {
            handler: Arc::new(handler),
            config,
            lane_count: AtomicI32::new(0),
            state: parking_lot::Mutex::new(PoolState {
                lanes: HashMap::new(),
                routes: HashMap::new(),
                rng: StdRng::seed_from_u64(seed),
            }),
        }
    }

    pub fn handler(&self) -> &Arc<H> {
        &self.handler
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Adds `count` lanes and returns their ids.
    ///
    /// With `Some(period)` each new lane gets a ticker calling
    /// [`LaneHandler::on_tick`]; a zero period selects
    /// [`PoolConfig::tick_period`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `count` is zero, the lane ids
    /// would overflow, or the configured queue capacity is above
    /// [`MAX_QUEUE_CAPACITY`].
    pub fn create_workers(
        &self,
        count: usize,
        tick_period: Option<Duration>,
    ) -> Result<Vec<LaneId>> {
        if count == 0 {
            return Err(Error::invalid("worker count must be positive"));
        }
        if self.config.queue_capacity > MAX_QUEUE_CAPACITY {
            return Err(Error::invalid(format!(
                "queue capacity {} exceeds {MAX_QUEUE_CAPACITY}",
                self.config.queue_capacity
            )));
        }
        let tick_period = tick_period.map(|p| or_default(p, self.config.tick_period));

        let mut state = self.state.lock();
        let first = self.lane_count.load(Ordering::Acquire);
        let added = LaneId::try_from(count)
            .ok()
            .filter(|n| first.checked_add(*n).is_some())
            .ok_or_else(|| Error::invalid(format!("cannot add {count} workers")))?;

        let mut ids = Vec::with_capacity(count);
        for id in first + 1..=first + added {
            let lane = Lane::new(
                id,
                Arc::clone(&self.handler),
                self.config.queue_capacity,
                tick_period,
            );
            state.lanes.insert(id, Arc::new(lane));
            ids.push(id);
        }
        self.lane_count.store(first + added, Ordering::Release);

        #[cfg(feature = "tracing")]
        tracing::debug!("Created {added} workers ({} total)", first + added);

        Ok(ids)
    }

    /// Number of live lanes.
    pub fn worker_count(&self) -> usize {
        self.state.lock().lanes.len()
    }

    /// Ids of the live lanes, ascending.
    pub fn worker_ids(&self) -> Vec<LaneId> {
        let mut ids: Vec<LaneId> = self.state.lock().lanes.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Looks up a lane by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchWorker`] if no live lane has this id.
    pub fn get_worker(&self, lane: LaneId) -> Result<Arc<Lane<H>>> {
        self.state
            .lock()
            .lanes
            .get(&lane)
            .cloned()
            .ok_or(Error::NoSuchWorker { lane })
    }

    /// Picks the lane for `object`.
    ///
    /// - `object <= 0`: a random lane.
    /// - with `affinity`: the lane already assigned to `object`, or a newly
    ///   hashed one which is then remembered.
    /// - without `affinity`: the hashed lane for the current lane count,
    ///   recomputed on every call.
    ///
    /// # Errors
    ///
    /// - [`Error::NoWorkers`] if the pool is empty.
    /// - [`Error::NoSuchWorker`] if the chosen lane is not live.
    pub fn get_target_worker(&self, object: ObjectId, affinity: bool) -> Result<Arc<Lane<H>>> {
        let mut state = self.state.lock();
        let count = self.lane_count.load(Ordering::Acquire);
        if count <= 0 || state.lanes.is_empty() {
            return Err(Error::NoWorkers);
        }

        let lane = if object <= 0 {
            state.rng.random_range(1..=count)
        } else if affinity {
            match state.routes.get(&object) {
                Some(&lane) => lane,
                None => {
                    let lane = hash_route(object, count);
                    state.routes.insert(object, lane);
                    lane
                }
            }
        } else {
            hash_route(object, count)
        };

        state
            .lanes
            .get(&lane)
            .cloned()
            .ok_or(Error::NoSuchWorker { lane })
    }

    /// Sends a request straight to one lane.
    ///
    /// # Errors
    ///
    /// [`Error::NoSuchWorker`], or whatever [`Lane::send`] reports.
    pub async fn send_to_worker(
        &self,
        lane: LaneId,
        request: H::Request,
        wants_reply: bool,
    ) -> Result<Option<H::Response>> {
        self.get_worker(lane)?.send(request, wants_reply).await
    }

    pub fn get_bound_object(&self, object: ObjectId) -> Result<H::Object>
    where
        H::Object: Clone,
    {
        self.owner(object)?.objects().get(object)
    }

    /// Binds `value` to `object` on the object's lane.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `object <= 0`.
    /// - [`Error::NoWorkers`] if the pool is empty.
    pub fn update_bound_object(&self, object: ObjectId, value: H::Object) -> Result<()> {
        self.owner(object)?.objects().update(object, value)
    }

    /// Unbinds `object` and forgets its lane assignment.
    ///
    /// # Errors
    ///
    /// See [`WorkerPool::update_bound_object`].
    pub fn remove_bound_object(&self, object: ObjectId) -> Result<Option<H::Object>> {
        let removed = self.owner(object)?.objects().remove(object)?;
        self.state.lock().routes.remove(&object);
        Ok(removed)
    }

    /// Copies every object bound to `lane`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchWorker`] if `lane` is not live.
    pub fn get_all_bound_objects(&self, lane: LaneId) -> Result<HashMap<ObjectId, H::Object>>
    where
        H::Object: Clone,
    {
        Ok(self.get_worker(lane)?.objects().snapshot())
    }

    fn owner(&self, object: ObjectId) -> Result<Arc<Lane<H>>> {
        if object <= 0 {
            return Err(Error::invalid(format!(
                "object id must be positive, got {object}"
            )));
        }
        self.get_target_worker(object, true)
    }

    /// Stops every lane and empties the pool.
    ///
    /// The pool forgets its lanes and routes first, so new calls see an empty
    /// pool right away. Each lane then stops its ticker, drains its queue and
    /// runs [`LaneHandler::on_quit`]. Lane ids restart at 1 if workers are
    /// created again.
    pub async fn quit(&self) -> Result<()> {
        let lanes: Vec<Arc<Lane<H>>> = {
            let mut state = self.state.lock();
            state.routes.clear();
            self.lane_count.store(0, Ordering::Release);
            state.lanes.drain().map(|(_, lane)| lane).collect()
        };

        #[cfg(feature = "tracing")]
        tracing::info!("Stopping {} workers", lanes.len());

        let stops = lanes.iter().map(|lane| async move {
            if let Err(_e) = lane.quit().await {
                #[cfg(feature = "tracing")]
                tracing::warn!("Worker {} did not stop cleanly: {_e}", lane.id());
            }
        });
        futures::future::join_all(stops).await;

        #[cfg(feature = "tracing")]
        tracing::info!("Worker pool shutdown complete");

        Ok(())
    }
}

impl<H> WorkerPool<H>
where
    H: LaneHandler,
    H::Request: Clone,
{
    /// Sends `request` on behalf of each object in `objects`, each to the
    /// object's lane (with affinity). Lanes work concurrently; requests to
    /// the same lane keep the order of `objects`.
    ///
    /// Every id gets its own entry in the result, so one full queue or
    /// failing handler does not hide the other replies.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `objects` is empty.
    /// - [`Error::NoWorkers`] if the pool is empty.
    pub async fn send_data(
        &self,
        request: H::Request,
        objects: &[ObjectId],
        wants_reply: bool,
    ) -> Result<HashMap<ObjectId, Result<Option<H::Response>>>> {
        if objects.is_empty() {
            return Err(Error::invalid("object id list must not be empty"));
        }
        if self.worker_count() == 0 {
            return Err(Error::NoWorkers);
        }

        let replies = objects.iter().map(|&object| {
            let target = self.get_target_worker(object, true);
            let request = request.clone();
            async move {
                let reply = match target {
                    Ok(lane) => lane.send(request, wants_reply).await,
                    Err(e) => Err(e),
                };
                (object, reply)
            }
        });
        Ok(futures::future::join_all(replies).await.into_iter().collect())
    }

    /// Pushes `request` to every lane without waiting, and returns how many
    /// lanes accepted it.
    pub fn cast_data(&self, request: H::Request) -> Result<usize> {
        let lanes: Vec<Arc<Lane<H>>> = self.state.lock().lanes.values().cloned().collect();
        if lanes.is_empty() {
            return Err(Error::NoWorkers);
        }

        let mut accepted = 0;
        for lane in &lanes {
            match lane.push(request.clone()) {
                Ok(()) => accepted += 1,
                Err(_e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("Worker {} rejected broadcast: {_e}", lane.id());
                }
            }
        }
        Ok(accepted)
    }
}
