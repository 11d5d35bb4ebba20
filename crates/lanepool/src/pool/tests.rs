use crate::{BoundObjects, Error, LaneHandler, LaneId, ObjectId, PoolConfig, Result, WorkerPool};
use core::time::Duration;
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::atomic::{AtomicUsize, Ordering},
};

#[derive(Clone, Debug)]
enum Cmd {
    /// Replies with the lane id.
    Echo,
    /// Appends a value to the object's history.
    Append(ObjectId, u32),
    /// Blocks the lane for a while.
    Sleep(u64),
    Panic,
}

#[derive(Default)]
struct Recorder {
    ticks: Mutex<HashMap<LaneId, usize>>,
    seen_on_tick: Mutex<Vec<usize>>,
    casts: Mutex<HashMap<LaneId, usize>>,
    quits: Mutex<Vec<LaneId>>,
    running: AtomicUsize,
    overlaps: AtomicUsize,
}

impl Recorder {
    fn enter(&self) {
        if self.running.fetch_add(1, Ordering::SeqCst) > 0 {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn exit(&self) {
        self.running.fetch_sub(1, Ordering::SeqCst);
    }

    fn ticks(&self, lane: LaneId) -> usize {
        self.ticks.lock().get(&lane).copied().unwrap_or_default()
    }
}

impl LaneHandler for Recorder {
    type Request = Cmd;
    type Response = LaneId;
    type Object = Vec<u32>;

    fn process(&self, lane: LaneId, objects: &BoundObjects<Vec<u32>>, cmd: Cmd) -> Result<LaneId> {
        self.enter();
        let res = match cmd {
            Cmd::Echo => {
                *self.casts.lock().entry(lane).or_default() += 1;
                Ok(lane)
            }
            Cmd::Append(object, value) => {
                objects.with_mut(|map| map.entry(object).or_default().push(value));
                Ok(lane)
            }
            Cmd::Sleep(ms) => {
                std::thread::sleep(Duration::from_millis(ms));
                Ok(lane)
            }
            Cmd::Panic => {
                self.exit();
                panic!("lane {lane} exploded");
            }
        };
        self.exit();
        res
    }

    fn on_tick(&self, lane: LaneId, objects: &BoundObjects<Vec<u32>>) -> Result<()> {
        self.enter();
        *self.ticks.lock().entry(lane).or_default() += 1;
        self.seen_on_tick.lock().push(objects.len());
        self.exit();
        Ok(())
    }

    fn on_quit(&self, lane: LaneId) {
        self.quits.lock().push(lane);
    }
}

fn pool() -> WorkerPool<Recorder> {
    WorkerPool::with_seed(Recorder::default(), PoolConfig::default(), 7)
}

async fn wait_until(mut done: impl FnMut() -> bool) {
    for _ in 0..500 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn lanes_are_numbered_from_one() {
    let pool = pool();
    assert_eq!(pool.create_workers(3, None).unwrap(), vec![1, 2, 3]);
    assert_eq!(pool.create_workers(2, None).unwrap(), vec![4, 5]);
    assert_eq!(pool.worker_count(), 5);
    assert_eq!(pool.worker_ids(), vec![1, 2, 3, 4, 5]);
    pool.quit().await.unwrap();
}

#[tokio::test]
async fn empty_pool_has_no_workers() {
    let pool = pool();
    assert!(matches!(pool.get_target_worker(1, true), Err(Error::NoWorkers)));
    assert!(matches!(pool.get_target_worker(0, false), Err(Error::NoWorkers)));
    assert_eq!(pool.send_data(Cmd::Echo, &[1], true).await.err(), Some(Error::NoWorkers));
    assert_eq!(pool.cast_data(Cmd::Echo), Err(Error::NoWorkers));
}

#[tokio::test]
async fn rejects_bad_arguments() {
    let pool = pool();
    assert!(matches!(pool.create_workers(0, None), Err(Error::InvalidArgument { .. })));

    pool.create_workers(2, None).unwrap();
    assert!(matches!(
        pool.send_data(Cmd::Echo, &[], true).await,
        Err(Error::InvalidArgument { .. })
    ));
    assert!(matches!(pool.get_worker(9), Err(Error::NoSuchWorker { lane: 9 })));
    assert!(matches!(
        pool.send_to_worker(9, Cmd::Echo, true).await,
        Err(Error::NoSuchWorker { lane: 9 })
    ));
    assert!(matches!(
        pool.update_bound_object(0, vec![]),
        Err(Error::InvalidArgument { .. })
    ));
    pool.quit().await.unwrap();
}

#[tokio::test]
async fn affinity_pins_objects_to_a_lane() {
    let pool = pool();
    pool.create_workers(4, None).unwrap();

    let first: Vec<LaneId> = (1..=200)
        .map(|id| pool.get_target_worker(id, true).unwrap().id())
        .collect();
    assert!(first.iter().all(|lane| (1..=4).contains(lane)));

    // Growing the pool changes the hash modulus but not remembered routes.
    pool.create_workers(3, None).unwrap();
    for (id, lane) in (1..=200).zip(&first) {
        assert_eq!(pool.get_target_worker(id, true).unwrap().id(), *lane);
    }
    pool.quit().await.unwrap();
}

#[tokio::test]
async fn routing_without_affinity_is_stable_for_a_fixed_pool() {
    let pool = pool();
    pool.create_workers(5, None).unwrap();
    for id in 1..=100 {
        let a = pool.get_target_worker(id, false).unwrap().id();
        let b = pool.get_target_worker(id, false).unwrap().id();
        assert_eq!(a, b);
        assert!((1..=5).contains(&a));
    }
    pool.quit().await.unwrap();
}

#[tokio::test]
async fn seeded_pools_pick_the_same_random_lanes() {
    let a = pool();
    let b = pool();
    a.create_workers(8, None).unwrap();
    b.create_workers(8, None).unwrap();

    let picks = |pool: &WorkerPool<Recorder>| -> Vec<LaneId> {
        (0..50)
            .map(|_| pool.get_target_worker(0, false).unwrap().id())
            .collect()
    };
    let picked = picks(&a);
    assert_eq!(picked, picks(&b));
    assert!(picked.iter().all(|lane| (1..=8).contains(lane)));

    a.quit().await.unwrap();
    b.quit().await.unwrap();
}

#[tokio::test]
async fn send_data_answers_per_object() {
    let pool = pool();
    pool.create_workers(4, None).unwrap();

    let ids = [3, 17, 42, 99, 1024];
    let replies = pool.send_data(Cmd::Echo, &ids, true).await.unwrap();
    assert_eq!(replies.len(), ids.len());
    for id in ids {
        let lane = pool.get_target_worker(id, true).unwrap().id();
        assert_eq!(replies[&id], Ok(Some(lane)));
    }

    let replies = pool.send_data(Cmd::Echo, &ids, false).await.unwrap();
    assert!(replies.values().all(|r| *r == Ok(None)));
    pool.quit().await.unwrap();
}

#[tokio::test]
async fn one_objects_requests_run_in_order() {
    let pool = pool();
    pool.create_workers(4, None).unwrap();

    for i in 0..99 {
        pool.send_data(Cmd::Append(7, i), &[7], false).await.unwrap();
    }
    // The lane is FIFO, so the last reply means everything before it ran.
    let last = pool.send_data(Cmd::Append(7, 99), &[7], true).await.unwrap();
    assert!(last[&7].is_ok());

    assert_eq!(pool.get_bound_object(7).unwrap(), (0..100).collect::<Vec<u32>>());
    pool.quit().await.unwrap();
}

#[tokio::test]
async fn cast_reaches_every_lane() {
    let pool = pool();
    pool.create_workers(4, None).unwrap();

    assert_eq!(pool.cast_data(Cmd::Echo).unwrap(), 4);
    pool.quit().await.unwrap();

    let casts = pool.handler().casts.lock().clone();
    assert_eq!(casts, (1..=4).map(|lane| (lane, 1)).collect::<HashMap<_, _>>());
}

#[tokio::test]
async fn bound_objects_follow_their_lane() {
    let pool = pool();
    pool.create_workers(3, None).unwrap();

    pool.update_bound_object(11, vec![1, 2]).unwrap();
    assert_eq!(pool.get_bound_object(11).unwrap(), vec![1, 2]);

    let owner = pool.get_target_worker(11, true).unwrap().id();
    let all = pool.get_all_bound_objects(owner).unwrap();
    assert_eq!(all.get(&11), Some(&vec![1, 2]));
    assert_eq!(pool.get_worker(owner).unwrap().objects().ids(), vec![11]);
    for lane in pool.worker_ids().into_iter().filter(|l| *l != owner) {
        assert!(pool.get_all_bound_objects(lane).unwrap().is_empty());
    }

    assert_eq!(pool.remove_bound_object(11).unwrap(), Some(vec![1, 2]));
    assert_eq!(pool.get_bound_object(11), Err(Error::NoSuchObject { object: 11 }));
    assert_eq!(pool.remove_bound_object(11).unwrap(), None);
    pool.quit().await.unwrap();
}

#[tokio::test]
async fn removing_an_object_forgets_its_route() {
    let pool = pool();
    pool.create_workers(2, None).unwrap();

    // Find an object whose lane would change once the pool grows.
    let mut moved = None;
    for id in 1..1_000 {
        let pinned = pool.get_target_worker(id, true).unwrap().id();
        let (count, next) = (2, 5);
        let before = (crc32fast::hash(&id.to_le_bytes()) % count) as LaneId + 1;
        let after = (crc32fast::hash(&id.to_le_bytes()) % next) as LaneId + 1;
        assert_eq!(pinned, before);
        if before != after {
            moved = Some((id, before, after));
            break;
        }
    }
    let (id, before, after) = moved.unwrap();

    pool.update_bound_object(id, vec![9]).unwrap();
    pool.create_workers(3, None).unwrap();
    assert_eq!(pool.get_target_worker(id, true).unwrap().id(), before);

    pool.remove_bound_object(id).unwrap();
    assert_eq!(pool.get_target_worker(id, true).unwrap().id(), after);
    pool.quit().await.unwrap();
}

#[tokio::test]
async fn handler_panics_are_contained() {
    let pool = pool();
    pool.create_workers(2, None).unwrap();

    let lane = pool.send_to_worker(1, Cmd::Panic, true).await;
    assert!(matches!(lane, Err(Error::Internal { .. })));

    // The same lane keeps serving.
    assert_eq!(pool.send_to_worker(1, Cmd::Echo, true).await, Ok(Some(1)));
    pool.quit().await.unwrap();
}

#[tokio::test]
async fn ticks_run_on_the_lane_with_its_objects() {
    let pool = pool();
    pool.create_workers(2, Some(Duration::from_millis(10))).unwrap();
    pool.update_bound_object(5, vec![]).unwrap();

    let handler = pool.handler().clone();
    wait_until(|| handler.ticks(1) >= 3 && handler.ticks(2) >= 3).await;
    wait_until(|| handler.seen_on_tick.lock().contains(&1)).await;

    let owner = pool.get_target_worker(5, true).unwrap();
    assert!(owner.has_ticker());
    assert_eq!(owner.tick_duration(), Some(Duration::from_millis(10)));
    pool.quit().await.unwrap();
}

#[tokio::test]
async fn zero_tick_period_uses_the_configured_default() {
    let config = PoolConfig::default().with_tick_period(Duration::from_millis(250));
    let pool = WorkerPool::with_config(Recorder::default(), config);
    pool.create_workers(1, Some(Duration::ZERO)).unwrap();
    pool.create_workers(1, None).unwrap();

    let ticking = pool.get_worker(1).unwrap();
    assert_eq!(ticking.tick_duration(), Some(Duration::from_millis(250)));
    ticking.update_tick_duration(0.5).unwrap();
    assert_eq!(ticking.tick_duration(), Some(Duration::from_millis(500)));

    let quiet = pool.get_worker(2).unwrap();
    assert!(!quiet.has_ticker());
    assert!(matches!(
        quiet.update_tick_duration(1.0),
        Err(Error::Unconfigured { .. })
    ));
    pool.quit().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn ticks_never_overlap_requests() {
    let pool = pool();
    pool.create_workers(1, Some(Duration::from_millis(1))).unwrap();

    for _ in 0..20 {
        pool.send_to_worker(1, Cmd::Sleep(3), true).await.unwrap();
    }
    pool.quit().await.unwrap();

    let handler = pool.handler();
    assert!(handler.ticks(1) > 0);
    assert_eq!(handler.overlaps.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn quit_runs_a_final_tick_and_quit_callbacks() {
    let pool = pool();
    pool.create_workers(3, Some(Duration::from_secs(3600))).unwrap();

    let handler = pool.handler().clone();
    wait_until(|| (1..=3).all(|lane| handler.ticks(lane) == 1)).await;

    pool.quit().await.unwrap();
    for lane in 1..=3 {
        assert_eq!(handler.ticks(lane), 2);
    }
    let mut quits = handler.quits.lock().clone();
    quits.sort_unstable();
    assert_eq!(quits, vec![1, 2, 3]);
}

#[tokio::test]
async fn quit_drains_and_allows_a_fresh_start() {
    let pool = pool();
    pool.create_workers(2, None).unwrap();

    let ids: Vec<ObjectId> = (1..=50).collect();
    for i in 0..10 {
        pool.send_data(Cmd::Append(1, i), &[1], false).await.unwrap();
    }
    let lane = pool.get_target_worker(1, true).unwrap();
    pool.send_data(Cmd::Echo, &ids, false).await.unwrap();

    pool.quit().await.unwrap();
    assert_eq!(lane.objects().get(1).unwrap().len(), 10);
    assert!(lane.is_closed());
    assert_eq!(pool.worker_count(), 0);
    assert!(matches!(pool.get_target_worker(1, true), Err(Error::NoWorkers)));
    assert_eq!(lane.push(Cmd::Echo), Err(Error::AlreadyClosed));

    let casts: usize = pool.handler().casts.lock().values().sum();
    assert_eq!(casts, ids.len());

    assert_eq!(pool.create_workers(2, None).unwrap(), vec![1, 2]);
    assert!(pool.get_bound_object(1).is_err());
    pool.quit().await.unwrap();
}

#[tokio::test]
async fn full_lane_reports_backpressure() {
    let config = PoolConfig::default().with_queue_capacity(2);
    let pool = WorkerPool::with_config(Recorder::default(), config);
    pool.create_workers(1, None).unwrap();

    // Current-thread runtime: the lane cannot drain until this task yields.
    let mut rejected = 0;
    for _ in 0..5 {
        if pool.send_to_worker(1, Cmd::Echo, false).await == Err(Error::QueueFull { capacity: 2 }) {
            rejected += 1;
        }
    }
    assert_eq!(rejected, 3);
    assert_eq!(pool.get_worker(1).unwrap().pending(), 2);
    pool.quit().await.unwrap();
}

#[tokio::test]
async fn oversized_queue_capacity_is_rejected() {
    let config = PoolConfig::default().with_queue_capacity(usize::MAX);
    let pool = WorkerPool::with_config(Recorder::default(), config);
    assert_eq!(pool.config().queue_capacity, usize::MAX);

    assert!(matches!(pool.create_workers(1, None), Err(Error::InvalidArgument { .. })));
    assert_eq!(pool.worker_count(), 0);

    let config = config.with_queue_capacity(crate::MAX_QUEUE_CAPACITY);
    let pool = WorkerPool::with_config(Recorder::default(), config);
    assert_eq!(pool.create_workers(1, None).unwrap(), vec![1]);
    pool.quit().await.unwrap();
}
