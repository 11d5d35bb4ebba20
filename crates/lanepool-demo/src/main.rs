#![doc = include_str!("../README.md")]

mod config;
mod session;
mod telemetry;

use clap::Parser;
use config::{CliArgs, DemoConfig};
use lanepool::{DrainingList, Error, ObjectId, PoolConfig, VirtualNodeRing, WorkerPool};
use rand::{Rng, SeedableRng, rngs::StdRng};
use session::{AuditRecord, SessionEvent, SessionHandler};
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use std::time::{Duration, Instant};
use telemetry::init_telemetry;
use tokio::{signal, task::JoinHandle};
use tokio_util::sync::CancellationToken;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Idle pause of the audit consumer.
const AUDIT_RATE: Duration = Duration::from_millis(50);

type Pool = WorkerPool<SessionHandler>;

#[derive(Debug, Default)]
struct ProducerStats {
    sent: u64,
    rejected: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = DemoConfig::try_from(args)?;

    init_telemetry()?;
    log_startup_info(&config);

    let audited = Arc::new(AtomicU64::new(0));
    let audit = Arc::new(DrainingList::new());
    audit.set_consumer(
        {
            let audited = Arc::clone(&audited);
            move |record: AuditRecord| -> lanepool::Result<()> {
                tracing::trace!("{record}");
                audited.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
        },
        AUDIT_RATE,
    );

    let regions = VirtualNodeRing::new();
    for region in &config.regions {
        regions.add(region)?;
    }

    let pool_config = PoolConfig::default()
        .with_queue_capacity(config.queue_capacity)
        .with_tick_period(config.tick_period);
    let handler = SessionHandler::new(regions, Arc::clone(&audit), config.idle_timeout);
    let pool = Arc::new(WorkerPool::with_seed(handler, pool_config, config.seed));
    // A zero period picks up the configured tick period.
    pool.create_workers(config.lanes, Some(Duration::ZERO))?;

    let shutdown = CancellationToken::new();
    let producers: Vec<JoinHandle<ProducerStats>> = (0..config.producers)
        .map(|i| {
            tokio::spawn(produce(
                Arc::clone(&pool),
                config.clone(),
                config.seed.wrapping_add(i as u64 + 1),
                shutdown.clone(),
            ))
        })
        .collect();

    let started = Instant::now();
    tokio::select! {
        () = tokio::time::sleep(config.duration) => {
            tracing::info!("Run finished after {:?}", config.duration);
        },
        res = signal::ctrl_c() => {
            match res {
                Ok(()) => tracing::info!("Received Ctrl+C signal"),
                Err(e) => tracing::error!("Failed to listen for Ctrl+C: {e}"),
            }
        },
    }
    shutdown.cancel();

    let mut totals = ProducerStats::default();
    for producer in producers {
        match producer.await {
            Ok(stats) => {
                totals.sent += stats.sent;
                totals.rejected += stats.rejected;
            }
            Err(e) => tracing::error!("Producer task failed: {e}"),
        }
    }
    let elapsed = started.elapsed();

    let open: usize = pool
        .worker_ids()
        .into_iter()
        .filter_map(|lane| pool.get_worker(lane).ok())
        .map(|lane| lane.objects().len())
        .sum();

    tracing::info!("Shutdown signal received, terminating gracefully...");
    pool.quit().await?;
    audit.quit(false).await?;

    let stats = pool.handler().stats();
    tracing::info!(
        "Sent {} events in {:.2?} ({:.0}/s), {} rejected by full lanes",
        totals.sent,
        elapsed,
        totals.sent as f64 / elapsed.as_secs_f64().max(f64::EPSILON),
        totals.rejected
    );
    tracing::info!(
        "Sessions: {} opened, {} closed, {} expired, {} open at shutdown; {} maintenance ticks; {} audit records",
        stats.opened.load(Ordering::Relaxed),
        stats.closed.load(Ordering::Relaxed),
        stats.expired.load(Ordering::Relaxed),
        open,
        stats.ticks.load(Ordering::Relaxed),
        audited.load(Ordering::Relaxed)
    );
    Ok(())
}

/// Sends random session events until `shutdown` fires.
async fn produce(
    pool: Arc<Pool>,
    config: DemoConfig,
    seed: u64,
    shutdown: CancellationToken,
) -> ProducerStats {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut stats = ProducerStats::default();

    while !shutdown.is_cancelled() {
        let session: ObjectId = rng.random_range(1..=config.sessions);
        let event = if rng.random_bool(config.close_ratio) {
            SessionEvent::Close
        } else {
            SessionEvent::Touch
        };

        match pool.send_data((session, event), &[session], false).await {
            Ok(replies) => match replies.get(&session) {
                Some(Err(Error::QueueFull { .. })) => {
                    stats.rejected += 1;
                    // Let the lane catch up.
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
                Some(Err(e)) => tracing::warn!("Event for session {session} failed: {e}"),
                _ => stats.sent += 1,
            },
            Err(e) => {
                tracing::error!("Producer stopped: {e}");
                break;
            }
        }
        tokio::task::yield_now().await;
    }
    stats
}

fn log_startup_info(config: &DemoConfig) {
    if cfg!(debug_assertions) {
        tracing::info!("Starting session demo with full config: {:#?}", config);
    } else {
        tracing::info!(
            "Starting session demo with {} lanes and {} producers",
            config.lanes,
            config.producers
        );
    }
}
