use anyhow::bail;
use clap::Parser;
use core::time::Duration;

/// Runtime configuration for the `lanepool-demo` binary.
///
/// Values come from CLI arguments or environment variables (a `.env` file is
/// loaded first), with defaults that finish a short run on a laptop.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "lanepool-demo",
    version,
    about = "Drives a sharded worker pool with simulated session traffic"
)]
pub struct CliArgs {
    /// Number of lanes in the pool.
    ///
    /// Environment variable: `LANES`
    #[arg(long, env = "LANES", default_value_t = 4)]
    pub lanes: usize,

    /// Capacity of each lane's request queue. Producers back off when a lane
    /// is full.
    ///
    /// Environment variable: `QUEUE_CAPACITY`
    #[arg(long, env = "QUEUE_CAPACITY", default_value_t = 1024)]
    pub queue_capacity: usize,

    /// Number of distinct session ids producers draw from.
    ///
    /// Environment variable: `SESSIONS`
    #[arg(long, env = "SESSIONS", default_value_t = 1000)]
    pub sessions: i64,

    /// Number of concurrent producer tasks.
    ///
    /// Environment variable: `PRODUCERS`
    #[arg(long, env = "PRODUCERS", default_value_t = 4)]
    pub producers: usize,

    /// Share of events that close their session, in `[0, 1]`.
    ///
    /// Environment variable: `CLOSE_RATIO`
    #[arg(long, env = "CLOSE_RATIO", default_value_t = 0.05)]
    pub close_ratio: f64,

    /// How long producers run, in seconds.
    ///
    /// Environment variable: `DURATION_SECS`
    #[arg(long, env = "DURATION_SECS", default_value_t = 5)]
    pub duration_secs: u64,

    /// Lane maintenance period, in milliseconds.
    ///
    /// Environment variable: `TICK_MS`
    #[arg(long, env = "TICK_MS", default_value_t = 500)]
    pub tick_ms: u64,

    /// Sessions untouched for this long are expired by maintenance, in
    /// milliseconds.
    ///
    /// Environment variable: `IDLE_TIMEOUT_MS`
    #[arg(long, env = "IDLE_TIMEOUT_MS", default_value_t = 2000)]
    pub idle_timeout_ms: u64,

    /// Regions sessions are spread over, comma separated.
    ///
    /// Environment variable: `REGIONS`
    #[arg(
        long,
        env = "REGIONS",
        value_delimiter = ',',
        default_value = "eu-west,us-east,ap-south"
    )]
    pub regions: Vec<String>,

    /// Seed for routing and producers. Random when unset.
    ///
    /// Environment variable: `SEED`
    #[arg(long, env = "SEED")]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct DemoConfig {
    pub lanes: usize,
    pub queue_capacity: usize,
    pub sessions: i64,
    pub producers: usize,
    pub close_ratio: f64,
    pub duration: Duration,
    pub tick_period: Duration,
    pub idle_timeout: Duration,
    pub regions: Vec<String>,
    pub seed: u64,
}

impl TryFrom<CliArgs> for DemoConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.lanes == 0 {
            bail!("LANES must be greater than 0");
        }
        if args.queue_capacity == 0 {
            bail!("QUEUE_CAPACITY must be greater than 0");
        }
        if args.sessions <= 0 {
            bail!("SESSIONS must be greater than 0");
        }
        if args.producers == 0 {
            bail!("PRODUCERS must be greater than 0");
        }
        if !(0.0..=1.0).contains(&args.close_ratio) {
            bail!("CLOSE_RATIO ({}) must be within [0, 1]", args.close_ratio);
        }
        if args.tick_ms == 0 {
            bail!("TICK_MS must be greater than 0");
        }

        let regions: Vec<String> = args
            .regions
            .into_iter()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect();
        if regions.is_empty() {
            bail!("REGIONS must name at least one region");
        }
        if let Some(dup) = regions
            .iter()
            .enumerate()
            .find_map(|(i, r)| regions[..i].contains(r).then_some(r))
        {
            bail!("REGIONS lists `{dup}` more than once");
        }

        Ok(Self {
            lanes: args.lanes,
            queue_capacity: args.queue_capacity,
            sessions: args.sessions,
            producers: args.producers,
            close_ratio: args.close_ratio,
            duration: Duration::from_secs(args.duration_secs),
            tick_period: Duration::from_millis(args.tick_ms),
            idle_timeout: Duration::from_millis(args.idle_timeout_ms),
            regions,
            seed: args.seed.unwrap_or_else(rand::random),
        })
    }
}
