//! Console logging for the demo.
//!
//! Events from the binary and from `lanepool` (built with its `tracing`
//! feature) go to a pretty `fmt` layer. Verbosity follows `RUST_LOG` and
//! defaults to `info`; use `RUST_LOG=lanepool=trace` to follow lane
//! lifecycles.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_telemetry() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_thread_ids(true)
                .with_line_number(true)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                .with_file(true)
                .pretty(),
        )
        .try_init()?;
    Ok(())
}
