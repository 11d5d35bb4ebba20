use super::TickHandler;
use crate::{DEFAULT_TICK_PERIOD, Error, Result, config::or_default, guard};
use core::time::Duration;
use parking_lot::{Mutex, RwLock};
use std::sync::{
    Arc, OnceLock,
    atomic::{AtomicBool, Ordering},
};
use tokio::{task::JoinHandle, time::sleep};
use tokio_util::sync::CancellationToken;

struct Inner {
    period: Mutex<Duration>,
    checker: RwLock<Option<Arc<dyn TickHandler>>>,
    on_quit: OnceLock<Box<dyn Fn() + Send + Sync>>,
}

impl Inner {
    fn fire(&self) {
        // Clone out of the lock so a slow checker never blocks `set_checker`.
        let checker = self.checker.read().clone();
        if let Some(checker) = checker {
            if let Err(_e) = guard::invoke("ticker", || checker.on_tick()) {
                #[cfg(feature = "tracing")]
                tracing::warn!("Ticker checker failed: {_e}");
            }
        }
    }

    fn period(&self) -> Duration {
        *self.period.lock()
    }
}

/// Self-rescheduling periodic callback driver.
///
/// The ticker runs on its own Tokio task. It fires once right away, then
/// repeatedly sleeps for the current period and fires again. Because the
/// next sleep only starts once the checker has returned, checker calls never
/// overlap, however slow they are or however the period changes.
///
/// On [`Ticker::quit`] the checker runs exactly one more time (a final drain
/// call), followed by the quit callback.
pub struct Ticker {
    inner: Arc<Inner>,
    closed: AtomicBool,
    shutdown: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Ticker {
    /// Starts a ticker without a checker; ticks are no-ops until
    /// [`Ticker::set_checker`] is called.
    ///
    /// A zero `period` selects [`DEFAULT_TICK_PERIOD`].
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn new(period: Duration) -> Self {
        Self::start(period, None)
    }

    /// Starts a ticker whose first (immediate) tick already reaches
    /// `checker`.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn with_checker(period: Duration, checker: impl TickHandler) -> Self {
        Self::start(period, Some(Arc::new(checker) as Arc<dyn TickHandler>))
    }

    fn start(period: Duration, checker: Option<Arc<dyn TickHandler>>) -> Self {
        let inner = Arc::new(Inner {
            period: Mutex::new(or_default(period, DEFAULT_TICK_PERIOD)),
            checker: RwLock::new(checker),
            on_quit: OnceLock::new(),
        });
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(ticker_loop(Arc::clone(&inner), shutdown.clone()));

        Self {
            inner,
            closed: AtomicBool::new(false),
            shutdown,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Installs (or replaces) the checker invoked on every tick.
    pub fn set_checker(&self, checker: impl TickHandler) {
        *self.inner.checker.write() = Some(Arc::new(checker));
    }

    /// Registers a callback run once after the final tick. The first
    /// registration wins.
    pub fn set_quit_callback(&self, on_quit: impl Fn() + Send + Sync + 'static) -> bool {
        self.inner.on_quit.set(Box::new(on_quit)).is_ok()
    }

    /// Current period between the end of one tick and the start of the next.
    pub fn duration(&self) -> Duration {
        self.inner.period()
    }

    /// Changes the period, in seconds. Takes effect from the next sleep.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] unless `seconds` is finite and at
    /// least one nanosecond.
    pub fn update_duration(&self, seconds: f64) -> Result<()> {
        if !seconds.is_finite() || seconds <= 0.0 {
            return Err(Error::invalid(format!(
                "tick duration must be positive, got {seconds}"
            )));
        }
        let period = Duration::try_from_secs_f64(seconds)
            .map_err(|e| Error::invalid(format!("tick duration {seconds}: {e}")))?;
        if period.is_zero() {
            return Err(Error::invalid(format!(
                "tick duration {seconds} rounds down to zero"
            )));
        }
        *self.inner.period.lock() = period;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stops the ticker after one final checker call and waits for it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyClosed`] if the ticker was already stopped.
    pub async fn quit(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyClosed);
        }

        self.shutdown.cancel();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(_e) = handle.await {
                #[cfg(feature = "tracing")]
                tracing::error!("Ticker task terminated abnormally: {_e}");
            }
        }
        Ok(())
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        // An abandoned ticker still gets its final tick.
        self.shutdown.cancel();
    }
}

async fn ticker_loop(inner: Arc<Inner>, shutdown: CancellationToken) {
    #[cfg(feature = "tracing")]
    tracing::trace!("Ticker started ({:?})", inner.period());

    while !shutdown.is_cancelled() {
        inner.fire();

        let period = inner.period();
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            () = sleep(period) => {}
        }
    }

    inner.fire();
    if let Some(on_quit) = inner.on_quit.get() {
        let _ = guard::invoke("ticker quit", || {
            on_quit();
            Ok(())
        });
    }

    #[cfg(feature = "tracing")]
    tracing::trace!("Ticker stopped");
}
