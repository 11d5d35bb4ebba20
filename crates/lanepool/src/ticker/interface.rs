use crate::Result;

/// Periodic callback driven by a [`crate::Ticker`].
///
/// A ticker never runs two `on_tick` calls at once: the next tick is only
/// scheduled after the current call returns. Errors are logged and do not stop
/// the ticker.
///
/// Any closure `Fn() -> Result<()>` is a tick handler; arguments the
/// callback needs are captured by the closure.
pub trait TickHandler: Send + Sync + 'static {
    fn on_tick(&self) -> Result<()>;
}

impl<F> TickHandler for F
where
    F: Fn() -> Result<()> + Send + Sync + 'static,
{
    fn on_tick(&self) -> Result<()> {
        self()
    }
}
