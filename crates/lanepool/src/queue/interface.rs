use crate::Result;

/// Request handler invoked by a [`crate::Queue`] for every payload it pops.
///
/// Implementations run on the queue's background task, one payload at a
/// time and in submission order. They should return quickly: a processor that
/// blocks stalls every request behind it and delays [`crate::Queue::quit`].
///
/// Any closure `Fn(T) -> Result<R>` is a processor.
///
/// # Example
/// ```
/// use lanepool::{Processor, Result};
///
/// struct Doubler;
/// impl Processor<u32, u32> for Doubler {
///     fn process(&self, payload: u32) -> Result<u32> {
///         Ok(payload * 2)
///     }
/// }
///
/// assert_eq!(Doubler.process(21), Ok(42));
/// ```
pub trait Processor<T, R>: Send + Sync {
    /// Handles one payload and produces the reply delivered to a waiting
    /// caller (if any).
    fn process(&self, payload: T) -> Result<R>;
}

impl<T, R, F> Processor<T, R> for F
where
    F: Fn(T) -> Result<R> + Send + Sync,
{
    fn process(&self, payload: T) -> Result<R> {
        self(payload)
    }
}
