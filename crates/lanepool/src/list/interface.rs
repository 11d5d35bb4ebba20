use crate::Result;

/// Per-item callback of a [`crate::DrainingList`] consumer.
///
/// Any closure `Fn(T) -> Result<()>` is a consumer.
pub trait Consumer<T>: Send + Sync {
    fn consume(&self, item: T) -> Result<()>;
}

impl<T, F> Consumer<T> for F
where
    F: Fn(T) -> Result<()> + Send + Sync,
{
    fn consume(&self, item: T) -> Result<()> {
        self(item)
    }
}
