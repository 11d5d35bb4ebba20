//! Thread-safe double-ended list with a paced background consumer.

use super::Consumer;
use crate::{DEFAULT_LIST_CONSUME_RATE, Error, Result, config::or_default, guard};
use core::time::Duration;
use parking_lot::Mutex;
use std::{
    collections::VecDeque,
    sync::{Arc, OnceLock},
};
use tokio::{task::JoinHandle, time::sleep};
use tokio_util::sync::CancellationToken;

struct State<T> {
    items: VecDeque<T>,
    closed: bool,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    consumer: OnceLock<Arc<dyn Consumer<T>>>,
}

impl<T> Shared<T> {
    fn pop_open(&self) -> Option<T> {
        let mut state = self.state.lock();
        if state.closed {
            return None;
        }
        state.items.pop_front()
    }

    fn deliver(&self, consumer: &dyn Consumer<T>, item: T) {
        if let Err(_e) = guard::invoke("list consumer", || consumer.consume(item)) {
            #[cfg(feature = "tracing")]
            tracing::warn!("List consumer failed: {_e}");
        }
    }
}

/// A double-ended list drained by an optional background consumer.
///
/// Producers [`push`](DrainingList::push) to the tail or
/// [`join`](DrainingList::join) at the head. Once
/// [`set_consumer`](DrainingList::set_consumer) is called, a Tokio task pops
/// items from the head and hands them to the consumer one at a time, pausing
/// for the configured rate whenever the list runs dry.
///
/// [`quit`](DrainingList::quit) closes the list. A graceful quit feeds every
/// remaining item to the consumer before returning; a forced quit discards
/// them.
pub struct DrainingList<T> {
    shared: Arc<Shared<T>>,
    shutdown: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<T> Default for DrainingList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DrainingList<T> {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    items: VecDeque::new(),
                    closed: false,
                }),
                consumer: OnceLock::new(),
            }),
            shutdown: CancellationToken::new(),
            handle: Mutex::new(None),
        }
    }

    /// Appends `value` at the tail.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyClosed`] after [`DrainingList::quit`].
    pub fn push(&self, value: T) -> Result<()> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(Error::AlreadyClosed);
        }
        state.items.push_back(value);
        Ok(())
    }

    /// Inserts `value` at the head, ahead of everything queued.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyClosed`] after [`DrainingList::quit`].
    pub fn join(&self, value: T) -> Result<()> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(Error::AlreadyClosed);
        }
        state.items.push_front(value);
        Ok(())
    }

    /// Removes and returns the head; `None` when empty or closed.
    pub fn pop(&self) -> Option<T> {
        self.shared.pop_open()
    }

    /// Removes and returns the tail; `None` when empty or closed.
    pub fn tail(&self) -> Option<T> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return None;
        }
        state.items.pop_back()
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Drops every queued item without consuming it.
    pub fn clear(&self) {
        let mut state = self.shared.state.lock();
        state.items.clear();
        state.items.shrink_to_fit();
    }
}

impl<T: Send + 'static> DrainingList<T> {
    /// Starts the background consumer.
    ///
    /// `rate` is how long the consumer sleeps when it finds the list empty; a
    /// zero rate selects [`DEFAULT_LIST_CONSUME_RATE`]. A list has at most one
    /// consumer: returns `false` (and changes nothing) if one is already set
    /// or the list is closed.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn set_consumer(&self, consumer: impl Consumer<T> + 'static, rate: Duration) -> bool {
        if self.is_closed() {
            return false;
        }

        let consumer: Arc<dyn Consumer<T>> = Arc::new(consumer);
        if self.shared.consumer.set(Arc::clone(&consumer)).is_err() {
            return false;
        }

        let handle = tokio::spawn(consume_loop(
            Arc::clone(&self.shared),
            consumer,
            or_default(rate, DEFAULT_LIST_CONSUME_RATE),
            self.shutdown.clone(),
        ));
        *self.handle.lock() = Some(handle);
        true
    }

    /// Closes the list and stops the consumer.
    ///
    /// With `force == false` every item still queued is handed to the
    /// consumer, in order, before this returns. With `force == true` they are
    /// discarded. Either way the list is empty afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyClosed`] if the list was already closed.
    pub async fn quit(&self, force: bool) -> Result<()> {
        {
            let mut state = self.shared.state.lock();
            if state.closed {
                return Err(Error::AlreadyClosed);
            }
            state.closed = true;
        }

        // Let the consumer finish the item it holds before draining the rest.
        self.shutdown.cancel();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(_e) = handle.await {
                #[cfg(feature = "tracing")]
                tracing::error!("List consumer terminated abnormally: {_e}");
            }
        }

        match self.shared.consumer.get() {
            Some(consumer) if !force => {
                let mut _drained = 0_usize;
                loop {
                    let item = self.shared.state.lock().items.pop_front();
                    let Some(item) = item else { break };
                    self.shared.deliver(consumer.as_ref(), item);
                    _drained += 1;
                }
                #[cfg(feature = "tracing")]
                tracing::debug!("List drained {_drained} items on quit");
            }
            _ => {
                let mut state = self.shared.state.lock();
                #[cfg(feature = "tracing")]
                {
                    if !state.items.is_empty() {
                        tracing::debug!("List discarded {} items on quit", state.items.len());
                    }
                }
                state.items.clear();
            }
        }
        Ok(())
    }
}

impl<T> Drop for DrainingList<T> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn consume_loop<T>(
    shared: Arc<Shared<T>>,
    consumer: Arc<dyn Consumer<T>>,
    rate: Duration,
    shutdown: CancellationToken,
) {
    #[cfg(feature = "tracing")]
    tracing::trace!("List consumer started ({rate:?})");

    while !shutdown.is_cancelled() {
        match shared.pop_open() {
            Some(item) => {
                shared.deliver(consumer.as_ref(), item);
                tokio::task::yield_now().await;
            }
            None => {
                tokio::select! {
                    biased;
                    () = shutdown.cancelled() => break,
                    () = sleep(rate) => {}
                }
            }
        }
    }

    #[cfg(feature = "tracing")]
    tracing::trace!("List consumer stopped");
}
