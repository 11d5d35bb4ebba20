//! Bounded single-consumer request queue.
//!
//! A [`Queue`] owns one background Tokio task (the consumer) fed by a bounded
//! [`mpsc`] channel. Any number of producers may clone the handle and submit
//! payloads; each payload is handed to the registered [`Processor`] in
//! submission order. Producers never wait for buffer space: when the buffer
//! is full the submission fails with [`Error::QueueFull`].
//!
//! A producer that wants the processor's result gets a private [`oneshot`]
//! reply channel. Only the producer waits on it; the consumer's write into it
//! never blocks, even when the producer has stopped listening.

use super::Processor;
use crate::{DEFAULT_QUEUE_CAPACITY, Error, MAX_QUEUE_CAPACITY, Result, guard};
use parking_lot::Mutex;
use std::sync::{
    Arc, OnceLock,
    atomic::{AtomicBool, Ordering},
};
use tokio::{
    sync::{
        mpsc::{self, error::TrySendError},
        oneshot,
    },
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

type QuitCallback = Box<dyn Fn() + Send + Sync>;

struct Envelope<T, R> {
    payload: T,
    reply: Option<oneshot::Sender<Result<R>>>,
}

/// Callbacks shared with the consumer task.
///
/// Kept apart from the sender half so the consumer does not keep its own
/// channel open: once every [`Queue`] handle is dropped the task drains and
/// exits on its own.
struct Callbacks<T, R> {
    processor: OnceLock<Box<dyn Processor<T, R>>>,
    on_quit: OnceLock<QuitCallback>,
}

impl<T, R> Callbacks<T, R> {
    fn dispatch(&self, envelope: Envelope<T, R>) {
        let Envelope { payload, reply } = envelope;
        let res = match self.processor.get() {
            Some(processor) => guard::invoke("queue", || processor.process(payload)),
            None => Err(Error::Unconfigured {
                what: "queue processor",
            }),
        };

        match reply {
            // The caller may have given up on the reply; that is fine.
            Some(reply) => {
                let _ = reply.send(res);
            }
            None => {
                if let Err(_e) = res {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("Queue request failed without a listener: {_e}");
                }
            }
        }
    }

    fn finish(&self) {
        if let Some(on_quit) = self.on_quit.get() {
            let _ = guard::invoke("queue quit", || {
                on_quit();
                Ok(())
            });
        }
    }
}

struct Shared<T, R> {
    tx: mpsc::Sender<Envelope<T, R>>,
    capacity: usize,
    callbacks: Arc<Callbacks<T, R>>,
    closed: AtomicBool,
    shutdown: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

/// A bounded, multi-producer, single-consumer request/response queue.
///
/// Cloning a [`Queue`] yields another producer handle for the same consumer.
///
/// ## Lifecycle
///
/// 1. Construct with [`Queue::new`] (then [`Queue::set_callback`]) or
///    [`Queue::with_processor`]. The consumer task starts immediately.
/// 2. Submit work with [`Queue::send`] or [`Queue::push`].
/// 3. Call [`Queue::quit`]: new work is refused, everything already buffered
///    is processed (replies included), the quit callback runs, and only then
///    does `quit` return.
pub struct Queue<T, R> {
    shared: Arc<Shared<T, R>>,
}

impl<T, R> Clone for Queue<T, R> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T, R> Queue<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    /// Creates a queue without a processor and spawns its consumer task.
    ///
    /// A `capacity` of zero selects [`DEFAULT_QUEUE_CAPACITY`]; anything above
    /// [`MAX_QUEUE_CAPACITY`] is clamped to it. Requests that arrive before
    /// [`Queue::set_callback`] are answered with [`Error::Unconfigured`].
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            DEFAULT_QUEUE_CAPACITY
        } else {
            capacity.min(MAX_QUEUE_CAPACITY)
        };
        let (tx, rx) = mpsc::channel(capacity);
        let callbacks = Arc::new(Callbacks {
            processor: OnceLock::new(),
            on_quit: OnceLock::new(),
        });
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(queue_loop(rx, Arc::clone(&callbacks), shutdown.clone()));

        Self {
            shared: Arc::new(Shared {
                tx,
                capacity,
                callbacks,
                closed: AtomicBool::new(false),
                shutdown,
                handle: Mutex::new(Some(handle)),
            }),
        }
    }

    /// Creates a queue with its processor already registered.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn with_processor(capacity: usize, processor: impl Processor<T, R> + 'static) -> Self {
        let queue = Self::new(capacity);
        queue.set_callback(processor);
        queue
    }

    /// Registers the request processor.
    ///
    /// The first registration wins; later calls return `false` and leave the
    /// existing processor in place.
    pub fn set_callback(&self, processor: impl Processor<T, R> + 'static) -> bool {
        self.shared
            .callbacks
            .processor
            .set(Box::new(processor))
            .is_ok()
    }

    /// Registers a callback run once by the consumer after its final drain.
    ///
    /// The first registration wins.
    pub fn set_quit_callback(&self, on_quit: impl Fn() + Send + Sync + 'static) -> bool {
        self.shared.callbacks.on_quit.set(Box::new(on_quit)).is_ok()
    }

    /// Submits a payload, optionally waiting for the processor's reply.
    ///
    /// Without `wants_reply` the call returns `Ok(None)` as soon as the payload
    /// is buffered. With it, the caller (never the consumer) waits until the
    /// processor has run and receives its result.
    ///
    /// # Errors
    ///
    /// - [`Error::QueueFull`] if `capacity` payloads are already buffered.
    /// - [`Error::AlreadyClosed`] after [`Queue::quit`].
    /// - Whatever the processor returned, when waiting for a reply.
    pub async fn send(&self, payload: T, wants_reply: bool) -> Result<Option<R>> {
        if !wants_reply {
            self.push(payload)?;
            return Ok(None);
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        self.enqueue(Envelope {
            payload,
            reply: Some(reply_tx),
        })?;

        match reply_rx.await {
            Ok(res) => res.map(Some),
            Err(_) => Err(Error::ChannelError {
                context: "queue consumer dropped the reply".to_string(),
            }),
        }
    }

    /// Submits a payload without waiting for it to be processed.
    ///
    /// # Errors
    ///
    /// - [`Error::QueueFull`] if `capacity` payloads are already buffered.
    /// - [`Error::AlreadyClosed`] after [`Queue::quit`].
    pub fn push(&self, payload: T) -> Result<()> {
        self.enqueue(Envelope {
            payload,
            reply: None,
        })
    }

    fn enqueue(&self, envelope: Envelope<T, R>) -> Result<()> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(Error::AlreadyClosed);
        }

        self.shared.tx.try_send(envelope).map_err(|e| match e {
            TrySendError::Full(_) => Error::QueueFull {
                capacity: self.shared.capacity,
            },
            TrySendError::Closed(_) => Error::AlreadyClosed,
        })
    }

    /// Stops the queue and waits until it has fully drained.
    ///
    /// Must not be awaited from inside this queue's own processor: the
    /// consumer would wait on itself.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyClosed`] if the queue was already shut down.
    pub async fn quit(&self) -> Result<()> {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyClosed);
        }

        self.shared.shutdown.cancel();
        let handle = self.shared.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(_e) = handle.await {
                #[cfg(feature = "tracing")]
                tracing::error!("Queue consumer terminated abnormally: {_e}");
            }
        }
        Ok(())
    }
}

impl<T, R> Queue<T, R> {
    /// Number of payloads currently buffered.
    pub fn len(&self) -> usize {
        self.shared.capacity - self.shared.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of buffered payloads.
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

async fn queue_loop<T, R>(
    mut rx: mpsc::Receiver<Envelope<T, R>>,
    callbacks: Arc<Callbacks<T, R>>,
    shutdown: CancellationToken,
) {
    #[cfg(feature = "tracing")]
    tracing::trace!("Queue consumer started");

    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            envelope = rx.recv() => match envelope {
                Some(envelope) => callbacks.dispatch(envelope),
                None => break,
            },
        }
    }

    // Refuse anything new, then work through what is already buffered.
    rx.close();
    #[cfg(feature = "tracing")]
    tracing::debug!("Queue consumer draining {} buffered requests", rx.len());
    while let Some(envelope) = rx.recv().await {
        callbacks.dispatch(envelope);
    }

    callbacks.finish();

    #[cfg(feature = "tracing")]
    tracing::trace!("Queue consumer stopped");
}
