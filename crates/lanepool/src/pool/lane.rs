use super::{BoundObjects, LaneHandler, LaneId};
use crate::{Error, Queue, Result, Ticker};
use core::time::Duration;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// What a lane's queue carries: caller requests, and maintenance ticks
/// injected by the lane's own ticker.
pub(crate) enum LaneMessage<Req> {
    Request(Req),
    Tick,
}

type LaneQueue<H> = Queue<
    LaneMessage<<H as LaneHandler>::Request>,
    Option<<H as LaneHandler>::Response>,
>;

/// One single-threaded execution lane of a [`crate::WorkerPool`].
///
/// A lane owns a [`Queue`] (its only consumer task), a table of
/// [`BoundObjects`] and, optionally, a [`Ticker`]. The ticker does not call
/// into the handler itself: each tick is queued behind pending requests, so
/// maintenance and request processing never run at the same time on a lane.
pub struct Lane<H: LaneHandler> {
    id: LaneId,
    queue: LaneQueue<H>,
    ticker: Option<Ticker>,
    objects: Arc<BoundObjects<H::Object>>,
}

impl<H: LaneHandler> Lane<H> {
    pub(crate) fn new(
        id: LaneId,
        handler: Arc<H>,
        queue_capacity: usize,
        tick_period: Option<Duration>,
    ) -> Self {
        let objects = Arc::new(BoundObjects::default());
        // Set while a tick sits in the queue so a slow lane never piles them up.
        let tick_pending = Arc::new(AtomicBool::new(false));

        let queue: LaneQueue<H> = Queue::with_processor(queue_capacity, {
            let handler = Arc::clone(&handler);
            let objects = Arc::clone(&objects);
            let tick_pending = Arc::clone(&tick_pending);
            move |message: LaneMessage<H::Request>| -> Result<Option<H::Response>> {
                match message {
                    LaneMessage::Request(request) => {
                        handler.process(id, &objects, request).map(Some)
                    }
                    LaneMessage::Tick => {
                        tick_pending.store(false, Ordering::Release);
                        handler.on_tick(id, &objects).map(|()| None)
                    }
                }
            }
        });
        queue.set_quit_callback({
            let handler = Arc::clone(&handler);
            move || handler.on_quit(id)
        });

        let ticker = tick_period.map(|period| {
            let queue = queue.clone();
            Ticker::with_checker(period, move || -> Result<()> {
                if tick_pending.swap(true, Ordering::AcqRel) {
                    return Ok(());
                }
                match queue.push(LaneMessage::Tick) {
                    Ok(()) => Ok(()),
                    Err(e) => {
                        tick_pending.store(false, Ordering::Release);
                        match e {
                            Error::AlreadyClosed => Ok(()),
                            e => Err(e),
                        }
                    }
                }
            })
        });

        #[cfg(feature = "tracing")]
        tracing::trace!("Lane {id} created (ticker: {tick_period:?})");

        Self {
            id,
            queue,
            ticker,
            objects,
        }
    }

    pub fn id(&self) -> LaneId {
        self.id
    }

    /// Submits a request to this lane, optionally waiting for the reply.
    ///
    /// # Errors
    ///
    /// - [`Error::QueueFull`] if the lane's queue is at capacity.
    /// - [`Error::AlreadyClosed`] once the lane has been shut down.
    /// - Whatever the handler returned, when waiting for a reply.
    pub async fn send(&self, request: H::Request, wants_reply: bool) -> Result<Option<H::Response>> {
        self.queue
            .send(LaneMessage::Request(request), wants_reply)
            .await
            .map(Option::flatten)
    }

    /// Submits a request without waiting for it.
    ///
    /// # Errors
    ///
    /// See [`Lane::send`].
    pub fn push(&self, request: H::Request) -> Result<()> {
        self.queue.push(LaneMessage::Request(request))
    }

    /// The objects bound to this lane.
    pub fn objects(&self) -> &BoundObjects<H::Object> {
        &self.objects
    }

    /// Number of requests (and ticks) waiting in the lane's queue.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn has_ticker(&self) -> bool {
        self.ticker.is_some()
    }

    /// Current tick period, if the lane has a ticker.
    pub fn tick_duration(&self) -> Option<Duration> {
        self.ticker.as_ref().map(Ticker::duration)
    }

    /// Changes the tick period, in seconds.
    ///
    /// # Errors
    ///
    /// - [`Error::Unconfigured`] if the lane was created without a ticker.
    /// - [`Error::InvalidArgument`] for a non-positive duration.
    pub fn update_tick_duration(&self, seconds: f64) -> Result<()> {
        self.ticker
            .as_ref()
            .ok_or(Error::Unconfigured {
                what: "lane ticker",
            })?
            .update_duration(seconds)
    }

    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }

    /// Stops the ticker (whose final tick is still queued), then drains and
    /// stops the queue.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyClosed`] if the lane was already shut down.
    pub(crate) async fn quit(&self) -> Result<()> {
        if let Some(ticker) = &self.ticker {
            if let Err(_e) = ticker.quit().await {
                #[cfg(feature = "tracing")]
                tracing::debug!("Lane {} ticker: {_e}", self.id);
            }
        }
        self.queue.quit().await?;

        #[cfg(feature = "tracing")]
        tracing::trace!("Lane {} stopped", self.id);
        Ok(())
    }
}
