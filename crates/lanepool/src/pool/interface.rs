use super::BoundObjects;
use crate::Result;

/// Stable identifier of a lane. Assigned from 1 upwards, never reused while
/// the pool is running.
pub type LaneId = i32;

/// Identifier of an object whose operations must stay on one lane. Values
/// `<= 0` mean "no object".
pub type ObjectId = i64;

/// Behaviour shared by every lane of a [`crate::WorkerPool`].
///
/// One handler instance is shared by all lanes, but each call runs on the
/// lane that owns the request, and a lane runs one call at a time:
/// [`process`](LaneHandler::process) and [`on_tick`](LaneHandler::on_tick)
/// never overlap on the same lane. Calls run on background Tokio tasks and
/// should not block; a blocked call delays every request queued behind it
/// and the pool's shutdown.
///
/// Panics are caught per call and reported as [`crate::Error::Internal`].
pub trait LaneHandler: Send + Sync + 'static {
    type Request: Send + 'static;
    type Response: Send + 'static;
    /// State bound to an [`ObjectId`] on its owning lane.
    type Object: Send + Sync + 'static;

    /// Handles one request routed to `lane`.
    fn process(
        &self,
        lane: LaneId,
        objects: &BoundObjects<Self::Object>,
        request: Self::Request,
    ) -> Result<Self::Response>;

    /// Periodic maintenance, for lanes created with a ticker.
    fn on_tick(&self, _lane: LaneId, _objects: &BoundObjects<Self::Object>) -> Result<()> {
        Ok(())
    }

    /// Runs once on the lane after it has drained on shutdown.
    fn on_quit(&self, _lane: LaneId) {}
}
