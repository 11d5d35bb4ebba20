//! Session bookkeeping run inside the pool's lanes.

use core::fmt;
use lanepool::{BoundObjects, DrainingList, Error, LaneHandler, LaneId, ObjectId, Result, VirtualNodeRing};
use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

#[derive(Debug, Clone, Copy)]
pub enum SessionEvent {
    /// Opens the session on first use, otherwise refreshes it.
    Touch,
    Close,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub region: String,
    pub events: u64,
    pub last_seen: Instant,
}

/// A session leaving the pool, written to the audit list.
#[derive(Debug)]
pub enum AuditRecord {
    Closed {
        lane: LaneId,
        session: ObjectId,
        region: String,
        events: u64,
    },
    Expired {
        lane: LaneId,
        session: ObjectId,
        region: String,
        idle: Duration,
    },
}

impl fmt::Display for AuditRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed {
                lane,
                session,
                region,
                events,
            } => write!(
                f,
                "session {session} ({region}) closed on lane {lane} after {events} events"
            ),
            Self::Expired {
                lane,
                session,
                region,
                idle,
            } => write!(
                f,
                "session {session} ({region}) expired on lane {lane} after {idle:?} idle"
            ),
        }
    }
}

#[derive(Debug, Default)]
pub struct SessionStats {
    pub opened: AtomicU64,
    pub closed: AtomicU64,
    pub expired: AtomicU64,
    pub ticks: AtomicU64,
}

pub struct SessionHandler {
    regions: VirtualNodeRing,
    audit: Arc<DrainingList<AuditRecord>>,
    idle_timeout: Duration,
    stats: SessionStats,
}

impl SessionHandler {
    pub fn new(
        regions: VirtualNodeRing,
        audit: Arc<DrainingList<AuditRecord>>,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            regions,
            audit,
            idle_timeout,
            stats: SessionStats::default(),
        }
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    fn record(&self, record: AuditRecord) {
        if let Err(e) = self.audit.push(record) {
            tracing::warn!("Audit record dropped: {e}");
        }
    }
}

impl LaneHandler for SessionHandler {
    type Request = (ObjectId, SessionEvent);
    /// Events seen by the session so far.
    type Response = u64;
    type Object = Session;

    fn process(
        &self,
        lane: LaneId,
        sessions: &BoundObjects<Session>,
        (id, event): (ObjectId, SessionEvent),
    ) -> Result<u64> {
        match event {
            SessionEvent::Touch => {
                let events = sessions.with_mut(|map| {
                    let session = map.entry(id).or_insert_with(|| {
                        self.stats.opened.fetch_add(1, Ordering::Relaxed);
                        Session {
                            region: self
                                .regions
                                .get_node(&id.to_string())
                                .unwrap_or_else(|| "unassigned".to_string()),
                            events: 0,
                            last_seen: Instant::now(),
                        }
                    });
                    session.events += 1;
                    session.last_seen = Instant::now();
                    session.events
                });
                Ok(events)
            }
            SessionEvent::Close => {
                let session = sessions
                    .remove(id)?
                    .ok_or(Error::NoSuchObject { object: id })?;
                self.stats.closed.fetch_add(1, Ordering::Relaxed);
                let events = session.events;
                self.record(AuditRecord::Closed {
                    lane,
                    session: id,
                    region: session.region,
                    events,
                });
                Ok(events)
            }
        }
    }

    fn on_tick(&self, lane: LaneId, sessions: &BoundObjects<Session>) -> Result<()> {
        self.stats.ticks.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();
        let expired: Vec<(ObjectId, Session)> = sessions.with_mut(|map| {
            let idle: Vec<ObjectId> = map
                .iter()
                .filter(|(_, s)| now.duration_since(s.last_seen) >= self.idle_timeout)
                .map(|(id, _)| *id)
                .collect();
            idle.into_iter()
                .filter_map(|id| map.remove(&id).map(|s| (id, s)))
                .collect()
        });

        let count = expired.len();
        for (id, session) in expired {
            self.record(AuditRecord::Expired {
                lane,
                session: id,
                idle: now.duration_since(session.last_seen),
                region: session.region,
            });
        }
        self.stats.expired.fetch_add(count as u64, Ordering::Relaxed);

        tracing::debug!(
            "Lane {lane}: {} open sessions, {count} expired",
            sessions.len()
        );
        Ok(())
    }

    fn on_quit(&self, lane: LaneId) {
        tracing::debug!("Lane {lane} drained");
    }
}
