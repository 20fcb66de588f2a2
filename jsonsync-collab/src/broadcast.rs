//! Fan-out of accepted updates to every session of a room.
//!
//! Delivery works on a member snapshot, so joins and leaves proceed while a
//! broadcast is in flight. Each recipient is tried independently with a
//! non-blocking send into its outbox; a recipient whose outbox is full or
//! closed is dropped from the room once the pass is over. No retries, no
//! acknowledgements.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::registry::RoomRegistry;
use crate::session::{Payload, SessionId};

/// Statistics for monitoring broadcast health.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    pub messages_sent: u64,
    pub deliveries: u64,
    pub sessions_dropped: u64,
}

/// Atomic counters, so the hot path never takes a lock for stats.
#[derive(Default)]
struct AtomicBroadcastStats {
    messages_sent: AtomicU64,
    deliveries: AtomicU64,
    sessions_dropped: AtomicU64,
}

/// Outcome of one broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanoutReport {
    pub delivered: usize,
    pub dropped: Vec<SessionId>,
}

pub struct Fanout {
    registry: Arc<RoomRegistry>,
    stats: AtomicBroadcastStats,
}

impl Fanout {
    pub fn new(registry: Arc<RoomRegistry>) -> Self {
        Self {
            registry,
            stats: AtomicBroadcastStats::default(),
        }
    }

    /// Deliver `payload` to every current member of `room`.
    pub async fn broadcast(&self, room: &str, payload: Payload) -> FanoutReport {
        let members = self.registry.members_of(room).await;
        let mut report = FanoutReport::default();

        for member in &members {
            match member.deliver(payload.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    log::warn!("Room {room}: {e}, dropping session");
                    report.dropped.push(member.id());
                }
            }
        }
        drop(members);

        for session_id in &report.dropped {
            self.registry.leave(room, session_id).await;
        }

        self.stats.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.stats
            .deliveries
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.stats
            .sessions_dropped
            .fetch_add(report.dropped.len() as u64, Ordering::Relaxed);

        log::trace!(
            "Room {room}: broadcast delivered to {}, dropped {}",
            report.delivered,
            report.dropped.len()
        );
        report
    }

    pub fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            messages_sent: self.stats.messages_sent.load(Ordering::Relaxed),
            deliveries: self.stats.deliveries.load(Ordering::Relaxed),
            sessions_dropped: self.stats.sessions_dropped.load(Ordering::Relaxed),
        }
    }

    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }
}
