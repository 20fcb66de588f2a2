//! Room registry: maps room ids to the sessions currently attached.
//!
//! One instance is created per server and shared through `Arc`; tests build
//! their own. Rooms exist only while they have members: the entry is created
//! by the first `join` and removed by the `leave` that empties it.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::session::{SessionHandle, SessionId};

pub type RoomId = String;

#[derive(Default)]
pub struct RoomRegistry {
    rooms: RwLock<HashMap<RoomId, HashMap<SessionId, SessionHandle>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `session` under `room`, creating the room if needed.
    pub async fn join(&self, room: &str, session: SessionHandle) {
        let mut rooms = self.rooms.write().await;
        let members = rooms.entry(room.to_string()).or_default();
        members.insert(session.id(), session);
        log::debug!("Room {room}: {} member(s) after join", members.len());
    }

    /// Unregister a session. Returns whether it was a member.
    ///
    /// The room entry is dropped as soon as its last member leaves.
    pub async fn leave(&self, room: &str, session_id: &SessionId) -> bool {
        let mut rooms = self.rooms.write().await;
        let Some(members) = rooms.get_mut(room) else {
            return false;
        };
        let removed = members.remove(session_id).is_some();
        if members.is_empty() {
            rooms.remove(room);
            log::debug!("Room {room} removed (empty)");
        }
        removed
    }

    /// Snapshot of the room's members. The lock is released before return,
    /// so callers can deliver without blocking joins and leaves.
    pub async fn members_of(&self, room: &str) -> Vec<SessionHandle> {
        self.rooms
            .read()
            .await
            .get(room)
            .map(|members| members.values().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn contains(&self, room: &str, session_id: &SessionId) -> bool {
        self.rooms
            .read()
            .await
            .get(room)
            .is_some_and(|members| members.contains_key(session_id))
    }

    pub async fn session_count(&self, room: &str) -> usize {
        self.rooms.read().await.get(room).map_or(0, HashMap::len)
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn active_rooms(&self) -> Vec<RoomId> {
        self.rooms.read().await.keys().cloned().collect()
    }
}
