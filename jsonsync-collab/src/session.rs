//! Sessions: one connected client's membership in a room.
//!
//! The registry never touches a socket. It holds a [`SessionHandle`], which
//! is the sending half of a bounded outbox; the connection task owns the
//! receiving half and the socket. A send into a full or closed outbox fails
//! immediately, so a stalled client never blocks a broadcaster.
//!
//! ```text
//! Connecting ──► Joined ──► Active ◄─┐
//!     │             │         │  └───┘ (each message)
//!     └─────────────┴─────────┴──► Left (terminal)
//! ```

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use crate::error::SyncError;

pub type SessionId = Uuid;

/// Raw broadcast payload, shared by every recipient.
pub type Payload = Arc<str>;

/// Cloneable reference to a session's outbox.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    outbox: mpsc::Sender<Payload>,
}

impl SessionHandle {
    /// Create a handle plus the receiver the connection task drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Payload>) {
        Self::with_id(Uuid::new_v4(), capacity)
    }

    pub fn with_id(id: SessionId, capacity: usize) -> (Self, mpsc::Receiver<Payload>) {
        let (outbox, rx) = mpsc::channel(capacity.max(1));
        (Self { id, outbox }, rx)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Queue a payload without waiting. Full or closed outbox is a delivery
    /// failure.
    pub fn deliver(&self, payload: Payload) -> Result<(), SyncError> {
        self.outbox.try_send(payload).map_err(|e| {
            match e {
                TrySendError::Full(_) => log::debug!("Session {} outbox full", self.id),
                TrySendError::Closed(_) => log::debug!("Session {} outbox closed", self.id),
            }
            SyncError::DeliveryFailure(self.id)
        })
    }

    pub fn is_closed(&self) -> bool {
        self.outbox.is_closed()
    }
}

impl PartialEq for SessionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SessionHandle {}

/// Lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Joined,
    Active,
    Left,
}

impl SessionState {
    pub fn can_advance_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Connecting, Joined)
                | (Joined, Active)
                | (Active, Active)
                | (Connecting, Left)
                | (Joined, Left)
                | (Active, Left)
        )
    }
}

/// Per-connection bookkeeping held by the connection task.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    room: String,
    state: SessionState,
}

impl Session {
    pub fn new(id: SessionId, room: impl Into<String>) -> Self {
        Self {
            id,
            room: room.into(),
            state: SessionState::Connecting,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Move to `next`; illegal transitions are ignored and reported.
    pub fn advance(&mut self, next: SessionState) -> bool {
        if !self.state.can_advance_to(next) {
            log::warn!(
                "Session {} in room {}: illegal transition {:?} -> {:?}",
                self.id,
                self.room,
                self.state,
                next
            );
            return false;
        }
        if self.state != next {
            log::trace!("Session {} {:?} -> {:?}", self.id, self.state, next);
        }
        self.state = next;
        true
    }

    pub fn is_left(&self) -> bool {
        self.state == SessionState::Left
    }
}
