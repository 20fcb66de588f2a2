//! Collaboration hub: the update pipeline for every room.
//!
//! ```text
//! raw frame ─► decode ─► UpdateSerializer::with_room(room)
//!                          ├─ gateway.get(room)
//!                          ├─ Document::apply(update)
//!                          └─ gateway.set(room, doc, 30d)
//!                        ─► Fanout::broadcast(room, raw frame)   (lock released)
//! ```
//!
//! Persisted order is the serializer's order, but delivery is not: two
//! updates committed A then B run their fanouts concurrently, so a session
//! can receive B before A. Updates from one connection keep their order,
//! since the connection awaits each `submit`, fanout included, before reading
//! its next frame. Updates to disjoint paths commute; a client
//! that needs the authoritative value of a contended path re-reads it with
//! `fetch_document` (`GET /json/<id>`).
//!
//! A room is valid only while the gateway holds a document for it, so joins
//! and updates against unknown ids fail with `RoomNotFound` before anything
//! is registered.

use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use crate::broadcast::{Fanout, FanoutReport};
use crate::document::Document;
use crate::error::SyncError;
use crate::protocol::UpdateMessage;
use crate::registry::{RoomId, RoomRegistry};
use crate::serializer::UpdateSerializer;
use crate::session::{Payload, SessionHandle, SessionId};
use crate::storage::{DocumentGateway, StoreError, DOCUMENT_TTL};

pub struct CollabHub {
    gateway: Arc<dyn DocumentGateway>,
    registry: Arc<RoomRegistry>,
    serializer: UpdateSerializer,
    fanout: Fanout,
}

impl CollabHub {
    pub fn new(gateway: Arc<dyn DocumentGateway>) -> Self {
        Self::with_registry(gateway, Arc::new(RoomRegistry::new()))
    }

    pub fn with_registry(gateway: Arc<dyn DocumentGateway>, registry: Arc<RoomRegistry>) -> Self {
        Self {
            gateway,
            fanout: Fanout::new(registry.clone()),
            registry,
            serializer: UpdateSerializer::new(),
        }
    }

    /// Store a new document and return its room id.
    pub fn create_document(&self, value: &Value) -> Result<RoomId, SyncError> {
        let id = Uuid::new_v4().to_string();
        let bytes = serde_json::to_vec(value)
            .map_err(|e| StoreError::SerializationError(e.to_string()))?;
        self.gateway.set(&id, &bytes, DOCUMENT_TTL)?;
        log::info!("Created document {id} ({} bytes)", bytes.len());
        Ok(id)
    }

    /// Current document of a room.
    pub fn fetch_document(&self, room: &str) -> Result<Value, SyncError> {
        Ok(self.load(room)?.into_value())
    }

    /// Fail with `RoomNotFound` unless the gateway holds `room`.
    pub fn ensure_room(&self, room: &str) -> Result<(), SyncError> {
        match self.gateway.get(room)? {
            Some(_) => Ok(()),
            None => Err(SyncError::RoomNotFound(room.to_string())),
        }
    }

    /// Attach a session to a room that exists.
    pub async fn join(&self, room: &str, session: SessionHandle) -> Result<(), SyncError> {
        self.ensure_room(room)?;
        log::info!("Session {} joined room {room}", session.id());
        self.registry.join(room, session).await;
        Ok(())
    }

    pub async fn leave(&self, room: &str, session_id: &SessionId) -> bool {
        let left = self.registry.leave(room, session_id).await;
        if left {
            log::info!("Session {session_id} left room {room}");
        }
        left
    }

    /// Apply one raw update frame to `room` and broadcast it verbatim.
    pub async fn submit(&self, room: &str, raw: &str) -> Result<FanoutReport, SyncError> {
        let message = UpdateMessage::decode(raw)?;
        let update = message.to_update()?;

        self.serializer
            .with_room(room, || async {
                let mut document = self.load(room)?;
                document.apply(&update)?;
                let bytes = document
                    .to_bytes()
                    .map_err(|e| StoreError::SerializationError(e.to_string()))?;
                self.gateway.set(room, &bytes, DOCUMENT_TTL)?;
                Ok::<(), SyncError>(())
            })
            .await?;

        log::debug!("Room {room}: applied update at `{}`", message.path);
        let payload: Payload = Arc::from(raw);
        Ok(self.fanout.broadcast(room, payload).await)
    }

    fn load(&self, room: &str) -> Result<Document, SyncError> {
        let bytes = self
            .gateway
            .get(room)?
            .ok_or_else(|| SyncError::RoomNotFound(room.to_string()))?;
        Document::from_bytes(&bytes)
            .map_err(|e| StoreError::DeserializationError(e.to_string()).into())
    }

    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    pub fn fanout(&self) -> &Fanout {
        &self.fanout
    }

    pub fn gateway(&self) -> &Arc<dyn DocumentGateway> {
        &self.gateway
    }

    /// Rooms with an update in progress or queued.
    pub fn busy_rooms(&self) -> usize {
        self.serializer.active_rooms()
    }
}
