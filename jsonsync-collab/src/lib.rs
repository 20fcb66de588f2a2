//! # jsonsync-collab - Real-time shared JSON documents
//!
//! Clients join a room named after a stored document, send single-field
//! updates addressed by dotted paths, and every member of the room receives
//! each accepted update.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     WebSocket      ┌─────────────┐
//! │ SyncClient  │ ◄─────────────────► │ SyncServer  │
//! │ (per user)  │     JSON frames     │ (central)   │
//! └─────────────┘                     └──────┬──────┘
//!                                            │
//!                                     ┌──────┴──────┐
//!                                     │  CollabHub  │
//!                                     └──┬───────┬──┘
//!                     UpdateSerializer   │       │   Fanout
//!                     (one writer/room)  ▼       ▼   (room members)
//!                               ┌──────────────┐ ┌──────────────┐
//!                               │DocumentGateway│ │ RoomRegistry │
//!                               └──────────────┘ └──────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`path`]: Dotted path parsing and resolution
//! - [`document`]: Applying one update to a JSON document
//! - [`protocol`]: JSON wire messages
//! - [`registry`]: Room membership
//! - [`serializer`]: Per-room mutual exclusion for read-modify-write
//! - [`broadcast`]: Room fan-out with slow-consumer eviction
//! - [`storage`]: Document persistence (RocksDB or in-memory)
//! - [`hub`]: The update pipeline tying the above together
//! - [`server`]: WebSocket sync server
//! - [`api`]: HTTP upload and fetch of documents
//! - [`client`]: WebSocket sync client

pub mod path;
pub mod document;
pub mod protocol;
pub mod error;
pub mod session;
pub mod registry;
pub mod serializer;
pub mod broadcast;
pub mod storage;
pub mod hub;
pub mod server;
pub mod api;
pub mod client;

// Re-exports for convenience
pub use path::{MutationError, Path, Segment};
pub use document::{Document, Update};
pub use protocol::{ProtocolError, RejectionNotice, ServerFrame, UpdateMessage};
pub use error::SyncError;
pub use session::{Payload, Session, SessionHandle, SessionId, SessionState};
pub use registry::{RoomId, RoomRegistry};
pub use serializer::UpdateSerializer;
pub use broadcast::{BroadcastStats, Fanout, FanoutReport};
pub use storage::{
    DocumentGateway, DocumentMetadata, MemoryStore, RocksStore, StoreConfig, StoreError,
    DOCUMENT_TTL,
};
pub use hub::CollabHub;
pub use server::{ServerConfig, ServerStats, SyncServer};
pub use api::ApiClient;
pub use client::{ConnectionState, SyncClient, SyncEvent};
