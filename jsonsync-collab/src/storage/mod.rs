//! Persistence gateway for shared documents.
//!
//! ```text
//! ┌─────────────┐  get / set(ttl)  ┌──────────────────────────────┐
//! │ CollabHub   │ ───────────────► │ dyn DocumentGateway          │
//! │ (serialized │                  │  ├─ RocksStore  (durable)    │
//! │  per room)  │                  │  └─ MemoryStore (tests/dev)  │
//! └─────────────┘                  └──────────────────────────────┘
//! ```
//!
//! Documents are opaque bytes to the gateway. Every write carries a TTL;
//! the hub always passes [`DOCUMENT_TTL`], so a document lives for thirty
//! days after its latest update. Expired entries read as absent.

pub mod memory;
pub mod rocks;

use std::time::{Duration, SystemTime};

pub use memory::MemoryStore;
pub use rocks::{DocumentMetadata, RocksStore, StoreConfig};

/// Lifetime of a document after each write.
pub const DOCUMENT_TTL: Duration = Duration::from_secs(30 * 24 * 3600);

/// Storage errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Deserialization error: {0}")]
    DeserializationError(String),
    #[error("Compression error: {0}")]
    CompressionError(String),
    /// Store could not be reached or its state is unusable.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<rocksdb::Error> for StoreError {
    fn from(e: rocksdb::Error) -> Self {
        StoreError::DatabaseError(e.to_string())
    }
}

/// Key/value store holding document bytes with a time-to-live.
pub trait DocumentGateway: Send + Sync {
    /// Current bytes stored under `id`, `None` if absent or expired.
    fn get(&self, id: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Store `bytes` under `id`, expiring `ttl` from now.
    fn set(&self, id: &str, bytes: &[u8], ttl: Duration) -> Result<(), StoreError>;

    /// Remove expired entries, returning how many were removed.
    fn purge_expired(&self) -> Result<usize, StoreError> {
        Ok(0)
    }
}

/// Milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

pub(crate) fn expiry_from_now(ttl: Duration) -> u64 {
    let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
    now_millis().saturating_add(ttl_ms)
}
