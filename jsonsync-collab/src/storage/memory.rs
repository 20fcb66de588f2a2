//! In-process gateway, used when no storage path is configured and in tests.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use super::{expiry_from_now, now_millis, DocumentGateway, StoreError};

struct Entry {
    bytes: Vec<u8>,
    expires_at: u64,
}

#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Unavailable("memory store lock poisoned".into())
}

impl DocumentGateway for MemoryStore {
    fn get(&self, id: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let entries = self.entries.read().map_err(poisoned)?;
        let now = now_millis();
        Ok(entries
            .get(id)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.bytes.clone()))
    }

    fn set(&self, id: &str, bytes: &[u8], ttl: Duration) -> Result<(), StoreError> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        entries.insert(
            id.to_string(),
            Entry {
                bytes: bytes.to_vec(),
                expires_at: expiry_from_now(ttl),
            },
        );
        Ok(())
    }

    fn purge_expired(&self) -> Result<usize, StoreError> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        let now = now_millis();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        Ok(before - entries.len())
    }
}
