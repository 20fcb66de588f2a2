//! RocksDB-backed document gateway.
//!
//! Column families:
//! - `documents`: bincode envelope `{ expires_at, payload }`, payload LZ4 compressed
//! - `metadata` : bincode `DocumentMetadata` (version, sizes, timestamps)
//!
//! Both are written in one `WriteBatch`, so a document and its metadata never
//! disagree. Expiry is checked on read; `purge_expired` sweeps the rest.

use rocksdb::{
    BlockBasedOptions, Cache, ColumnFamilyDescriptor, DBCompressionType, DBWithThreadMode,
    IteratorMode, Options, SingleThreaded, WriteBatch, WriteOptions,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{expiry_from_now, now_millis, DocumentGateway, StoreError};

const CF_DOCUMENTS: &str = "documents";
const CF_METADATA: &str = "metadata";

const COLUMN_FAMILIES: &[&str] = &[CF_DOCUMENTS, CF_METADATA];

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database directory path
    pub path: PathBuf,
    /// Block cache size in bytes (default: 64MB)
    pub block_cache_size: usize,
    /// Bloom filter bits per key (default: 10)
    pub bloom_filter_bits: i32,
    /// fsync on every write (default: false)
    pub sync_writes: bool,
    /// Max open files for RocksDB (default: 512)
    pub max_open_files: i32,
    /// Write buffer size per column family (default: 32MB)
    pub write_buffer_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("jsonsync_data"),
            block_cache_size: 64 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 512,
            write_buffer_size: 32 * 1024 * 1024,
        }
    }
}

impl StoreConfig {
    /// Small caches for tests.
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 8 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 64,
            write_buffer_size: 4 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredDocument {
    /// Milliseconds since epoch
    expires_at: u64,
    /// LZ4 compressed, size prepended
    payload: Vec<u8>,
}

impl StoredDocument {
    fn is_expired(&self, now: u64) -> bool {
        self.expires_at <= now
    }
}

/// Document metadata stored alongside the bytes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentMetadata {
    pub room_id: String,
    /// Number of writes, starting at 1 for the first
    pub version: u64,
    /// Uncompressed size in bytes
    pub size: u64,
    pub compressed_size: u64,
    /// Milliseconds since epoch
    pub created_at: u64,
    pub updated_at: u64,
    pub expires_at: u64,
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| StoreError::SerializationError(e.to_string()))
}

fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, StoreError> {
    let (value, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| StoreError::DeserializationError(e.to_string()))?;
    Ok(value)
}

pub struct RocksStore {
    /// Single-threaded column family mode; concurrency comes from tokio
    db: DBWithThreadMode<SingleThreaded>,
    config: StoreConfig,
}

impl RocksStore {
    /// Open the store, creating the database and column families if missing.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_open_files(config.max_open_files);
        db_opts.set_keep_log_file_num(5);
        db_opts.increase_parallelism(num_cpus());

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Self::cf_options(name, &config)))
            .collect();

        let db = DBWithThreadMode::<SingleThreaded>::open_cf_descriptors(
            &db_opts,
            &config.path,
            cf_descriptors,
        )?;
        log::info!("Opened document store at {}", config.path.display());

        Ok(Self { db, config })
    }

    fn cf_options(name: &str, config: &StoreConfig) -> Options {
        let mut opts = Options::default();

        let mut block_opts = BlockBasedOptions::default();
        let cache = Cache::new_lru_cache(config.block_cache_size);
        block_opts.set_block_cache(&cache);
        block_opts.set_bloom_filter(config.bloom_filter_bits as f64, false);
        opts.set_block_based_table_factory(&block_opts);
        opts.set_write_buffer_size(config.write_buffer_size);

        match name {
            CF_DOCUMENTS => {
                // Payloads are already LZ4 compressed.
                opts.set_compression_type(DBCompressionType::None);
                opts.optimize_for_point_lookup(config.block_cache_size as u64);
            }
            CF_METADATA => {
                opts.set_compression_type(DBCompressionType::Lz4);
                opts.optimize_for_point_lookup(config.block_cache_size as u64);
            }
            _ => {}
        }

        opts
    }

    fn load_stored(&self, id: &str) -> Result<Option<StoredDocument>, StoreError> {
        let cf = self.cf(CF_DOCUMENTS)?;
        match self.db.get_cf(cf, id.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Metadata of a live document.
    pub fn load_metadata(&self, id: &str) -> Result<Option<DocumentMetadata>, StoreError> {
        let cf = self.cf(CF_METADATA)?;
        let meta = match self.db.get_cf(cf, id.as_bytes())? {
            Some(bytes) => decode::<DocumentMetadata>(&bytes)?,
            None => return Ok(None),
        };
        Ok((meta.expires_at > now_millis()).then_some(meta))
    }

    /// Ids of all live documents.
    pub fn list_documents(&self) -> Result<Vec<String>, StoreError> {
        let cf = self.cf(CF_METADATA)?;
        let now = now_millis();
        let mut ids = Vec::new();

        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item?;
            let meta: DocumentMetadata = decode(&value)?;
            if meta.expires_at > now {
                let id = String::from_utf8(key.to_vec())
                    .map_err(|e| StoreError::DeserializationError(e.to_string()))?;
                ids.push(id);
            }
        }

        Ok(ids)
    }

    pub fn delete_document(&self, id: &str) -> Result<(), StoreError> {
        let mut batch = WriteBatch::default();
        batch.delete_cf(self.cf(CF_DOCUMENTS)?, id.as_bytes());
        batch.delete_cf(self.cf(CF_METADATA)?, id.as_bytes());
        self.db.write(batch)?;
        Ok(())
    }

    /// Flush memtables to disk.
    pub fn sync(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::DatabaseError(format!("Column family '{name}' not found")))
    }
}

impl DocumentGateway for RocksStore {
    fn get(&self, id: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let Some(stored) = self.load_stored(id)? else {
            return Ok(None);
        };
        if stored.is_expired(now_millis()) {
            return Ok(None);
        }
        lz4_flex::decompress_size_prepended(&stored.payload)
            .map(Some)
            .map_err(|e| StoreError::CompressionError(e.to_string()))
    }

    fn set(&self, id: &str, bytes: &[u8], ttl: Duration) -> Result<(), StoreError> {
        let cf_docs = self.cf(CF_DOCUMENTS)?;
        let cf_meta = self.cf(CF_METADATA)?;

        let now = now_millis();
        let expires_at = expiry_from_now(ttl);
        let stored = StoredDocument {
            expires_at,
            payload: lz4_flex::compress_prepend_size(bytes),
        };

        // Expired metadata counts as a fresh document.
        let meta = match self.load_metadata(id)? {
            Some(prev) => DocumentMetadata {
                version: prev.version + 1,
                size: bytes.len() as u64,
                compressed_size: stored.payload.len() as u64,
                updated_at: now,
                expires_at,
                ..prev
            },
            None => DocumentMetadata {
                room_id: id.to_string(),
                version: 1,
                size: bytes.len() as u64,
                compressed_size: stored.payload.len() as u64,
                created_at: now,
                updated_at: now,
                expires_at,
            },
        };

        let mut batch = WriteBatch::default();
        batch.put_cf(cf_docs, id.as_bytes(), encode(&stored)?);
        batch.put_cf(cf_meta, id.as_bytes(), encode(&meta)?);

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        self.db.write_opt(batch, &write_opts)?;
        Ok(())
    }

    fn purge_expired(&self) -> Result<usize, StoreError> {
        let cf_docs = self.cf(CF_DOCUMENTS)?;
        let cf_meta = self.cf(CF_METADATA)?;
        let now = now_millis();

        let mut batch = WriteBatch::default();
        let mut purged = 0;
        for item in self.db.iterator_cf(cf_docs, IteratorMode::Start) {
            let (key, value) = item?;
            let stored: StoredDocument = decode(&value)?;
            if stored.is_expired(now) {
                batch.delete_cf(cf_docs, &key);
                batch.delete_cf(cf_meta, &key);
                purged += 1;
            }
        }

        if purged > 0 {
            self.db.write(batch)?;
            log::info!("Purged {purged} expired document(s)");
        }
        Ok(purged)
    }
}

/// Get number of CPU cores for RocksDB parallelism.
fn num_cpus() -> i32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as i32)
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::DOCUMENT_TTL;

    fn open_temp() -> (tempfile::TempDir, RocksStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = RocksStore::open(StoreConfig::for_testing(dir.path().join("db"))).unwrap();
        (dir, store)
    }

    #[test]
    fn test_store_open() {
        let (_dir, store) = open_temp();
        assert!(store.path().exists());
    }

    #[test]
    fn test_set_get() {
        let (_dir, store) = open_temp();
        let doc = br#"{"character":{"name":"Aragorn","age":87}}"#;

        assert!(store.get("room").unwrap().is_none());
        store.set("room", doc, DOCUMENT_TTL).unwrap();
        assert_eq!(store.get("room").unwrap().unwrap(), doc.to_vec());
    }

    #[test]
    fn test_metadata_tracks_versions() {
        let (_dir, store) = open_temp();
        store.set("room", b"{}", DOCUMENT_TTL).unwrap();
        let first = store.load_metadata("room").unwrap().unwrap();
        assert_eq!(first.version, 1);
        assert_eq!(first.room_id, "room");
        assert_eq!(first.size, 2);

        store.set("room", b"{\"a\":1}", DOCUMENT_TTL).unwrap();
        let second = store.load_metadata("room").unwrap().unwrap();
        assert_eq!(second.version, 2);
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.size, 7);
        assert!(second.expires_at >= first.expires_at);
    }

    #[test]
    fn test_expired_document_is_absent() {
        let (_dir, store) = open_temp();
        store.set("stale", b"{}", Duration::ZERO).unwrap();
        store.set("live", b"{}", DOCUMENT_TTL).unwrap();

        assert!(store.get("stale").unwrap().is_none());
        assert!(store.load_metadata("stale").unwrap().is_none());
        assert_eq!(store.list_documents().unwrap(), vec!["live".to_string()]);
    }

    #[test]
    fn test_purge_expired() {
        let (_dir, store) = open_temp();
        store.set("a", b"1", Duration::ZERO).unwrap();
        store.set("b", b"2", Duration::ZERO).unwrap();
        store.set("c", b"3", DOCUMENT_TTL).unwrap();

        assert_eq!(store.purge_expired().unwrap(), 2);
        assert_eq!(store.purge_expired().unwrap(), 0);
        assert_eq!(store.get("c").unwrap().unwrap(), b"3".to_vec());
    }

    #[test]
    fn test_rewrite_after_expiry_restarts_version() {
        let (_dir, store) = open_temp();
        store.set("room", b"1", Duration::ZERO).unwrap();
        store.set("room", b"2", DOCUMENT_TTL).unwrap();
        assert_eq!(store.load_metadata("room").unwrap().unwrap().version, 1);
    }

    #[test]
    fn test_delete_document() {
        let (_dir, store) = open_temp();
        store.set("room", b"{}", DOCUMENT_TTL).unwrap();
        store.delete_document("room").unwrap();
        assert!(store.get("room").unwrap().is_none());
        assert!(store.list_documents().unwrap().is_empty());
    }

    #[test]
    fn test_large_document_compresses() {
        let (_dir, store) = open_temp();
        let doc = format!("{{\"text\":\"{}\"}}", "lorem ipsum ".repeat(10_000));
        store.set("big", doc.as_bytes(), DOCUMENT_TTL).unwrap();

        let meta = store.load_metadata("big").unwrap().unwrap();
        assert!(meta.compressed_size < meta.size / 10);
        assert_eq!(store.get("big").unwrap().unwrap(), doc.into_bytes());
    }

    #[test]
    fn test_reopen_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db");
        {
            let store = RocksStore::open(StoreConfig::for_testing(&path)).unwrap();
            store.set("room", b"{\"kept\":true}", DOCUMENT_TTL).unwrap();
            store.sync().unwrap();
        }
        let store = RocksStore::open(StoreConfig::for_testing(&path)).unwrap();
        assert_eq!(store.get("room").unwrap().unwrap(), b"{\"kept\":true}".to_vec());
    }

    #[test]
    fn test_store_config_default() {
        let config = StoreConfig::default();
        assert_eq!(config.path, PathBuf::from("jsonsync_data"));
        assert_eq!(config.bloom_filter_bits, 10);
        assert!(!config.sync_writes);
    }
}
