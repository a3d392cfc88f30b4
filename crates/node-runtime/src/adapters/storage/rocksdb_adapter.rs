//! # RocksDB Index Store
//!
//! Durable backend for blocks, transactions and multipart fragments.
//!
//! ## Column Families
//!
//! | Family | Key | Value |
//! |--------|-----|-------|
//! | `blocks` | block hash | bincode `BlockRecord` |
//! | `heights` | height (u64 BE) ‖ block hash | empty |
//! | `transactions` | txid | bincode `TransactionRecord` |
//! | `fragments` | txid | bincode `FragmentRecord` |
//! | `fragments_pending` | time (u64 BE) ‖ txid | empty |
//! | `metadata` | name | raw bytes |
//!
//! `heights` sorts blocks by height so the last unorphaned block is a
//! reverse scan. `fragments_pending` holds an entry per fragment still
//! awaiting its set, oldest first; a record leaves it when it turns
//! complete or stale, so sweeps never read retired fragments.
//! Multi-record writes go through one `WriteBatch`.

use async_trait::async_trait;
use fi_01_chain_sync::BlockStore;
use fi_03_multipart::{FragmentStore, FragmentWrite};
use parking_lot::Mutex;
use rocksdb::{ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, WriteOptions, DB};
use serde::{de::DeserializeOwned, Serialize};
use shared_types::{
    BlockRecord, Confirmation, FragmentRecord, FragmentStatus, FragmentUpdate, StorageError,
    TransactionRecord,
};
use std::path::PathBuf;
use tracing::debug;

use super::StoreCommit;

/// Block records by hash.
pub const CF_BLOCKS: &str = "blocks";
/// Height index.
pub const CF_HEIGHTS: &str = "heights";
/// Transaction records by txid.
pub const CF_TRANSACTIONS: &str = "transactions";
/// Fragment records by txid.
pub const CF_FRAGMENTS: &str = "fragments";
/// Pending fragments by time.
pub const CF_FRAGMENTS_PENDING: &str = "fragments_pending";
/// Commit counter and similar bookkeeping.
pub const CF_METADATA: &str = "metadata";

/// All column families used by the index.
pub const COLUMN_FAMILIES: &[&str] = &[
    CF_BLOCKS,
    CF_HEIGHTS,
    CF_TRANSACTIONS,
    CF_FRAGMENTS,
    CF_FRAGMENTS_PENDING,
    CF_METADATA,
];

const KEY_COMMIT_CYCLE: &[u8] = b"commit_cycle";

/// RocksDB tuning.
#[derive(Debug, Clone)]
pub struct RocksDbConfig {
    /// Database directory.
    pub path: PathBuf,
    /// Block cache size in bytes (default: 128MB)
    pub block_cache_size: usize,
    /// Write buffer size in bytes (default: 32MB)
    pub write_buffer_size: usize,
    /// fsync every write (default: false; commit flushes instead)
    pub sync_writes: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/index"),
            block_cache_size: 128 * 1024 * 1024,
            write_buffer_size: 32 * 1024 * 1024,
            sync_writes: false,
        }
    }
}

impl RocksDbConfig {
    /// Create config for testing (small buffers)
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 8 * 1024 * 1024,
            write_buffer_size: 4 * 1024 * 1024,
            sync_writes: false,
        }
    }
}

/// RocksDB-backed index store.
pub struct RocksDbIndexStore {
    db: DB,
    config: RocksDbConfig,
    /// Serializes fragment read-modify-write sequences.
    fragment_lock: Mutex<()>,
}

fn db_err(context: &str, e: rocksdb::Error) -> StorageError {
    StorageError::DatabaseError(format!("RocksDB {context} failed: {e}"))
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    bincode::serialize(value).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    bincode::deserialize(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn height_key(height: u64, hash: &str) -> Vec<u8> {
    let mut key = height.to_be_bytes().to_vec();
    key.extend_from_slice(hash.as_bytes());
    key
}

fn pending_key(record: &FragmentRecord) -> Vec<u8> {
    let mut key = record.time.to_be_bytes().to_vec();
    key.extend_from_slice(record.txid.as_bytes());
    key
}

impl RocksDbIndexStore {
    /// Open or create the database.
    pub fn open(config: RocksDbConfig) -> Result<Self, StorageError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_write_buffer_size(config.write_buffer_size);
        opts.set_compression_type(rocksdb::DBCompressionType::Snappy);

        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        block_opts.set_block_cache(&rocksdb::Cache::new_lru_cache(config.block_cache_size));
        opts.set_block_based_table_factory(&block_opts);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = COLUMN_FAMILIES
            .iter()
            .map(|name| {
                let mut cf_opts = Options::default();
                cf_opts.set_compression_type(rocksdb::DBCompressionType::Snappy);
                ColumnFamilyDescriptor::new(*name, cf_opts)
            })
            .collect();

        let db = DB::open_cf_descriptors(&opts, &config.path, cf_descriptors)
            .map_err(|e| db_err("open", e))?;
        debug!(path = %config.path.display(), "Opened index database");

        Ok(Self {
            db,
            config,
            fragment_lock: Mutex::new(()),
        })
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StorageError::DatabaseError(format!("Missing column family {name}")))
    }

    fn write_opts(&self) -> WriteOptions {
        let mut opts = WriteOptions::default();
        opts.set_sync(self.config.sync_writes);
        opts
    }

    fn write(&self, batch: WriteBatch) -> Result<(), StorageError> {
        self.db
            .write_opt(batch, &self.write_opts())
            .map_err(|e| db_err("batch write", e))
    }

    fn get<T: DeserializeOwned>(&self, cf: &str, key: &[u8]) -> Result<Option<T>, StorageError> {
        match self.db.get_cf(self.cf(cf)?, key).map_err(|e| db_err("get", e))? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Stored block by hash.
    pub fn block(&self, hash: &str) -> Result<Option<BlockRecord>, StorageError> {
        self.get(CF_BLOCKS, hash.as_bytes())
    }

    /// Stored transaction by txid.
    pub fn transaction(&self, txid: &str) -> Result<Option<TransactionRecord>, StorageError> {
        self.get(CF_TRANSACTIONS, txid.as_bytes())
    }

    /// Stored fragment by txid.
    pub fn fragment(&self, txid: &str) -> Result<Option<FragmentRecord>, StorageError> {
        self.get(CF_FRAGMENTS, txid.as_bytes())
    }

    /// Last committed cycle, 0 if never committed.
    pub fn commit_cycle(&self) -> Result<u64, StorageError> {
        let raw = self
            .db
            .get_cf(self.cf(CF_METADATA)?, KEY_COMMIT_CYCLE)
            .map_err(|e| db_err("get", e))?;
        Ok(raw
            .and_then(|bytes| <[u8; 8]>::try_from(bytes.as_slice()).ok())
            .map(u64::from_be_bytes)
            .unwrap_or(0))
    }
}

#[async_trait]
impl BlockStore for RocksDbIndexStore {
    async fn put_block(&self, block: &BlockRecord) -> Result<(), StorageError> {
        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(CF_BLOCKS)?, block.hash.as_bytes(), encode(block)?);
        batch.put_cf(self.cf(CF_HEIGHTS)?, height_key(block.height, &block.hash), b"");
        let txs = self.cf(CF_TRANSACTIONS)?;
        for tx in &block.transactions {
            batch.put_cf(txs, tx.txid.as_bytes(), encode(tx)?);
        }
        self.write(batch)
    }

    async fn put_transaction(&self, tx: &TransactionRecord) -> Result<(), StorageError> {
        self.db
            .put_cf_opt(self.cf(CF_TRANSACTIONS)?, tx.txid.as_bytes(), encode(tx)?, &self.write_opts())
            .map_err(|e| db_err("put", e))
    }

    async fn get_last_block(&self) -> Result<Option<BlockRecord>, StorageError> {
        for item in self.db.iterator_cf(self.cf(CF_HEIGHTS)?, IteratorMode::End) {
            let (key, _) = item.map_err(|e| db_err("scan", e))?;
            let hash = String::from_utf8_lossy(&key[8.min(key.len())..]).into_owned();
            match self.block(&hash)? {
                Some(block) if !block.orphaned => return Ok(Some(block)),
                _ => continue,
            }
        }
        Ok(None)
    }

    async fn mark_orphaned(&self, hash: &str) -> Result<bool, StorageError> {
        let Some(mut block) = self.block(hash)? else {
            return Ok(false);
        };
        block.orphaned = true;
        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(CF_BLOCKS)?, hash.as_bytes(), encode(&block)?);

        let txs = self.cf(CF_TRANSACTIONS)?;
        for txid in block.transactions.iter().map(|tx| &tx.txid) {
            let Some(mut tx) = self.transaction(txid)? else {
                continue;
            };
            if tx.block().is_some_and(|b| b.hash == hash) {
                tx.confirmation = Confirmation::Unconfirmed;
                batch.put_cf(txs, txid.as_bytes(), encode(&tx)?);
            }
        }
        self.write(batch)?;
        Ok(true)
    }
}

#[async_trait]
impl FragmentStore for RocksDbIndexStore {
    async fn put_fragment(&self, record: &FragmentRecord) -> Result<FragmentWrite, StorageError> {
        let _guard = self.fragment_lock.lock();
        let fragments = self.cf(CF_FRAGMENTS)?;
        let pending = self.cf(CF_FRAGMENTS_PENDING)?;
        let mut batch = WriteBatch::default();

        let outcome = match self.fragment(&record.txid)? {
            None => {
                batch.put_cf(fragments, record.txid.as_bytes(), encode(record)?);
                if record.status() == FragmentStatus::Pending {
                    batch.put_cf(pending, pending_key(record), b"");
                }
                FragmentWrite::Inserted
            }
            Some(mut stored) => {
                let old_key = pending_key(&stored);
                if !stored.adopt_confirmation(record) {
                    return Ok(FragmentWrite::Unchanged);
                }
                batch.put_cf(fragments, stored.txid.as_bytes(), encode(&stored)?);
                if stored.status() == FragmentStatus::Pending {
                    // The key embeds the time, which confirmation may change.
                    batch.delete_cf(pending, old_key);
                    batch.put_cf(pending, pending_key(&stored), b"");
                }
                FragmentWrite::Confirmed
            }
        };
        self.write(batch)?;
        Ok(outcome)
    }

    async fn query_fragments(
        &self,
        status: FragmentStatus,
        limit: usize,
    ) -> Result<Vec<FragmentRecord>, StorageError> {
        if status == FragmentStatus::Pending {
            let mut matching = Vec::new();
            for item in self.db.iterator_cf(self.cf(CF_FRAGMENTS_PENDING)?, IteratorMode::Start) {
                if matching.len() >= limit {
                    break;
                }
                let (key, _) = item.map_err(|e| db_err("scan", e))?;
                let txid = String::from_utf8_lossy(&key[8.min(key.len())..]).into_owned();
                if let Some(record) = self.fragment(&txid)? {
                    matching.push(record);
                }
            }
            return Ok(matching);
        }

        // Retired records have no index; a full scan is fine off the sweep path.
        let mut matching = Vec::new();
        for item in self.db.iterator_cf(self.cf(CF_FRAGMENTS)?, IteratorMode::Start) {
            let (_, value) = item.map_err(|e| db_err("scan", e))?;
            let record: FragmentRecord = decode(&value)?;
            if record.status() == status {
                matching.push(record);
            }
        }
        matching.sort_by(|a, b| a.time.cmp(&b.time).then_with(|| a.txid.cmp(&b.txid)));
        matching.truncate(limit);
        Ok(matching)
    }

    async fn batch_update_fragments(&self, updates: &[FragmentUpdate]) -> Result<usize, StorageError> {
        let _guard = self.fragment_lock.lock();
        let fragments = self.cf(CF_FRAGMENTS)?;
        let pending = self.cf(CF_FRAGMENTS_PENDING)?;
        let mut batch = WriteBatch::default();
        let mut changed = 0;
        for update in updates {
            if let Some(mut record) = self.fragment(update.txid())? {
                let was_pending = record.status() == FragmentStatus::Pending;
                update.apply(&mut record);
                batch.put_cf(fragments, update.txid().as_bytes(), encode(&record)?);
                if was_pending && record.status() != FragmentStatus::Pending {
                    batch.delete_cf(pending, pending_key(&record));
                }
                changed += 1;
            }
        }
        self.write(batch)?;
        Ok(changed)
    }
}

#[async_trait]
impl StoreCommit for RocksDbIndexStore {
    async fn commit(&self) -> Result<u64, StorageError> {
        let cycle = self.commit_cycle()? + 1;
        self.db
            .put_cf_opt(self.cf(CF_METADATA)?, KEY_COMMIT_CYCLE, cycle.to_be_bytes(), &self.write_opts())
            .map_err(|e| db_err("put", e))?;
        for name in COLUMN_FAMILIES {
            self.db.flush_cf(self.cf(name)?).map_err(|e| db_err("flush", e))?;
        }
        Ok(cycle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fi_01_chain_sync::mock_block;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> RocksDbIndexStore {
        RocksDbIndexStore::open(RocksDbConfig::for_testing(dir.path())).unwrap()
    }

    fn fragment(txid: &str, time: u64) -> FragmentRecord {
        FragmentRecord {
            reference: "ref".to_string(),
            part: 0,
            max: 1,
            chunk: "chunk".to_string(),
            address: "FAddr".to_string(),
            signature: "sig".to_string(),
            txid: txid.to_string(),
            block: None,
            time,
            complete: false,
            stale: false,
            assembled: None,
        }
    }

    #[tokio::test]
    async fn test_last_block_skips_orphans() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        assert!(store.get_last_block().await.unwrap().is_none());

        let b9 = mock_block(9, 0, 0, &["a"]);
        let b10 = mock_block(10, 0, 0, &[]);
        store.put_block(&b9).await.unwrap();
        store.put_block(&b10).await.unwrap();
        assert_eq!(store.get_last_block().await.unwrap().unwrap().hash, b10.hash);

        assert!(store.mark_orphaned(&b10.hash).await.unwrap());
        assert_eq!(store.get_last_block().await.unwrap().unwrap().hash, b9.hash);
        assert!(!store.mark_orphaned("unknown").await.unwrap());
        assert!(store.transaction(&b9.transactions[0].txid).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_fragment_insert_if_absent_and_update() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        assert_eq!(store.put_fragment(&fragment("t2", 20)).await.unwrap(), FragmentWrite::Inserted);
        assert_eq!(store.put_fragment(&fragment("t1", 10)).await.unwrap(), FragmentWrite::Inserted);
        assert_eq!(store.put_fragment(&fragment("t1", 99)).await.unwrap(), FragmentWrite::Unchanged);

        let pending = store.query_fragments(FragmentStatus::Pending, 10).await.unwrap();
        let order: Vec<&str> = pending.iter().map(|r| r.txid.as_str()).collect();
        assert_eq!(order, vec!["t1", "t2"]);
        assert_eq!(pending[0].time, 10);

        let changed = store
            .batch_update_fragments(&[
                FragmentUpdate::Complete {
                    txid: "t1".to_string(),
                    assembled: b"whole".to_vec(),
                },
                FragmentUpdate::Stale {
                    txid: "missing".to_string(),
                },
            ])
            .await
            .unwrap();
        assert_eq!(changed, 1);
        let done = store.query_fragments(FragmentStatus::Complete, 10).await.unwrap();
        assert_eq!(done[0].assembled.as_deref(), Some(&b"whole"[..]));
    }

    #[tokio::test]
    async fn test_retired_fragments_leave_pending_index() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        for (txid, time) in [("t1", 10), ("t2", 20), ("t3", 30)] {
            store.put_fragment(&fragment(txid, time)).await.unwrap();
        }
        let index = store.cf(CF_FRAGMENTS_PENDING).unwrap();
        assert_eq!(store.db.iterator_cf(index, IteratorMode::Start).count(), 3);

        store
            .batch_update_fragments(&[
                FragmentUpdate::Complete {
                    txid: "t1".to_string(),
                    assembled: b"x".to_vec(),
                },
                FragmentUpdate::Stale {
                    txid: "t3".to_string(),
                },
            ])
            .await
            .unwrap();

        assert_eq!(store.db.iterator_cf(index, IteratorMode::Start).count(), 1);
        let pending = store.query_fragments(FragmentStatus::Pending, 10).await.unwrap();
        let txids: Vec<&str> = pending.iter().map(|r| r.txid.as_str()).collect();
        assert_eq!(txids, vec!["t2"]);
        assert_eq!(store.query_fragments(FragmentStatus::Stale, 10).await.unwrap().len(), 1);
        assert_eq!(store.query_fragments(FragmentStatus::Pending, 0).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_confirmation_moves_pending_entry() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        store.put_fragment(&fragment("t1", 50)).await.unwrap();
        store.put_fragment(&fragment("t2", 60)).await.unwrap();

        let mut mined = fragment("t2", 40);
        mined.block = Some(shared_types::BlockRef {
            height: 12,
            hash: "h12".to_string(),
        });
        assert_eq!(store.put_fragment(&mined).await.unwrap(), FragmentWrite::Confirmed);

        let pending = store.query_fragments(FragmentStatus::Pending, 10).await.unwrap();
        let txids: Vec<&str> = pending.iter().map(|r| r.txid.as_str()).collect();
        assert_eq!(txids, vec!["t2", "t1"]);
        assert_eq!(pending[0].block.as_ref().map(|b| b.height), Some(12));
        let index = store.cf(CF_FRAGMENTS_PENDING).unwrap();
        assert_eq!(store.db.iterator_cf(index, IteratorMode::Start).count(), 2);
    }

    #[tokio::test]
    async fn test_orphaned_block_unconfirms_transactions() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let block = mock_block(12, 0, 0, &["note"]);
        store.put_block(&block).await.unwrap();

        assert!(store.mark_orphaned(&block.hash).await.unwrap());
        let tx = store.transaction(&block.transactions[0].txid).unwrap().unwrap();
        assert_eq!(tx.confirmation, Confirmation::Unconfirmed);
    }

    #[tokio::test]
    async fn test_data_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let block = mock_block(3, 0, 0, &[]);
        {
            let store = open(&dir);
            store.put_block(&block).await.unwrap();
            store.put_fragment(&fragment("t1", 1)).await.unwrap();
            assert_eq!(store.commit().await.unwrap(), 1);
        }
        let store = open(&dir);
        assert_eq!(store.get_last_block().await.unwrap().unwrap().hash, block.hash);
        assert!(store.fragment("t1").unwrap().is_some());
        assert_eq!(store.commit_cycle().unwrap(), 1);
        assert_eq!(store.commit().await.unwrap(), 2);
    }
}
