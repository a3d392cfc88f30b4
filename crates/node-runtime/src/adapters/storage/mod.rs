//! # Index Storage Adapters
//!
//! One store backs both chain sync's `BlockStore` and the reassembler's
//! `FragmentStore`. The runtime drives [`StoreCommit`] on a timer; every
//! successful commit becomes a `StorageCommitted` event.
//!
//! ## Backends
//!
//! | Backend | Feature | Durability |
//! |---------|---------|------------|
//! | [`MemoryIndexStore`] | - | process lifetime |
//! | `RocksDbIndexStore` | `rocksdb` | on disk, one column family per record kind |

use async_trait::async_trait;
use shared_types::StorageError;

pub mod memory;
#[cfg(feature = "rocksdb")]
pub mod rocksdb_adapter;

pub use memory::MemoryIndexStore;
#[cfg(feature = "rocksdb")]
pub use rocksdb_adapter::{
    RocksDbConfig, RocksDbIndexStore, CF_BLOCKS, CF_FRAGMENTS, CF_FRAGMENTS_PENDING, CF_HEIGHTS,
    CF_METADATA, CF_TRANSACTIONS, COLUMN_FAMILIES,
};

/// Commit cycle of a store.
#[async_trait]
pub trait StoreCommit: Send + Sync {
    /// Make everything written so far durable. Returns the new cycle number.
    async fn commit(&self) -> Result<u64, StorageError>;
}
