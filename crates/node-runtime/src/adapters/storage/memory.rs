//! In-memory index store for development and tests.

use async_trait::async_trait;
use fi_01_chain_sync::{BlockStore, InMemoryBlockStore};
use fi_03_multipart::{FragmentStore, FragmentWrite, InMemoryFragmentStore};
use shared_types::{
    BlockRecord, FragmentRecord, FragmentStatus, FragmentUpdate, StorageError, TransactionRecord,
};
use std::sync::atomic::{AtomicU64, Ordering};

use super::StoreCommit;

/// Blocks, transactions and fragments held in process memory.
#[derive(Default)]
pub struct MemoryIndexStore {
    blocks: InMemoryBlockStore,
    fragments: InMemoryFragmentStore,
    cycle: AtomicU64,
}

impl MemoryIndexStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Chain half of the store.
    pub fn blocks(&self) -> &InMemoryBlockStore {
        &self.blocks
    }

    /// Fragment half of the store.
    pub fn fragments(&self) -> &InMemoryFragmentStore {
        &self.fragments
    }
}

#[async_trait]
impl BlockStore for MemoryIndexStore {
    async fn put_block(&self, block: &BlockRecord) -> Result<(), StorageError> {
        self.blocks.put_block(block).await
    }

    async fn put_transaction(&self, tx: &TransactionRecord) -> Result<(), StorageError> {
        self.blocks.put_transaction(tx).await
    }

    async fn get_last_block(&self) -> Result<Option<BlockRecord>, StorageError> {
        self.blocks.get_last_block().await
    }

    async fn mark_orphaned(&self, hash: &str) -> Result<bool, StorageError> {
        self.blocks.mark_orphaned(hash).await
    }
}

#[async_trait]
impl FragmentStore for MemoryIndexStore {
    async fn put_fragment(&self, record: &FragmentRecord) -> Result<FragmentWrite, StorageError> {
        self.fragments.put_fragment(record).await
    }

    async fn query_fragments(
        &self,
        status: FragmentStatus,
        limit: usize,
    ) -> Result<Vec<FragmentRecord>, StorageError> {
        self.fragments.query_fragments(status, limit).await
    }

    async fn batch_update_fragments(&self, updates: &[FragmentUpdate]) -> Result<usize, StorageError> {
        self.fragments.batch_update_fragments(updates).await
    }
}

#[async_trait]
impl StoreCommit for MemoryIndexStore {
    async fn commit(&self) -> Result<u64, StorageError> {
        Ok(self.cycle.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fi_01_chain_sync::mock_block;

    #[tokio::test]
    async fn test_commit_cycles_increase() {
        let store = MemoryIndexStore::new();
        assert_eq!(store.commit().await.unwrap(), 1);
        assert_eq!(store.commit().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_delegates_to_both_halves() {
        let store = MemoryIndexStore::new();
        let block = mock_block(7, 0, 0, &["hello"]);
        store.put_block(&block).await.unwrap();
        assert_eq!(store.get_last_block().await.unwrap().unwrap().hash, block.hash);
        assert!(store.blocks().transaction(&block.transactions[0].txid).is_some());
        assert!(store.fragments().is_empty());
    }
}
