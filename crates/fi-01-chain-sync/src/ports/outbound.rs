//! # Outbound Ports
//!
//! Traits for the ledger node and the block store, plus in-memory mocks used
//! by this crate's tests and the workspace integration tests.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use shared_types::{
    BlockHash, BlockHeader, BlockRecord, BlockRef, Confirmation, LedgerError, StorageError,
    TransactionRecord, TxId,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Ledger node - outbound port.
///
/// Calls may block on the network; the service wraps each one in its
/// configured timeout.
#[async_trait]
pub trait LedgerNode: Send + Sync {
    /// Height of the node's best chain tip.
    async fn get_block_count(&self) -> Result<u64, LedgerError>;

    /// Hash of the best-chain block at `height`.
    async fn get_block_hash(&self, height: u64) -> Result<BlockHash, LedgerError>;

    /// Full block with decoded transactions.
    async fn get_block_verbose(&self, hash: &str) -> Result<BlockRecord, LedgerError>;

    /// Header only, without transactions.
    async fn get_block_header(&self, hash: &str) -> Result<BlockHeader, LedgerError>;

    /// A single transaction, confirmed or not.
    async fn get_transaction(&self, txid: &str) -> Result<TransactionRecord, LedgerError>;

    /// Txids currently in the node's mempool.
    async fn get_raw_mempool(&self) -> Result<Vec<TxId>, LedgerError>;
}

/// Block store - outbound port.
///
/// Writes are idempotent, keyed by block hash / txid.
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Insert or overwrite a block and its transactions.
    async fn put_block(&self, block: &BlockRecord) -> Result<(), StorageError>;

    /// Insert or overwrite a transaction.
    async fn put_transaction(&self, tx: &TransactionRecord) -> Result<(), StorageError>;

    /// Highest block not marked orphaned.
    async fn get_last_block(&self) -> Result<Option<BlockRecord>, StorageError>;

    /// Flag a block orphaned and return its transactions to unconfirmed.
    /// Returns false if the block is unknown.
    ///
    /// A transaction already reassigned to another block is left alone.
    async fn mark_orphaned(&self, hash: &str) -> Result<bool, StorageError>;
}

// =============================================================================
// Mock Implementations for Testing
// =============================================================================

/// Deterministic block hash for mock chains: branch byte then height.
pub fn mock_block_hash(height: u64, branch: u8) -> BlockHash {
    format!("{branch:02x}{height:062x}")
}

/// Build a mock block on `branch` whose parent is on `parent_branch`.
pub fn mock_block(
    height: u64,
    branch: u8,
    parent_branch: u8,
    flo_data: &[&str],
) -> BlockRecord {
    let hash = mock_block_hash(height, branch);
    let block_ref = BlockRef {
        height,
        hash: hash.clone(),
    };
    let transactions = flo_data
        .iter()
        .enumerate()
        .map(|(i, data)| TransactionRecord {
            txid: format!("{branch:02x}{height:054x}{i:08x}"),
            confirmation: Confirmation::InBlock(block_ref.clone()),
            flo_data: data.as_bytes().to_vec(),
            time: 1_500_000_000 + height * 40,
            inputs: Vec::new(),
            outputs: Vec::new(),
        })
        .collect();
    BlockRecord {
        height,
        hash,
        previous_hash: mock_block_hash(height.saturating_sub(1), parent_branch),
        timestamp: 1_500_000_000 + height * 40,
        transactions,
        orphaned: false,
    }
}

/// Mock ledger node serving an in-memory best chain.
#[derive(Default)]
pub struct MockLedgerNode {
    chain: RwLock<Vec<BlockRecord>>,
    side_blocks: RwLock<HashMap<BlockHash, BlockRecord>>,
    mempool: RwLock<HashMap<String, TransactionRecord>>,
    fetch_log: Mutex<Vec<u64>>,
    /// Should return errors?
    pub should_fail: AtomicBool,
}

impl MockLedgerNode {
    /// Linear chain `0..=tip` on branch 0 with no transactions.
    pub fn linear(tip: u64) -> Self {
        let node = Self::default();
        for height in 0..=tip {
            node.push_block(mock_block(height, 0, 0, &[]));
        }
        node
    }

    /// Append a block to the best chain.
    pub fn push_block(&self, block: BlockRecord) {
        let mut chain = self.chain.write();
        let height = block.height as usize;
        if chain.len() > height {
            let replaced = chain.split_off(height);
            let mut side = self.side_blocks.write();
            for old in replaced {
                side.insert(old.hash.clone(), old);
            }
        }
        chain.push(block);
    }

    /// Replace the best chain from `block.height` upward (a reorg).
    pub fn reorg_to(&self, blocks: Vec<BlockRecord>) {
        for block in blocks {
            self.push_block(block);
        }
    }

    /// Add an unconfirmed transaction.
    pub fn add_mempool_tx(&self, tx: TransactionRecord) {
        self.mempool.write().insert(tx.txid.clone(), tx);
    }

    /// Best-chain block at `height`.
    pub fn block_at(&self, height: u64) -> Option<BlockRecord> {
        self.chain.read().get(height as usize).cloned()
    }

    /// Heights of every `get_block_verbose` call, in order.
    pub fn fetched_heights(&self) -> Vec<u64> {
        self.fetch_log.lock().clone()
    }

    /// Forget earlier fetches.
    pub fn clear_fetch_log(&self) {
        self.fetch_log.lock().clear();
    }

    fn check_failure(&self) -> Result<(), LedgerError> {
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(LedgerError::Transport("Mock failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerNode for MockLedgerNode {
    async fn get_block_count(&self) -> Result<u64, LedgerError> {
        self.check_failure()?;
        Ok(self.chain.read().len().saturating_sub(1) as u64)
    }

    async fn get_block_hash(&self, height: u64) -> Result<BlockHash, LedgerError> {
        self.check_failure()?;
        self.chain
            .read()
            .get(height as usize)
            .map(|b| b.hash.clone())
            .ok_or_else(|| LedgerError::NotFound(format!("height {height}")))
    }

    async fn get_block_verbose(&self, hash: &str) -> Result<BlockRecord, LedgerError> {
        self.check_failure()?;
        let block = self
            .chain
            .read()
            .iter()
            .find(|b| b.hash == hash)
            .cloned()
            .or_else(|| self.side_blocks.read().get(hash).cloned())
            .ok_or_else(|| LedgerError::NotFound(format!("block {hash}")))?;
        self.fetch_log.lock().push(block.height);
        Ok(block)
    }

    async fn get_block_header(&self, hash: &str) -> Result<BlockHeader, LedgerError> {
        self.check_failure()?;
        self.chain
            .read()
            .iter()
            .find(|b| b.hash == hash)
            .map(BlockRecord::header)
            .or_else(|| self.side_blocks.read().get(hash).map(BlockRecord::header))
            .ok_or_else(|| LedgerError::NotFound(format!("block {hash}")))
    }

    async fn get_transaction(&self, txid: &str) -> Result<TransactionRecord, LedgerError> {
        self.check_failure()?;
        if let Some(tx) = self.mempool.read().get(txid) {
            return Ok(tx.clone());
        }
        self.chain
            .read()
            .iter()
            .flat_map(|b| b.transactions.iter())
            .find(|tx| tx.txid == txid)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(format!("tx {txid}")))
    }

    async fn get_raw_mempool(&self) -> Result<Vec<TxId>, LedgerError> {
        self.check_failure()?;
        let mut txids: Vec<TxId> = self.mempool.read().keys().cloned().collect();
        txids.sort();
        Ok(txids)
    }
}

/// In-memory block store.
#[derive(Default)]
pub struct InMemoryBlockStore {
    blocks: RwLock<HashMap<BlockHash, BlockRecord>>,
    transactions: RwLock<HashMap<String, TransactionRecord>>,
    /// When set, each `mark_orphaned` waits for one permit.
    orphan_gate: Option<Arc<Semaphore>>,
    /// Should return errors?
    pub should_fail: AtomicBool,
}

impl InMemoryBlockStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store whose `mark_orphaned` blocks until `gate` has a permit.
    pub fn with_orphan_gate(gate: Arc<Semaphore>) -> Self {
        Self {
            orphan_gate: Some(gate),
            ..Self::default()
        }
    }

    /// Stored block by hash.
    pub fn block(&self, hash: &str) -> Option<BlockRecord> {
        self.blocks.read().get(hash).cloned()
    }

    /// Stored transaction by txid.
    pub fn transaction(&self, txid: &str) -> Option<TransactionRecord> {
        self.transactions.read().get(txid).cloned()
    }

    /// Number of stored blocks, orphaned included.
    pub fn block_count(&self) -> usize {
        self.blocks.read().len()
    }

    fn check_failure(&self) -> Result<(), StorageError> {
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(StorageError::DatabaseError("Mock failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl BlockStore for InMemoryBlockStore {
    async fn put_block(&self, block: &BlockRecord) -> Result<(), StorageError> {
        self.check_failure()?;
        let mut txs = self.transactions.write();
        for tx in &block.transactions {
            txs.insert(tx.txid.clone(), tx.clone());
        }
        self.blocks.write().insert(block.hash.clone(), block.clone());
        Ok(())
    }

    async fn put_transaction(&self, tx: &TransactionRecord) -> Result<(), StorageError> {
        self.check_failure()?;
        self.transactions.write().insert(tx.txid.clone(), tx.clone());
        Ok(())
    }

    async fn get_last_block(&self) -> Result<Option<BlockRecord>, StorageError> {
        self.check_failure()?;
        Ok(self
            .blocks
            .read()
            .values()
            .filter(|b| !b.orphaned)
            .max_by_key(|b| b.height)
            .cloned())
    }

    async fn mark_orphaned(&self, hash: &str) -> Result<bool, StorageError> {
        if let Some(gate) = &self.orphan_gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|e| StorageError::DatabaseError(e.to_string()))?;
            permit.forget();
        }
        self.check_failure()?;
        let txids: Vec<TxId> = match self.blocks.write().get_mut(hash) {
            Some(block) => {
                block.orphaned = true;
                block.transactions.iter().map(|tx| tx.txid.clone()).collect()
            }
            None => return Ok(false),
        };
        let mut transactions = self.transactions.write();
        for txid in txids {
            if let Some(tx) = transactions.get_mut(&txid) {
                if tx.block().is_some_and(|b| b.hash == hash) {
                    tx.confirmation = Confirmation::Unconfirmed;
                }
            }
        }
        Ok(true)
    }
}
