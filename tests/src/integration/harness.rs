//! # Shared Fixtures
//!
//! A ledger client assembled from the subsystem mocks, a handler that
//! records what it receives, and helpers to mine blocks from broadcasts.

use async_trait::async_trait;
use fi_01_chain_sync::{mock_block, mock_block_hash, LedgerNode, MockLedgerNode};
use fi_02_ancestry::{MockOutputSource, OutputSource, RawOutput};
use fi_03_multipart::{BuiltTransaction, LedgerWallet, MockLedgerWallet, TransactionRequest};
use parking_lot::Mutex;
use shared_bus::{FloDataHandler, HandlerError};
use shared_types::{
    BlockHeader, BlockRecord, BlockRef, Confirmation, FloMessage, LedgerError, TransactionRecord,
    TxId, UnspentOutput,
};
use std::sync::Arc;
use std::time::Duration;

/// Node, output source and wallet mocks behind one client.
#[derive(Default)]
pub struct TestLedger {
    /// Chain and mempool.
    pub node: MockLedgerNode,
    /// Outputs per address.
    pub outputs: MockOutputSource,
    /// Built and broadcast transactions.
    pub wallet: MockLedgerWallet,
}

impl TestLedger {
    /// Linear chain `0..=tip` on branch 0.
    pub fn linear(tip: u64) -> Arc<Self> {
        let ledger = Self::default();
        for height in 0..=tip {
            ledger.node.push_block(mock_block(height, 0, 0, &[]));
        }
        Arc::new(ledger)
    }

    /// Best-chain tip.
    pub fn tip(&self) -> BlockHeader {
        let mut height = 0;
        while self.node.block_at(height + 1).is_some() {
            height += 1;
        }
        self.node
            .block_at(height)
            .map(|b| b.header())
            .unwrap_or_default()
    }

    /// Give `address` `count` confirmed outputs of `value` satoshis each.
    pub fn fund(&self, address: &str, count: u8, value: u64) {
        let outputs = (0..count)
            .map(|n| RawOutput {
                output: UnspentOutput {
                    txid: format!("{:02x}", n.wrapping_add(0xa0)).repeat(32),
                    index: 0,
                    script: "76a914".to_string(),
                    value,
                    confirmations: 6,
                    address: address.to_string(),
                },
                spent: false,
                parents: Vec::new(),
            })
            .collect();
        self.outputs.set_outputs(address, outputs);
    }

    /// Mine every broadcast not yet mined into one block on top of the tip.
    pub fn mine_broadcasts(&self, already_mined: usize) -> BlockRecord {
        let tip = self.tip();
        let height = tip.height + 1;
        let hash = mock_block_hash(height, 0);
        let block_ref = BlockRef {
            height,
            hash: hash.clone(),
        };
        let time = tip.timestamp + 40;
        let transactions = self
            .wallet
            .broadcasts()
            .into_iter()
            .skip(already_mined)
            .map(|(txid, request)| TransactionRecord {
                txid,
                confirmation: Confirmation::InBlock(block_ref.clone()),
                flo_data: request.flo_data.into_bytes(),
                time,
                inputs: Vec::new(),
                outputs: Vec::new(),
            })
            .collect();
        let block = BlockRecord {
            height,
            hash,
            previous_hash: tip.hash,
            timestamp: time,
            transactions,
            orphaned: false,
        };
        self.node.push_block(block.clone());
        block
    }
}

#[async_trait]
impl LedgerNode for TestLedger {
    async fn get_block_count(&self) -> Result<u64, LedgerError> {
        self.node.get_block_count().await
    }

    async fn get_block_hash(&self, height: u64) -> Result<String, LedgerError> {
        self.node.get_block_hash(height).await
    }

    async fn get_block_verbose(&self, hash: &str) -> Result<BlockRecord, LedgerError> {
        self.node.get_block_verbose(hash).await
    }

    async fn get_block_header(&self, hash: &str) -> Result<BlockHeader, LedgerError> {
        self.node.get_block_header(hash).await
    }

    async fn get_transaction(&self, txid: &str) -> Result<TransactionRecord, LedgerError> {
        self.node.get_transaction(txid).await
    }

    async fn get_raw_mempool(&self) -> Result<Vec<TxId>, LedgerError> {
        self.node.get_raw_mempool().await
    }
}

#[async_trait]
impl OutputSource for TestLedger {
    async fn get_outputs(&self, address: &str) -> Result<Vec<RawOutput>, LedgerError> {
        self.outputs.get_outputs(address).await
    }
}

#[async_trait]
impl LedgerWallet for TestLedger {
    async fn build_transaction(
        &self,
        request: &TransactionRequest,
    ) -> Result<BuiltTransaction, LedgerError> {
        self.wallet.build_transaction(request).await
    }

    async fn broadcast(&self, raw: &str) -> Result<TxId, LedgerError> {
        self.wallet.broadcast(raw).await
    }
}

/// Records every message it is handed.
#[derive(Default)]
pub struct RecordingHandler {
    seen: Mutex<Vec<FloMessage>>,
}

impl RecordingHandler {
    /// Messages received so far.
    pub fn messages(&self) -> Vec<FloMessage> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl FloDataHandler for RecordingHandler {
    fn name(&self) -> &str {
        "recording"
    }

    async fn handle(&self, message: &FloMessage) -> Result<(), HandlerError> {
        self.seen.lock().push(message.clone());
        Ok(())
    }
}

/// Poll `check` every 10ms for up to five seconds.
pub async fn wait_until(what: &str, mut check: impl FnMut() -> bool) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

/// Deterministic bytes that compress poorly.
pub fn noisy_payload(len: usize, seed: u64) -> Vec<u8> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (state >> 33) as u8
        })
        .collect()
}
