//! # Core Domain Entities
//!
//! Defines the ledger entities the indexer persists and passes between
//! subsystems.
//!
//! ## Clusters
//!
//! - **Chain**: `BlockHeader`, `BlockRecord`, `TransactionRecord`
//! - **Spending**: `OutputKey`, `UnspentOutput`
//! - **Multipart**: `FragmentRecord`, `FragmentStatus`, `FragmentUpdate`
//! - **Messages**: `FloMessage`, `MessageOrigin`
//! - **Status**: `ChainStatus`

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

// =============================================================================
// CLUSTER A: THE CHAIN
// =============================================================================

/// A transaction id as reported by the ledger node (64 lowercase hex chars).
pub type TxId = String;

/// A block hash as reported by the ledger node (64 lowercase hex chars).
pub type BlockHash = String;

/// Block metadata kept in the recent-block window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BlockHeader {
    /// Block height in the chain.
    pub height: u64,
    /// Hash of this block.
    pub hash: BlockHash,
    /// Hash of the parent block.
    pub previous_hash: BlockHash,
    /// Block time (unix seconds).
    pub timestamp: u64,
}

/// A fully fetched block with its transactions.
///
/// Identity is `hash`. Blocks are never deleted; a disconnected block is
/// flagged `orphaned` instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BlockRecord {
    /// Block height in the chain.
    pub height: u64,
    /// Hash of this block.
    pub hash: BlockHash,
    /// Hash of the parent block.
    pub previous_hash: BlockHash,
    /// Block time (unix seconds).
    pub timestamp: u64,
    /// Transactions in block order.
    pub transactions: Vec<TransactionRecord>,
    /// Set once the block has been disconnected from the best chain.
    pub orphaned: bool,
}

impl BlockRecord {
    /// The header view of this block.
    #[must_use]
    pub fn header(&self) -> BlockHeader {
        BlockHeader {
            height: self.height,
            hash: self.hash.clone(),
            previous_hash: self.previous_hash.clone(),
            timestamp: self.timestamp,
        }
    }

    /// A reference to this block for transaction context.
    #[must_use]
    pub fn block_ref(&self) -> BlockRef {
        BlockRef {
            height: self.height,
            hash: self.hash.clone(),
        }
    }
}

/// Height and hash of the block containing a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockRef {
    /// Block height.
    pub height: u64,
    /// Block hash.
    pub hash: BlockHash,
}

/// Confirmation state of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Confirmation {
    /// Seen in the mempool only.
    #[default]
    Unconfirmed,
    /// Included in a block on the best chain.
    InBlock(BlockRef),
}

/// An input spending a prior output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    /// Transaction id of the spent output.
    pub txid: TxId,
    /// Index of the spent output.
    pub vout: u32,
}

impl TxInput {
    /// Key of the output this input spends.
    #[must_use]
    pub fn spent_key(&self) -> OutputKey {
        OutputKey::new(self.txid.clone(), self.vout)
    }
}

/// An output created by a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    /// Value in satoshis.
    pub value: u64,
    /// Hex-encoded locking script.
    pub script: String,
    /// Output index within the transaction.
    pub index: u32,
    /// Address the script pays to, when the node could decode one.
    pub address: Option<String>,
}

/// A ledger transaction as observed by the indexer.
///
/// Identity is `txid`. Only `confirmation` changes after first observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TransactionRecord {
    /// Transaction id.
    pub txid: TxId,
    /// Containing block, or unconfirmed.
    pub confirmation: Confirmation,
    /// Embedded-data field. May be empty.
    pub flo_data: Vec<u8>,
    /// Block time, or first-seen time for unconfirmed transactions.
    pub time: u64,
    /// Inputs in order.
    pub inputs: Vec<TxInput>,
    /// Outputs in order.
    pub outputs: Vec<TxOutput>,
}

impl TransactionRecord {
    /// Whether the embedded-data field carries anything.
    #[must_use]
    pub fn has_flo_data(&self) -> bool {
        !self.flo_data.is_empty()
    }

    /// Containing block, if confirmed.
    #[must_use]
    pub fn block(&self) -> Option<&BlockRef> {
        match &self.confirmation {
            Confirmation::InBlock(block) => Some(block),
            Confirmation::Unconfirmed => None,
        }
    }

    /// Build the message downstream consumers receive for this transaction.
    #[must_use]
    pub fn to_message(&self) -> FloMessage {
        FloMessage {
            txid: self.txid.clone(),
            block: self.block().cloned(),
            time: self.time,
            data: self.flo_data.clone(),
            origin: MessageOrigin::Transaction,
        }
    }
}

// =============================================================================
// CLUSTER B: SPENDING
// =============================================================================

/// Identifies an output by `txid:index`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutputKey {
    /// Transaction id.
    pub txid: TxId,
    /// Output index.
    pub index: u32,
}

impl OutputKey {
    /// Create a key.
    pub fn new(txid: impl Into<TxId>, index: u32) -> Self {
        Self {
            txid: txid.into(),
            index,
        }
    }
}

impl fmt::Display for OutputKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.index)
    }
}

/// A spendable output belonging to a controlled address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnspentOutput {
    /// Transaction id.
    pub txid: TxId,
    /// Output index.
    pub index: u32,
    /// Hex-encoded locking script.
    pub script: String,
    /// Value in satoshis.
    pub value: u64,
    /// Confirmations; zero means the output is in the mempool.
    pub confirmations: u32,
    /// Address the output pays to.
    pub address: String,
}

impl UnspentOutput {
    /// Key of this output.
    #[must_use]
    pub fn key(&self) -> OutputKey {
        OutputKey::new(self.txid.clone(), self.index)
    }

    /// Whether the output is still in the mempool.
    #[must_use]
    pub fn is_unconfirmed(&self) -> bool {
        self.confirmations == 0
    }
}

// =============================================================================
// CLUSTER C: MULTIPART
// =============================================================================

/// Persistence status of a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FragmentStatus {
    /// Awaiting the rest of its set.
    Pending,
    /// Its set has been assembled.
    Complete,
    /// Its set was abandoned after the retention window.
    Stale,
}

/// One transaction's share of a multipart message.
///
/// Identity is `txid`; at most one record exists per transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentRecord {
    /// Reference shared by every fragment of one logical message.
    pub reference: String,
    /// Index of this part.
    pub part: u32,
    /// Declared highest part index (total parts - 1).
    pub max: u32,
    /// Encoded payload chunk, exactly as carried on the wire.
    pub chunk: String,
    /// Address that signed this fragment.
    pub address: String,
    /// Base64 compact signature.
    pub signature: String,
    /// Transaction carrying this fragment.
    pub txid: TxId,
    /// Containing block, if confirmed when ingested.
    pub block: Option<BlockRef>,
    /// Block or first-seen time (unix seconds).
    pub time: u64,
    /// Set once the whole set has been assembled.
    pub complete: bool,
    /// Set once the set has been abandoned.
    pub stale: bool,
    /// Assembled logical message, stored on every member once complete.
    pub assembled: Option<Vec<u8>>,
}

impl FragmentRecord {
    /// Adopt the containing block of a later sighting of the same
    /// transaction.
    ///
    /// Only a confirmed sighting with a different block counts; flags,
    /// chunk and assembly stay as stored. Returns whether anything changed.
    pub fn adopt_confirmation(&mut self, seen: &FragmentRecord) -> bool {
        if seen.block.is_none() || seen.block == self.block {
            return false;
        }
        self.block = seen.block.clone();
        self.time = seen.time;
        true
    }

    /// Current status derived from the flags.
    #[must_use]
    pub fn status(&self) -> FragmentStatus {
        if self.complete {
            FragmentStatus::Complete
        } else if self.stale {
            FragmentStatus::Stale
        } else {
            FragmentStatus::Pending
        }
    }
}

/// A batched change to stored fragments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FragmentUpdate {
    /// Mark the fragment complete and attach the assembled message.
    Complete {
        /// Fragment transaction.
        txid: TxId,
        /// Assembled logical message.
        assembled: Vec<u8>,
    },
    /// Mark the fragment stale.
    Stale {
        /// Fragment transaction.
        txid: TxId,
    },
}

impl FragmentUpdate {
    /// Transaction the update applies to.
    #[must_use]
    pub fn txid(&self) -> &str {
        match self {
            Self::Complete { txid, .. } | Self::Stale { txid } => txid,
        }
    }

    /// Apply the update to a record.
    pub fn apply(&self, record: &mut FragmentRecord) {
        match self {
            Self::Complete { assembled, .. } => {
                record.complete = true;
                record.assembled = Some(assembled.clone());
            }
            Self::Stale { .. } => record.stale = true,
        }
    }
}

// =============================================================================
// CLUSTER D: MESSAGES
// =============================================================================

/// Where a message delivered to handlers came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageOrigin {
    /// The embedded data of a single transaction.
    Transaction,
    /// A logical message stitched from a multipart set.
    Reassembled {
        /// Reference of the set.
        reference: String,
        /// Number of parts.
        parts: u32,
    },
}

/// An embedded-data message with its transaction context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloMessage {
    /// Carrying transaction (part 0's transaction for reassembled messages).
    pub txid: TxId,
    /// Containing block, if confirmed.
    pub block: Option<BlockRef>,
    /// Block or first-seen time.
    pub time: u64,
    /// Message bytes.
    pub data: Vec<u8>,
    /// Where the message came from.
    pub origin: MessageOrigin,
}

impl FloMessage {
    /// Message text, lossily decoded.
    #[must_use]
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.data)
    }

    /// Whether the message bytes start with `tag`.
    #[must_use]
    pub fn has_prefix(&self, tag: &str) -> bool {
        self.data.starts_with(tag.as_bytes())
    }
}

// =============================================================================
// CLUSTER E: STATUS
// =============================================================================

/// Snapshot of sync progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ChainStatus {
    /// True while the initial catch-up is running.
    pub is_initial_sync: bool,
    /// Height of the newest indexed block.
    pub indexed_height: u64,
    /// Timestamp of the newest indexed block.
    pub indexed_timestamp: u64,
    /// Height of the ledger node's tip.
    pub ledger_tip_height: u64,
}
