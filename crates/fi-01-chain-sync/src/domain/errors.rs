//! # Domain Errors
//!
//! Error types for chain synchronization.

use shared_bus::DeliveryError;
use shared_types::{LedgerError, StorageError};
use thiserror::Error;

/// Ring buffer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RingBufferError {
    /// Pop on an empty buffer.
    #[error("Ring buffer is empty")]
    Empty,

    /// Slot count is not a power of two of at least 2.
    #[error("Invalid slot count {0}: must be a power of two >= 2")]
    InvalidCapacity(usize),
}

/// Recent-block window errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WindowError {
    /// Underlying buffer error.
    #[error(transparent)]
    Buffer(#[from] RingBufferError),

    /// Push would leave a height gap.
    #[error("Block {got} does not follow window tip {tip}")]
    NotContiguous {
        /// Current tip height.
        tip: u64,
        /// Height that was pushed.
        got: u64,
    },
}

/// Chain synchronization errors.
#[derive(Debug, Error)]
pub enum ChainSyncError {
    /// The durable index and the ledger disagree at the indexed tip.
    /// Fatal: the index must not silently continue on a different chain.
    #[error("Indexed block {height} is {stored} but the ledger has {ledger}")]
    HashMismatch {
        /// Height of the indexed tip.
        height: u64,
        /// Hash stored in the index.
        stored: String,
        /// Hash the ledger reports.
        ledger: String,
    },

    /// A ledger-node call failed or timed out.
    #[error("Fetch failed: {0}")]
    FetchFailed(#[from] LedgerError),

    /// A storage write or read failed.
    #[error("Store failed: {0}")]
    StoreFailed(#[from] StorageError),

    /// The recent-block window rejected an operation.
    #[error("Window error: {0}")]
    Window(#[from] WindowError),

    /// The ledger's block at this height does not build on the indexed tip.
    /// Disconnect notifications are expected to follow.
    #[error("Ledger block {0} does not extend the indexed tip")]
    Diverged(u64),

    /// The operation was cancelled between blocks.
    #[error("Sync cancelled at height {0}")]
    Cancelled(u64),

    /// Embedded-data messages can no longer be handed on.
    #[error("Message delivery failed: {0}")]
    DeliveryFailed(#[from] DeliveryError),
}

impl ChainSyncError {
    /// Whether the sync loop must halt rather than retry.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::HashMismatch { .. })
    }
}
