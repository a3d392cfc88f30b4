//! # Inbound Ports
//!
//! The API chain sync exposes to the runtime and the notification feed it
//! consumes.

use crate::domain::ChainSyncError;
use async_trait::async_trait;
use shared_types::{BlockHeader, ChainStatus, TxId};
use tokio_util::sync::CancellationToken;

/// A notification from the ledger node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerNotification {
    /// A block joined the best chain.
    BlockConnected(BlockHeader),
    /// A block left the best chain.
    BlockDisconnected(BlockHeader),
    /// A transaction entered the mempool.
    TransactionAccepted(TxId),
}

/// What a connect notification led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// The block extended the tip directly.
    Indexed {
        /// Indexed height.
        height: u64,
    },
    /// Missing heights were fetched, ending at `to`.
    GapFilled {
        /// First height indexed by the fill.
        from: u64,
        /// Last height indexed by the fill.
        to: u64,
    },
    /// Another gap fill is running; it will extend to this height.
    Deferred {
        /// Height handed to the running fill.
        target: u64,
    },
    /// At or behind the tip; logged only.
    Ignored {
        /// Height of the ignored block.
        height: u64,
    },
}

/// Chain sync API - inbound port.
#[async_trait]
pub trait ChainSyncApi: Send + Sync {
    /// Catch up to `target_height`, returning the final indexed header.
    async fn initial_sync(
        &self,
        cancel: &CancellationToken,
        target_height: u64,
    ) -> Result<BlockHeader, ChainSyncError>;

    /// Process one ledger notification.
    async fn handle_notification(
        &self,
        notification: LedgerNotification,
        cancel: &CancellationToken,
    ) -> Result<(), ChainSyncError>;

    /// Current sync status.
    async fn status(&self) -> Result<ChainStatus, ChainSyncError>;
}
