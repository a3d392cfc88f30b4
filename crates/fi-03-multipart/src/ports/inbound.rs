//! # Inbound Ports
//!
//! What the runtime calls: fragment ingest and sweeps, and payload publishing.

use crate::domain::{FragmentError, PublishError, ReassemblerError};
use async_trait::async_trait;
use shared_types::{FloMessage, TxId};

/// What ingesting one message did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// No fragment prefix.
    NotFragment,
    /// Prefix present but the fragment failed validation.
    Rejected(FragmentError),
    /// Stored as a new pending fragment.
    Stored {
        /// Resolved reference.
        reference: String,
        /// Part index.
        part: u32,
    },
    /// A record stored from the mempool now has its containing block.
    Confirmed {
        /// Resolved reference.
        reference: String,
        /// Part index.
        part: u32,
    },
    /// A record for this txid already existed; nothing changed.
    Duplicate {
        /// Resolved reference.
        reference: String,
        /// Part index.
        part: u32,
    },
}

/// Result of one completion-and-staleness sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Another sweep held the lock; nothing ran.
    pub skipped: bool,
    /// Groups examined.
    pub groups: usize,
    /// Groups over the per-cycle cap, left for later.
    pub deferred: usize,
    /// References assembled and published.
    pub assembled: Vec<String>,
    /// References marked stale.
    pub stale: Vec<String>,
    /// Groups left pending because a chunk did not decode.
    pub decode_failures: usize,
}

/// Reassembler API - inbound port.
#[async_trait]
pub trait ReassemblerApi: Send + Sync {
    /// Validate and store a fragment carried by `message`.
    async fn ingest(&self, message: &FloMessage) -> Result<IngestOutcome, ReassemblerError>;

    /// Assemble complete sets and retire abandoned ones.
    async fn run_sweep(&self) -> Result<SweepReport, ReassemblerError>;
}

/// Publisher API - inbound port.
#[async_trait]
pub trait PublisherApi: Send + Sync {
    /// Publish `payload`, returning every broadcast txid in part order.
    async fn publish_payload(&self, payload: &[u8]) -> Result<Vec<TxId>, PublishError>;
}
