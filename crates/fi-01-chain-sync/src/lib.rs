//! # FI-01 Chain Sync
//!
//! Keeps the index on the ledger node's best chain.
//!
//! **Subsystem ID:** 1
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Purpose
//!
//! Applies block-connected, block-disconnected and transaction-accepted
//! notifications so that indexed state never observes a torn view of the
//! chain:
//! - direct continuations are fetched, persisted and announced;
//! - gaps are filled height by height by a single filler at a time;
//! - disconnect bursts finish before any connect touches the window.
//!
//! ## Guarantees
//!
//! | Guarantee | Mechanism |
//! |-----------|-----------|
//! | No connect during unwind | Disconnect gate checked before and after locking the window |
//! | Single-flight gap fill | `GapFillSlot` with deferred targets |
//! | Whole blocks only | One `put_block` per block; cancellation checked between blocks |
//! | Safe restarts | Idempotent writes keyed by hash / txid; tip hash verified at start-up |
//!
//! ## Module Structure
//!
//! ```text
//! fi-01-chain-sync/
//! ├── domain/          # BlockRingBuffer, RecentBlockWindow, errors
//! ├── ports/           # ChainSyncApi (inbound) + LedgerNode, BlockStore (outbound)
//! ├── application/     # ChainSyncService
//! └── config.rs        # ChainSyncConfig
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

// Re-exports
pub use application::ChainSyncService;
pub use config::ChainSyncConfig;
pub use domain::{
    BlockPlacement, BlockRingBuffer, ChainSyncError, RecentBlockWindow, RingBufferError,
    WindowError, DEFAULT_WINDOW_SLOTS,
};
pub use ports::{
    mock_block, mock_block_hash, BlockStore, ChainSyncApi, ConnectOutcome, InMemoryBlockStore,
    LedgerNode, LedgerNotification, MockLedgerNode,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
