//! # Node Runtime Library
//!
//! This library exposes the runtime's modules for testing. The main entry
//! point is the `flo-indexer` binary in `main.rs`.
//!
//! ## Architecture
//!
//! ```text
//!                  ┌──────────────────────┐
//!  flod JSON-RPC ←─┤    FlodRpcClient     ├──→ LedgerNode / OutputSource / LedgerWallet
//!                  └──────────┬───────────┘
//!                             │ polled by
//!                  ┌──────────▼───────────┐
//!                  │   PollingNotifier    ├──→ LedgerNotification (mpsc)
//!                  └──────────────────────┘
//!                  ┌──────────────────────┐
//!                  │    IndexerRuntime    │  chain sync · ancestry · multipart
//!                  └──────────┬───────────┘
//!                             │
//!                  ┌──────────▼───────────┐
//!                  │ Memory / RocksDB     │  BlockStore + FragmentStore + StoreCommit
//!                  └──────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `config` - TOML plus environment configuration
//! - `telemetry` - `tracing` subscriber setup
//! - `adapters` - RPC client, notifier, storage backends
//! - `runtime` - service wiring and background tasks

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod config;
pub mod runtime;
pub mod telemetry;

pub use config::{ConfigError, NodeConfig, StorageBackend};
pub use runtime::{IndexerRuntime, RuntimeError, RuntimeOptions};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
