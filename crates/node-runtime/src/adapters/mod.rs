//! # Adapter Implementations
//!
//! Concrete implementations of the subsystems' outbound ports.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                     OUTER LAYER (Adapters)                       │
//! │   FlodRpcClient      PollingNotifier      MemoryIndexStore       │
//! │                                           RocksDbIndexStore      │
//! │                          ↑ implements ↑                          │
//! │   LedgerNode  OutputSource  LedgerWallet   BlockStore            │
//! │                                           FragmentStore          │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

pub mod ledger_rpc;
pub mod notifier;
pub mod storage;

pub use ledger_rpc::FlodRpcClient;
pub use notifier::PollingNotifier;
pub use storage::*;
