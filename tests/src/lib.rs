//! # Flo-Index Test Suite
//!
//! Cross-crate flows that no single subsystem crate can test alone.
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── src/integration/
//! │   ├── harness.rs         # combined ledger mock, recording handler, block mining
//! │   ├── sync_flow.rs       # notifier → chain sync → store, reorgs, mempool
//! │   └── multipart_flow.rs  # splitter ↔ reassembler round trips, publish → index
//! └── benches/
//!     └── indexer_benchmarks.rs
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p fi-tests
//! cargo bench -p fi-tests
//! ```

#![allow(dead_code)]

pub mod integration;
