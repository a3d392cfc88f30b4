//! # FI-03 Multipart
//!
//! Messages larger than one transaction's embedded-data field travel as a
//! chain of signed fragments. This crate reassembles incoming chains and
//! splits outgoing payloads into them.
//!
//! **Subsystem ID:** 3
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Wire Form
//!
//! ```text
//! oip-mp(<part>,<max>,<address>,<reference>,<signature>):<chunk>
//! ```
//!
//! | Field | Meaning |
//! |-------|---------|
//! | part | 0-based index |
//! | max | highest index in the set |
//! | address | FLO address of the signer |
//! | reference | part 0's txid (empty on part 0 itself) |
//! | signature | base64 compact signature over `part-max-address-prior-chunk` |
//! | chunk | raw text, `b64:` base64 or `z64:` base64 of zstd |
//!
//! Part 0 signs with 64 zeros in the `prior` position. The legacy
//! `alexandria-media-multipart(` prefix is still accepted on ingest.
//!
//! ## Lifecycle
//!
//! ```text
//! ingest ──▶ pending ──sweep──▶ complete ──▶ message sink (Reassembled)
//!                    └─sweep──▶ stale (past retention)
//! ```
//!
//! ## Module Structure
//!
//! ```text
//! fi-03-multipart/
//! ├── domain/          # wire, chunk codec, validation, reassembly, splitter
//! ├── ports/           # ReassemblerApi, PublisherApi + FragmentStore, LedgerWallet, TimeSource
//! ├── application/     # MultipartReassembler, MultipartPublisher
//! └── config.rs        # ReassemblerConfig, SplitterConfig
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

// Re-exports
pub use application::{MultipartPublisher, MultipartReassembler};
pub use config::{ReassemblerConfig, SplitterConfig, DEFAULT_DATA_LIMIT, DEFAULT_RETENTION_SECS};
pub use domain::{
    assemble, fragment_from_message, plan_chain, ChainPlan, ChunkEncoding, ChunkError,
    FragmentError, FragmentLayout, FragmentMessage, PublishError, ReassemblerError, SplitError,
    FRAGMENT_PREFIX,
};
pub use ports::{
    BuiltTransaction, FragmentStore, FragmentWrite, InMemoryFragmentStore, IngestOutcome, LedgerWallet,
    MockLedgerWallet, MockSigner, MockTimeSource, MockVerifier, PublisherApi, ReassemblerApi,
    SweepReport, SystemTimeSource, TimeSource, TransactionRequest,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
