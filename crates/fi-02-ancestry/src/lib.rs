//! # FI-02 Ancestry
//!
//! Tracks unconfirmed-output ancestry for the addresses this node publishes
//! from, so several spends can be chained inside one block interval.
//!
//! **Subsystem ID:** 2
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Purpose
//!
//! The mempool caps how many unconfirmed transactions may chain off one
//! another. A multipart publish spends each part's change in the next part,
//! so the publisher needs to know, before funding a transaction, how long
//! the chain behind each candidate output already is.
//!
//! ## Model
//!
//! | Structure | Maps |
//! |-----------|------|
//! | forward | parent / ancestor → outputs below it |
//! | reverse | output → representative ancestor |
//! | chains | representative ancestor → members |
//!
//! Chains merge and never split. `select_inputs` skips unconfirmed outputs
//! whose chain reached the ancestor limit (25 by default).
//!
//! ## Module Structure
//!
//! ```text
//! fi-02-ancestry/
//! ├── domain/          # AncestryLinks, AncestryTracker, errors
//! ├── ports/           # AncestryApi (inbound) + OutputSource (outbound)
//! ├── application/     # AncestryRegistry (one async mutex per address)
//! └── config.rs        # AncestryConfig
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

// Re-exports
pub use application::{AncestryRegistry, TrackerHandle};
pub use config::{AncestryConfig, DEFAULT_ANCESTOR_LIMIT};
pub use domain::{
    AncestryError, AncestryLinks, AncestryTracker, BroadcastRecord, RawOutput, Selection,
};
pub use ports::{AncestryApi, MockOutputSource, OutputSource};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
