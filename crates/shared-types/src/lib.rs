//! # Shared Types Crate
//!
//! Ledger entities and error types shared by the chain-sync, ancestry and
//! multipart subsystems.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: All cross-subsystem types are defined here.
//! - **Hex identities**: Transaction ids and block hashes travel as the
//!   lowercase hex strings the ledger node reports; nothing re-encodes them.
//! - **Idempotent keys**: Every persisted record is keyed by an immutable
//!   identifier (`txid` or block `hash`) so blind retries are safe.

pub mod entities;
pub mod errors;

pub use entities::*;
pub use errors::*;
