//! # Domain Layer
//!
//! Ancestry links and the per-address tracker. No I/O.

pub mod errors;
pub mod links;
pub mod tracker;

pub use errors::AncestryError;
pub use links::AncestryLinks;
pub use tracker::{AncestryTracker, BroadcastRecord, RawOutput, Selection};
