//! # Application Layer
//!
//! The chain sync service and the coordination primitives it relies on.

mod coordination;
pub mod service;

pub use service::ChainSyncService;
