//! # Error Types
//!
//! Defines error types returned by the ledger-node and storage collaborators.

use thiserror::Error;

/// Errors from the ledger node.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// The node returned an RPC error.
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The call did not finish within its deadline.
    #[error("Ledger call timed out after {0} ms")]
    Timeout(u64),

    /// The requested block or transaction does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The node could not be reached.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The response could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),
}

/// Errors from the storage layer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    /// Record not found in storage.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Serialization of a stored value failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),
}
