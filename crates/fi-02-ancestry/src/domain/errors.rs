//! # Domain Errors

use shared_types::LedgerError;
use thiserror::Error;

/// Ancestry tracking errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AncestryError {
    /// Eligible outputs do not cover the target plus fee headroom.
    #[error("Insufficient funds: need {needed}, {available} spendable within the ancestor limit")]
    InsufficientFunds {
        /// Target plus fee headroom.
        needed: u64,
        /// Value of every eligible output.
        available: u64,
    },

    /// The ledger node could not list the address's outputs.
    #[error("Fetch failed: {0}")]
    FetchFailed(#[from] LedgerError),
}
