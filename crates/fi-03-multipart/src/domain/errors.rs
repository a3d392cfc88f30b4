//! # Domain Errors
//!
//! Fragment rejections are local: the transaction is simply not treated as
//! a fragment. Everything else surfaces to the caller.

use fi_02_ancestry::AncestryError;
use shared_bus::DeliveryError;
use shared_crypto::CryptoError;
use shared_types::{LedgerError, StorageError};
use thiserror::Error;

/// Why an incoming fragment was rejected.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FragmentError {
    /// Header or chunk does not follow the wire form.
    #[error("Malformed fragment: {0}")]
    MalformedFragment(String),

    /// Signing address is not a valid FLO address.
    #[error("Invalid signing address: {0}")]
    InvalidAddress(String),

    /// Signature does not verify over the canonical preimage.
    #[error("Bad signature on part {part}")]
    BadSignature {
        /// Part index of the rejected fragment.
        part: u32,
    },
}

/// Chunk encoding errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChunkError {
    /// Tagged chunk is not valid base64.
    #[error("Invalid base64 chunk: {0}")]
    InvalidBase64(String),

    /// zstd rejected the data, or it decompresses past the chunk ceiling.
    #[error("Compression error: {0}")]
    Compression(String),

    /// A chain whose part 0 is tagged has an untagged later part.
    #[error("Part {0} of an encoded chain has no encoding tag")]
    UntaggedPart(u32),
}

/// Chain planning errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SplitError {
    /// Nothing to publish.
    #[error("Payload is empty")]
    EmptyPayload,

    /// A chain needs at least one byte per part.
    #[error("Payload of {0} bytes cannot span two parts")]
    PayloadTooSmall(usize),

    /// Header alone leaves no room for a chunk.
    #[error("Part {part} header takes {header} of {limit} bytes")]
    NoRoom {
        /// Part index.
        part: u32,
        /// Header length.
        header: usize,
        /// Data limit.
        limit: usize,
    },

    /// Part-count refinement did not settle.
    #[error("Chain plan did not converge after {0} rebuilds")]
    DidNotConverge(usize),

    /// Chunk encoding failed.
    #[error(transparent)]
    Chunk(#[from] ChunkError),
}

/// Reassembler errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReassemblerError {
    /// Fragment storage failed.
    #[error("Store failed: {0}")]
    StoreFailed(#[from] StorageError),

    /// An assembled message could not be handed on.
    #[error("Delivery failed: {0}")]
    DeliveryFailed(#[from] DeliveryError),
}

/// Publisher errors.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Payload could not be planned.
    #[error(transparent)]
    Split(#[from] SplitError),

    /// No eligible outputs fund the next transaction.
    #[error("Funding failed: {0}")]
    Funding(#[from] AncestryError),

    /// Building or broadcasting failed.
    #[error("Ledger call failed: {0}")]
    Ledger(#[from] LedgerError),

    /// The signer refused.
    #[error("Signing failed: {0}")]
    Signing(#[from] CryptoError),

    /// A signed fragment came out longer than planned.
    #[error("Part {part} serialized to {len} bytes, limit {limit}")]
    Oversized {
        /// Part index.
        part: u32,
        /// Serialized length.
        len: usize,
        /// Data limit.
        limit: usize,
    },
}
