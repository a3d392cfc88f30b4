//! # Domain Layer
//!
//! Wire form, chunk codec, validation, reassembly and chain planning.
//! Nothing here touches storage or the network.

pub mod chunk;
pub mod errors;
pub mod fragment;
pub mod reassembly;
pub mod splitter;
pub mod wire;

pub use chunk::{decode_chain, decode_chunk, encode_chunk, encode_shortest, ChunkEncoding, BASE64_TAG, ZSTD_TAG};
pub use errors::{ChunkError, FragmentError, PublishError, ReassemblerError, SplitError};
pub use fragment::{fragment_from_message, validate_fragment, ValidatedFragment};
pub use reassembly::{assemble, group_fragments, AssembledMessage, FragmentGroup, Grouping};
pub use splitter::{estimate_parts, plan_chain, ChainPlan, FragmentLayout, PlannedPart};
pub use wire::{
    is_fragment, signing_preimage, strip_fragment_prefix, FragmentMessage, FRAGMENT_PREFIX,
    FRAGMENT_PREFIXES, LEGACY_FRAGMENT_PREFIX, REFERENCE_LEN, ZERO_TXID,
};
