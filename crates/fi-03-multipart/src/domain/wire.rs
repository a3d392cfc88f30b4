//! # Fragment Wire Form
//!
//! ```text
//! oip-mp(<part>,<max>,<address>,<reference>,<signature>):<chunk>
//! ```
//!
//! The header ends at the first `:`. Part 0 leaves the reference empty;
//! later parts carry part 0's full txid. Every part is signed over
//! `part-max-address-prior-chunk`, where `prior` is the declared reference,
//! or 64 zeros for part 0.

use super::errors::FragmentError;

/// Prefix written by this publisher.
pub const FRAGMENT_PREFIX: &str = "oip-mp(";

/// Older prefix still accepted on ingest.
pub const LEGACY_FRAGMENT_PREFIX: &str = "alexandria-media-multipart(";

/// Every prefix recognized on ingest.
pub const FRAGMENT_PREFIXES: [&str; 2] = [FRAGMENT_PREFIX, LEGACY_FRAGMENT_PREFIX];

/// Length references are truncated to.
pub const REFERENCE_LEN: usize = 10;

/// Length of a txid as carried in later parts' reference field.
pub const TXID_LEN: usize = 64;

/// Stand-in for the prior reference when signing part 0.
pub const ZERO_TXID: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Strip a recognized fragment prefix.
pub fn strip_fragment_prefix(data: &str) -> Option<&str> {
    FRAGMENT_PREFIXES
        .iter()
        .find_map(|prefix| data.strip_prefix(prefix))
}

/// Whether `data` starts with a fragment prefix.
pub fn is_fragment(data: &[u8]) -> bool {
    FRAGMENT_PREFIXES
        .iter()
        .any(|prefix| data.starts_with(prefix.as_bytes()))
}

/// Canonical signing preimage.
pub fn signing_preimage(part: u32, max: u32, address: &str, reference: &str, chunk: &str) -> String {
    let prior = if part == 0 { ZERO_TXID } else { reference };
    format!("{part}-{max}-{address}-{prior}-{chunk}")
}

/// Serialized length of everything but the chunk.
pub fn header_len(
    part: u32,
    max: u32,
    address_len: usize,
    reference_len: usize,
    signature_len: usize,
) -> usize {
    FRAGMENT_PREFIX.len()
        + decimal_len(part)
        + 1
        + decimal_len(max)
        + 1
        + address_len
        + 1
        + reference_len
        + 1
        + signature_len
        + 2
}

fn decimal_len(value: u32) -> usize {
    value.checked_ilog10().map_or(1, |digits| digits as usize + 1)
}

/// Truncate a declared reference (or part 0's txid) to [`REFERENCE_LEN`].
pub fn truncate_reference(reference: &str) -> String {
    reference.chars().take(REFERENCE_LEN).collect()
}

/// One fragment as carried in embedded data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentMessage {
    /// Part index.
    pub part: u32,
    /// Highest part index.
    pub max: u32,
    /// Signing address.
    pub address: String,
    /// Declared reference; empty for part 0.
    pub reference: String,
    /// Base64 signature.
    pub signature: String,
    /// Encoded chunk.
    pub chunk: String,
}

impl FragmentMessage {
    /// Parse the text following a fragment prefix.
    pub fn parse(body: &str) -> Result<Self, FragmentError> {
        let malformed = |why: &str| FragmentError::MalformedFragment(why.to_string());

        let (header, chunk) = body.split_once(':').ok_or_else(|| malformed("missing ':'"))?;
        let header = header.strip_suffix(')').unwrap_or(header);

        let fields: Vec<&str> = header.split(',').collect();
        let [part, max, address, reference, signature] = fields.as_slice() else {
            return Err(malformed(&format!("expected 5 header fields, got {}", fields.len())));
        };

        let part: u32 = part.trim().parse().map_err(|_| malformed("part is not a non-negative integer"))?;
        let max: u32 = max.trim().parse().map_err(|_| malformed("max is not a non-negative integer"))?;
        if max == 0 {
            return Err(malformed("max must be positive"));
        }
        if part > max {
            return Err(malformed("part exceeds max"));
        }
        if chunk.is_empty() {
            return Err(malformed("empty chunk"));
        }
        if part > 0 && reference.is_empty() {
            return Err(malformed("missing reference"));
        }

        Ok(Self {
            part,
            max,
            address: address.to_string(),
            reference: reference.to_string(),
            signature: signature.to_string(),
            chunk: chunk.to_string(),
        })
    }

    /// Preimage this fragment's signature covers.
    pub fn preimage(&self) -> String {
        signing_preimage(self.part, self.max, &self.address, &self.reference, &self.chunk)
    }

    /// Wire form with the publisher's prefix.
    pub fn encode(&self) -> String {
        format!(
            "{FRAGMENT_PREFIX}{},{},{},{},{}):{}",
            self.part, self.max, self.address, self.reference, self.signature, self.chunk
        )
    }
}
