//! # Chain Splitter
//!
//! Plans the fragment chain for a payload too large for one transaction.
//!
//! Two bounded searches:
//! - per part, the slice size: encode, shrink by the overflow or grow by the
//!   slack, until a fixed point, the bounds meet, or `max_fit_iterations`;
//! - per chain, the part count: more parts when payload is left over, fewer
//!   when the chain came out short, accepting the actual count when the
//!   next estimate would swing back to the previous one.
//!
//! Header sizes use the real field lengths (64-character reference, the
//! signer's fixed signature length), so a plan made before part 0 exists
//! stays valid once its txid is known.

use super::chunk::{encode_shortest, BASE64_TAG};
use super::errors::{ChunkError, SplitError};
use super::wire::{header_len, TXID_LEN};
use crate::config::SplitterConfig;
use tracing::debug;

/// Field lengths that size every fragment header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentLayout {
    /// Length of the signing address.
    pub address_len: usize,
    /// Length of every signature.
    pub signature_len: usize,
}

impl FragmentLayout {
    /// Header length of `part` in a chain whose highest index is `max`.
    pub fn header_len(&self, part: u32, max: u32) -> usize {
        let reference_len = if part == 0 { 0 } else { TXID_LEN };
        header_len(part, max, self.address_len, reference_len, self.signature_len)
    }
}

/// One planned part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedPart {
    /// Part index.
    pub part: u32,
    /// Encoded chunk.
    pub chunk: String,
    /// Payload bytes the chunk carries.
    pub bytes: usize,
}

/// A full chain plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainPlan {
    /// Highest part index.
    pub max: u32,
    /// Parts in order.
    pub parts: Vec<PlannedPart>,
    /// Whole-chain rebuilds it took.
    pub rebuilds: usize,
}

/// Initial part-count estimate. Never below 2.
pub fn estimate_parts(len: usize, config: &SplitterConfig) -> usize {
    let beyond_first = len.saturating_sub(config.first_part_capacity);
    (beyond_first.div_ceil(config.later_part_capacity.max(1)) + 1).max(2)
}

/// Plan the chain for `payload`.
pub fn plan_chain(
    payload: &[u8],
    layout: &FragmentLayout,
    config: &SplitterConfig,
) -> Result<ChainPlan, SplitError> {
    if payload.is_empty() {
        return Err(SplitError::EmptyPayload);
    }
    if payload.len() < 2 {
        return Err(SplitError::PayloadTooSmall(payload.len()));
    }

    let mut estimate = estimate_parts(payload.len(), config);
    let mut previous: Option<usize> = None;

    for rebuild in 0..=config.max_rebuilds {
        let (parts, leftover) = build_parts(payload, estimate, layout, config)?;

        if leftover > 0 {
            let more = leftover.div_ceil(config.later_part_capacity.max(1)).max(1);
            debug!(estimate, leftover, more, "Chain estimate short; rebuilding");
            previous = Some(estimate);
            estimate += more;
            continue;
        }

        let actual = parts.len();
        if actual == estimate || previous == Some(actual) {
            // Fewer digits in `max` only shortens headers, so the fit holds.
            return Ok(ChainPlan {
                max: to_index(actual - 1),
                parts,
                rebuilds: rebuild,
            });
        }

        debug!(estimate, actual, "Chain estimate long; rebuilding");
        previous = Some(estimate);
        estimate = actual;
    }

    Err(SplitError::DidNotConverge(config.max_rebuilds))
}

fn to_index(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

/// Build up to `count` parts. Returns the parts and the bytes left over.
fn build_parts(
    payload: &[u8],
    count: usize,
    layout: &FragmentLayout,
    config: &SplitterConfig,
) -> Result<(Vec<PlannedPart>, usize), SplitError> {
    let max = to_index(count.saturating_sub(1));
    let mut parts = Vec::new();
    let mut offset = 0;

    for part in 0..=max {
        if offset >= payload.len() {
            break;
        }
        let header = layout.header_len(part, max);
        let no_room = SplitError::NoRoom {
            part,
            header,
            limit: config.data_limit,
        };
        let budget = match config.data_limit.checked_sub(header) {
            Some(budget) if budget > BASE64_TAG.len() => budget,
            _ => return Err(no_room),
        };

        let remaining = &payload[offset..];
        // Part 0 never takes everything: a chain has at least two parts.
        let upper = remaining.len() - usize::from(part == 0);
        let (taken, chunk) = fit_slice(remaining, budget, upper, config)?.ok_or(no_room)?;

        parts.push(PlannedPart {
            part,
            chunk,
            bytes: taken,
        });
        offset += taken;
    }

    Ok((parts, payload.len() - offset))
}

/// Largest slice of `remaining` (at most `upper` bytes) whose shorter
/// encoding fits in `budget`.
fn fit_slice(
    remaining: &[u8],
    budget: usize,
    upper: usize,
    config: &SplitterConfig,
) -> Result<Option<(usize, String)>, ChunkError> {
    let mut best: Option<(usize, String)> = None;
    let mut fits = 0; // largest size known to fit
    let mut overflows = upper + 1; // smallest size known not to fit
    let mut size = ((budget - BASE64_TAG.len()) / 4 * 3).clamp(1, upper);
    let mut last_fit_len: Option<usize> = None;

    for _ in 0..config.max_fit_iterations {
        let chunk = encode_shortest(&remaining[..size], config.compression_level)?;
        let len = chunk.len();

        if len > budget {
            overflows = size;
            size = size.saturating_sub(len - budget);
        } else {
            let fixed_point = last_fit_len == Some(len);
            last_fit_len = Some(len);
            fits = size;
            best = Some((size, chunk));
            if fixed_point || len == budget || size == upper {
                break;
            }
            size += budget - len;
        }

        if fits + 1 >= overflows {
            break;
        }
        size = size.clamp(fits + 1, overflows - 1);
    }

    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::chunk::decode_chunk;
    use proptest::prelude::*;

    const LAYOUT: FragmentLayout = FragmentLayout {
        address_len: 34,
        signature_len: 88,
    };

    fn noise(len: usize, seed: u64) -> Vec<u8> {
        let mut state = seed | 1;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                (state >> 24) as u8
            })
            .collect()
    }

    fn reassemble(plan: &ChainPlan) -> Vec<u8> {
        plan.parts
            .iter()
            .flat_map(|p| decode_chunk(&p.chunk).unwrap())
            .collect()
    }

    fn assert_fits(plan: &ChainPlan, config: &SplitterConfig) {
        assert_eq!(plan.parts.len(), plan.max as usize + 1);
        for (i, part) in plan.parts.iter().enumerate() {
            assert_eq!(part.part as usize, i);
            let len = LAYOUT.header_len(part.part, plan.max) + part.chunk.len();
            assert!(len <= config.data_limit, "part {i} is {len} bytes");
        }
    }

    #[test]
    fn test_estimate_never_below_two() {
        let config = SplitterConfig::default();
        assert_eq!(estimate_parts(10, &config), 2);
        assert_eq!(estimate_parts(672 + 620 * 3, &config), 4);
        assert_eq!(estimate_parts(672 + 620 * 3 + 1, &config), 5);
    }

    #[test]
    fn test_incompressible_payload_round_trips() {
        let config = SplitterConfig::for_testing();
        let payload = noise(config.data_limit * 5, 7);
        let plan = plan_chain(&payload, &LAYOUT, &config).unwrap();

        assert_fits(&plan, &config);
        assert!(plan.parts.len() >= 6);
        assert_eq!(reassemble(&plan), payload);
    }

    #[test]
    fn test_compressible_payload_shrinks_estimate() {
        let config = SplitterConfig::for_testing();
        let payload = "the quick brown fox jumps over the lazy dog. "
            .repeat(400)
            .into_bytes();
        let estimate = estimate_parts(payload.len(), &config);
        let plan = plan_chain(&payload, &LAYOUT, &config).unwrap();

        assert!(plan.parts.len() < estimate);
        assert!(plan.rebuilds >= 1);
        assert_fits(&plan, &config);
        assert_eq!(reassemble(&plan), payload);
    }

    #[test]
    fn test_two_byte_payload_spans_two_parts() {
        let config = SplitterConfig::for_testing();
        let plan = plan_chain(b"hi", &LAYOUT, &config).unwrap();
        assert_eq!(plan.max, 1);
        assert_eq!(reassemble(&plan), b"hi");
    }

    #[test]
    fn test_small_payloads_rejected() {
        let config = SplitterConfig::for_testing();
        assert_eq!(plan_chain(b"", &LAYOUT, &config), Err(SplitError::EmptyPayload));
        assert_eq!(plan_chain(b"x", &LAYOUT, &config), Err(SplitError::PayloadTooSmall(1)));
    }

    #[test]
    fn test_header_larger_than_limit() {
        let config = SplitterConfig {
            data_limit: 150,
            ..SplitterConfig::for_testing()
        };
        let err = plan_chain(&noise(400, 3), &LAYOUT, &config).unwrap_err();
        assert!(matches!(err, SplitError::NoRoom { .. }));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_plan_fits_and_round_trips(len in 2usize..6_000, seed in any::<u64>(), text in any::<bool>()) {
            let config = SplitterConfig::for_testing();
            let payload = if text {
                noise(len, seed).iter().map(|b| b'a' + b % 6).collect()
            } else {
                noise(len, seed)
            };
            let plan = plan_chain(&payload, &LAYOUT, &config).unwrap();
            assert_fits(&plan, &config);
            prop_assert_eq!(reassemble(&plan), payload);
        }
    }
}
