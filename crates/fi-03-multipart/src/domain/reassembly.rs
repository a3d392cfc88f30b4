//! # Reassembly
//!
//! Pure grouping and assembly over pending fragment records. A group
//! assembles once part 0 exists and every index up to part 0's `max` has a
//! member signed by part 0's address; duplicates of an index keep the
//! earliest `(block height, txid)`.

use super::chunk::decode_chain;
use super::errors::ChunkError;
use shared_types::{FragmentRecord, TxId};
use std::collections::{BTreeMap, HashMap};

/// Pending fragments sharing one reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentGroup {
    /// Shared reference.
    pub reference: String,
    /// Members in storage order.
    pub members: Vec<FragmentRecord>,
}

impl FragmentGroup {
    /// Time of the oldest member.
    pub fn oldest_time(&self) -> u64 {
        self.members.iter().map(|m| m.time).min().unwrap_or(0)
    }

    /// Every member's txid.
    pub fn txids(&self) -> Vec<TxId> {
        self.members.iter().map(|m| m.txid.clone()).collect()
    }

    /// Whether the oldest member is older than `retention_secs` at `now`.
    pub fn is_stale(&self, now: u64, retention_secs: u64) -> bool {
        now.saturating_sub(self.oldest_time()) > retention_secs
    }
}

/// Grouping result.
#[derive(Debug, Clone, Default)]
pub struct Grouping {
    /// Groups to examine this cycle, oldest first.
    pub groups: Vec<FragmentGroup>,
    /// Groups left for a later cycle.
    pub deferred: usize,
}

/// Group records by reference, keeping at most `max_groups` (oldest first).
pub fn group_fragments(records: Vec<FragmentRecord>, max_groups: usize) -> Grouping {
    let mut by_reference: BTreeMap<String, Vec<FragmentRecord>> = BTreeMap::new();
    for record in records {
        by_reference
            .entry(record.reference.clone())
            .or_default()
            .push(record);
    }

    let mut groups: Vec<FragmentGroup> = by_reference
        .into_iter()
        .map(|(reference, members)| FragmentGroup { reference, members })
        .collect();
    groups.sort_by(|a, b| {
        a.oldest_time()
            .cmp(&b.oldest_time())
            .then_with(|| a.reference.cmp(&b.reference))
    });

    let deferred = groups.len().saturating_sub(max_groups);
    groups.truncate(max_groups);
    Grouping { groups, deferred }
}

/// A complete logical message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledMessage {
    /// Shared reference.
    pub reference: String,
    /// Part 0's record, whose transaction context the message carries.
    pub head: FragmentRecord,
    /// Number of parts.
    pub parts: u32,
    /// Concatenated decoded chunks.
    pub payload: Vec<u8>,
}

/// Ordering key for duplicates: confirmed before unconfirmed, then height, then txid.
fn precedence(record: &FragmentRecord) -> (u64, &str) {
    (
        record.block.as_ref().map_or(u64::MAX, |b| b.height),
        record.txid.as_str(),
    )
}

/// Assemble a group.
///
/// Part 0 is chosen first and fixes the signer: later parts signed by any
/// other address are ignored. `Ok(None)` while any index is missing. A
/// chunk that fails to decode is an error; the caller leaves the group
/// pending.
pub fn assemble(group: &FragmentGroup) -> Result<Option<AssembledMessage>, ChunkError> {
    let Some(head) = group
        .members
        .iter()
        .filter(|m| m.part == 0)
        .min_by(|a, b| precedence(a).cmp(&precedence(b)))
    else {
        return Ok(None);
    };

    let mut chosen: HashMap<u32, &FragmentRecord> = HashMap::new();
    chosen.insert(0, head);
    for member in &group.members {
        if member.part == 0 || member.part > head.max || member.address != head.address {
            continue;
        }
        chosen
            .entry(member.part)
            .and_modify(|current| {
                if precedence(member) < precedence(current) {
                    *current = member;
                }
            })
            .or_insert(member);
    }

    let mut chunks = Vec::with_capacity(head.max as usize + 1);
    for part in 0..=head.max {
        match chosen.get(&part) {
            Some(member) if !member.chunk.is_empty() => chunks.push(member.chunk.as_str()),
            _ => return Ok(None),
        }
    }
    let payload = decode_chain(chunks)?;

    Ok(Some(AssembledMessage {
        reference: group.reference.clone(),
        head: head.clone(),
        parts: head.max + 1,
        payload,
    }))
}
