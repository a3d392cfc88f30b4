//! # Ancestry Tracker
//!
//! Spendable outputs of one controlled address plus their [`AncestryLinks`].
//!
//! The tracker is updated optimistically by [`AncestryTracker::record_broadcast`]
//! the moment a transaction is sent, so a second spend can chain on the first
//! one's change before the node relays it back.

use super::errors::AncestryError;
use super::links::AncestryLinks;
use crate::config::AncestryConfig;
use shared_types::{OutputKey, TxId, UnspentOutput};
use std::collections::BTreeMap;

/// One output as reported by the ledger node, with its spend history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawOutput {
    /// The output.
    pub output: UnspentOutput,
    /// Whether a known transaction already spends it.
    pub spent: bool,
    /// Outputs spent by the transaction that created this one.
    pub parents: Vec<OutputKey>,
}

/// Inputs chosen to fund a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Chosen outputs in selection order.
    pub inputs: Vec<UnspentOutput>,
    /// Sum of their values.
    pub total: u64,
}

impl Selection {
    /// Keys of the chosen outputs.
    pub fn keys(&self) -> Vec<OutputKey> {
        self.inputs.iter().map(UnspentOutput::key).collect()
    }
}

/// A transaction this address just broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastRecord {
    /// Transaction id the node returned.
    pub txid: TxId,
    /// Outputs it spent.
    pub spent: Vec<OutputKey>,
    /// Change returned to the address, if any.
    pub change: Option<UnspentOutput>,
}

/// Spendable outputs and ancestry for one address.
#[derive(Debug, Clone)]
pub struct AncestryTracker {
    config: AncestryConfig,
    spendable: BTreeMap<OutputKey, UnspentOutput>,
    links: AncestryLinks,
}

impl AncestryTracker {
    /// Create an empty tracker.
    pub fn new(config: AncestryConfig) -> Self {
        Self {
            config,
            spendable: BTreeMap::new(),
            links: AncestryLinks::new(),
        }
    }

    /// Replace all state with the node's view of the address.
    pub fn rebuild(&mut self, raw_outputs: Vec<RawOutput>) {
        self.spendable.clear();
        self.links.clear();

        for raw in &raw_outputs {
            if !raw.spent {
                self.spendable.insert(raw.output.key(), raw.output.clone());
            }
        }
        for raw in raw_outputs {
            if !raw.output.is_unconfirmed() {
                continue;
            }
            for parent in &raw.parents {
                self.links.link_ancestors(parent, raw.output.clone());
            }
        }
    }

    /// Choose outputs covering `target` plus the fee headroom.
    ///
    /// Most-confirmed outputs go first. Unconfirmed outputs whose chain has
    /// reached the ancestor limit are skipped: spending them would build a
    /// transaction the mempool rejects.
    pub fn select_inputs(&self, target: u64) -> Result<Selection, AncestryError> {
        let needed = target.saturating_add(self.config.fee_headroom);

        let mut candidates: Vec<&UnspentOutput> = self
            .spendable
            .values()
            .filter(|output| {
                !output.is_unconfirmed()
                    || self.links.chain_len(&output.key()) < self.config.ancestor_limit
            })
            .collect();
        candidates.sort_by(|a, b| {
            b.confirmations
                .cmp(&a.confirmations)
                .then_with(|| a.key().cmp(&b.key()))
        });

        let mut selection = Selection {
            inputs: Vec::new(),
            total: 0,
        };
        for output in candidates {
            if selection.total >= needed {
                break;
            }
            selection.total = selection.total.saturating_add(output.value);
            selection.inputs.push(output.clone());
        }

        if selection.total < needed {
            return Err(AncestryError::InsufficientFunds {
                needed,
                available: selection.total,
            });
        }
        Ok(selection)
    }

    /// Apply a broadcast transaction without waiting for the node.
    pub fn record_broadcast(&mut self, record: BroadcastRecord) {
        for key in &record.spent {
            self.spendable.remove(key);
        }
        if let Some(mut change) = record.change {
            change.txid = record.txid;
            change.confirmations = 0;
            for parent in &record.spent {
                self.links.link_ancestors(parent, change.clone());
            }
            self.spendable.insert(change.key(), change);
        }
    }

    /// Chain length, in transactions, of the chain `key` belongs to.
    pub fn chain_len(&self, key: &OutputKey) -> usize {
        self.links.chain_len(key)
    }

    /// Representative ancestor of `key`.
    pub fn ancestor_of(&self, key: &OutputKey) -> Option<&OutputKey> {
        self.links.ancestor_of(key)
    }

    /// Ancestry links.
    pub fn links(&self) -> &AncestryLinks {
        &self.links
    }

    /// Spendable output by key.
    pub fn spendable(&self, key: &OutputKey) -> Option<&UnspentOutput> {
        self.spendable.get(key)
    }

    /// Number of spendable outputs.
    pub fn spendable_count(&self) -> usize {
        self.spendable.len()
    }

    /// Sum of spendable values.
    pub fn balance(&self) -> u64 {
        self.spendable.values().map(|o| o.value).sum()
    }
}
