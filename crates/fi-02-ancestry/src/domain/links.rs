//! # Ancestry Links
//!
//! Groups unconfirmed outputs into chains that share one representative
//! ancestor, the way the mempool counts a package of chained spends.
//!
//! ```text
//! C (confirmed) ─► o1 ─► o2 ─► o3        reverse: o1,o2,o3 → C
//!                                         chains:  C → [o1, o2, o3]
//! ```
//!
//! Chains only merge. When an output that already heads a chain (or already
//! sits in another chain) is linked under a new ancestor, every member of the
//! old chain is re-parented onto the new one.

use shared_types::{OutputKey, UnspentOutput};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Forward, reverse and chain maps for one address.
#[derive(Debug, Default, Clone)]
pub struct AncestryLinks {
    /// Parent or ancestor → outputs below it.
    forward: HashMap<OutputKey, BTreeSet<OutputKey>>,
    /// Output → representative ancestor.
    reverse: HashMap<OutputKey, OutputKey>,
    /// Representative ancestor → chain members in link order.
    chains: HashMap<OutputKey, Vec<UnspentOutput>>,
}

impl AncestryLinks {
    /// Create empty links.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `output` spends `parent`.
    pub fn link_ancestors(&mut self, parent: &OutputKey, output: UnspentOutput) {
        let self_key = output.key();
        let ancestor = self
            .reverse
            .get(parent)
            .cloned()
            .unwrap_or_else(|| parent.clone());
        if ancestor == self_key {
            return;
        }

        self.forward
            .entry(parent.clone())
            .or_default()
            .insert(self_key.clone());
        self.forward
            .entry(ancestor.clone())
            .or_default()
            .insert(self_key.clone());

        // Already in a different chain: fold that chain into this one.
        if let Some(previous) = self.reverse.get(&self_key).cloned() {
            if previous != ancestor {
                self.merge(&previous, &ancestor);
            }
        }

        self.reverse.insert(self_key.clone(), ancestor.clone());
        let chain = self.chains.entry(ancestor.clone()).or_default();
        if !chain.iter().any(|member| member.key() == self_key) {
            chain.push(output);
        }

        // Headed a partial tree of its own: re-parent it.
        if self.chains.contains_key(&self_key) {
            self.merge(&self_key, &ancestor);
        }
    }

    /// Move every member of `from`'s chain under `to`.
    fn merge(&mut self, from: &OutputKey, to: &OutputKey) {
        let Some(members) = self.chains.remove(from) else {
            return;
        };
        if let Some(children) = self.forward.get(from).cloned() {
            self.forward.entry(to.clone()).or_default().extend(children);
        }
        let chain = self.chains.entry(to.clone()).or_default();
        for member in members {
            let key = member.key();
            if key == *to {
                continue;
            }
            self.reverse.insert(key.clone(), to.clone());
            if !chain.iter().any(|m| m.key() == key) {
                chain.push(member);
            }
        }
    }

    /// Representative ancestor of `key`, if it is linked.
    pub fn ancestor_of(&self, key: &OutputKey) -> Option<&OutputKey> {
        self.reverse.get(key)
    }

    /// Members of the chain headed by `ancestor`.
    pub fn chain(&self, ancestor: &OutputKey) -> &[UnspentOutput] {
        self.chains.get(ancestor).map_or(&[], Vec::as_slice)
    }

    /// Outputs recorded directly or transitively below `key`.
    pub fn descendants(&self, key: &OutputKey) -> Vec<OutputKey> {
        self.forward
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Transactions in the chain `key` belongs to. Zero when unlinked.
    ///
    /// Counted per txid: two outputs of one transaction are one mempool entry.
    pub fn chain_len(&self, key: &OutputKey) -> usize {
        let Some(ancestor) = self.reverse.get(key) else {
            return 0;
        };
        self.chain(ancestor)
            .iter()
            .map(|member| member.txid.as_str())
            .collect::<HashSet<_>>()
            .len()
    }

    /// Number of distinct chains.
    pub fn chain_count(&self) -> usize {
        self.chains.len()
    }

    /// Drop every link.
    pub fn clear(&mut self) {
        self.forward.clear();
        self.reverse.clear();
        self.chains.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(txid: &str) -> UnspentOutput {
        UnspentOutput {
            txid: txid.to_string(),
            index: 0,
            script: String::new(),
            value: 1_000,
            confirmations: 0,
            address: "F-test".to_string(),
        }
    }

    fn key(txid: &str) -> OutputKey {
        OutputKey::new(txid, 0)
    }

    #[test]
    fn test_linear_chain_shares_ancestor() {
        let mut links = AncestryLinks::new();
        links.link_ancestors(&key("c"), output("a"));
        links.link_ancestors(&key("a"), output("b"));
        links.link_ancestors(&key("b"), output("d"));

        for txid in ["a", "b", "d"] {
            assert_eq!(links.ancestor_of(&key(txid)), Some(&key("c")));
            assert_eq!(links.chain_len(&key(txid)), 3);
        }
        assert_eq!(links.chain_count(), 1);
        assert_eq!(links.chain_len(&key("c")), 0);
    }

    #[test]
    fn test_out_of_order_link_reparents_partial_tree() {
        let mut links = AncestryLinks::new();
        // b spends a before a's own parent is known.
        links.link_ancestors(&key("a"), output("b"));
        assert_eq!(links.ancestor_of(&key("b")), Some(&key("a")));

        links.link_ancestors(&key("c"), output("a"));
        assert_eq!(links.ancestor_of(&key("a")), Some(&key("c")));
        assert_eq!(links.ancestor_of(&key("b")), Some(&key("c")));
        assert_eq!(links.chain(&key("c")).len(), 2);
        assert!(links.chain(&key("a")).is_empty());
        assert_eq!(links.chain_count(), 1);
    }

    #[test]
    fn test_two_parents_merge_chains() {
        let mut links = AncestryLinks::new();
        links.link_ancestors(&key("p1"), output("x"));
        links.link_ancestors(&key("p2"), output("y"));
        assert_eq!(links.chain_count(), 2);

        // z spends both x and y.
        links.link_ancestors(&key("x"), output("z"));
        links.link_ancestors(&key("y"), output("z"));

        assert_eq!(links.chain_count(), 1);
        let ancestor = links.ancestor_of(&key("z")).cloned().unwrap();
        assert_eq!(links.ancestor_of(&key("x")), Some(&ancestor));
        assert_eq!(links.ancestor_of(&key("y")), Some(&ancestor));
        assert_eq!(links.chain_len(&key("z")), 3);
    }

    #[test]
    fn test_outputs_of_one_tx_count_once() {
        let mut links = AncestryLinks::new();
        links.link_ancestors(&key("c"), output("a"));
        let mut second = output("a");
        second.index = 1;
        links.link_ancestors(&key("c"), second);

        assert_eq!(links.chain(&key("c")).len(), 2);
        assert_eq!(links.chain_len(&key("a")), 1);
    }

    #[test]
    fn test_self_link_ignored() {
        let mut links = AncestryLinks::new();
        links.link_ancestors(&key("a"), output("a"));
        assert_eq!(links.chain_count(), 0);
        assert!(links.ancestor_of(&key("a")).is_none());
    }
}
