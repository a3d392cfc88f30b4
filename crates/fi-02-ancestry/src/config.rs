//! # Ancestry Configuration

use serde::{Deserialize, Serialize};

/// Mempool policy ceiling on chained unconfirmed transactions.
pub const DEFAULT_ANCESTOR_LIMIT: usize = 25;

/// Ancestry tracker configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AncestryConfig {
    /// Chains at this length are not extended.
    pub ancestor_limit: usize,

    /// Satoshis selected on top of every target to cover the fee.
    pub fee_headroom: u64,
}

impl Default for AncestryConfig {
    fn default() -> Self {
        Self {
            ancestor_limit: DEFAULT_ANCESTOR_LIMIT,
            fee_headroom: 100_000,
        }
    }
}

impl AncestryConfig {
    /// Create a config for testing (short chains, tiny fees).
    pub fn for_testing() -> Self {
        Self {
            ancestor_limit: 5,
            fee_headroom: 1_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AncestryConfig::default();
        assert_eq!(config.ancestor_limit, 25);
        assert_eq!(config.fee_headroom, 100_000);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: AncestryConfig = serde_json::from_str(r#"{"ancestor_limit": 10}"#).unwrap();
        assert_eq!(config.ancestor_limit, 10);
        assert_eq!(config.fee_headroom, 100_000);
    }
}
