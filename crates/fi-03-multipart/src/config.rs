//! # Multipart Configuration

use serde::{Deserialize, Serialize};

/// Largest embedded-data field the ledger relays.
pub const DEFAULT_DATA_LIMIT: usize = 1040;

/// Seven days, in seconds.
pub const DEFAULT_RETENTION_SECS: u64 = 7 * 24 * 60 * 60;

/// Groups examined per commit cycle.
pub const DEFAULT_MAX_GROUPS: usize = 10_000;

/// Reassembler configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReassemblerConfig {
    /// Incomplete sets older than this are marked stale.
    pub retention_secs: u64,

    /// Groups examined per sweep; the rest wait for the next cycle.
    pub max_groups_per_cycle: usize,

    /// Pending records read per sweep.
    pub query_limit: usize,
}

impl Default for ReassemblerConfig {
    fn default() -> Self {
        Self {
            retention_secs: DEFAULT_RETENTION_SECS,
            max_groups_per_cycle: DEFAULT_MAX_GROUPS,
            query_limit: 1_000_000,
        }
    }
}

impl ReassemblerConfig {
    /// Create a config for testing (small caps).
    pub fn for_testing() -> Self {
        Self {
            retention_secs: 3_600,
            max_groups_per_cycle: 4,
            query_limit: 10_000,
        }
    }
}

/// Chain splitter and publisher configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitterConfig {
    /// Serialized fragment ceiling, in bytes.
    pub data_limit: usize,

    /// Payload bytes part 0 is expected to carry (estimate only).
    pub first_part_capacity: usize,

    /// Payload bytes each later part is expected to carry (estimate only).
    pub later_part_capacity: usize,

    /// Bound on slice-fitting attempts per part.
    pub max_fit_iterations: usize,

    /// Bound on whole-chain rebuilds.
    pub max_rebuilds: usize,

    /// zstd level for `z64:` chunks.
    pub compression_level: i32,

    /// Fee paid by every published transaction, in satoshis.
    pub fee: u64,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            data_limit: DEFAULT_DATA_LIMIT,
            first_part_capacity: 672,
            later_part_capacity: 620,
            max_fit_iterations: 32,
            max_rebuilds: 16,
            compression_level: 9,
            fee: 100_000,
        }
    }
}

impl SplitterConfig {
    /// Create a config for testing (fast compression, small fee).
    pub fn for_testing() -> Self {
        Self {
            compression_level: 1,
            fee: 1_000,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SplitterConfig::default();
        assert_eq!(config.data_limit, 1040);
        assert!(config.later_part_capacity < config.first_part_capacity);

        let config = ReassemblerConfig::default();
        assert_eq!(config.retention_secs, 604_800);
        assert_eq!(config.max_groups_per_cycle, 10_000);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: SplitterConfig = serde_json::from_str(r#"{"fee": 5}"#).unwrap();
        assert_eq!(config.fee, 5);
        assert_eq!(config.data_limit, DEFAULT_DATA_LIMIT);
    }
}
