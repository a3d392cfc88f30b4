//! # Chain Sync Configuration

use crate::domain::DEFAULT_WINDOW_SLOTS;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Chain sync configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainSyncConfig {
    /// Slot count of the recent-block window (power of two).
    pub window_slots: usize,

    /// Deadline for each ledger-node call, in milliseconds.
    pub fetch_timeout_ms: u64,

    /// Height indexed first when the store is empty.
    pub start_height: u64,
}

impl Default for ChainSyncConfig {
    fn default() -> Self {
        Self {
            window_slots: DEFAULT_WINDOW_SLOTS,
            fetch_timeout_ms: 30_000,
            start_height: 0,
        }
    }
}

impl ChainSyncConfig {
    /// Create a config for testing (smaller values).
    pub fn for_testing() -> Self {
        Self {
            window_slots: 16,
            fetch_timeout_ms: 1_000,
            start_height: 0,
        }
    }

    /// Ledger call deadline.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ChainSyncConfig::default();
        assert_eq!(config.window_slots, 256);
        assert_eq!(config.fetch_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_testing_config() {
        let config = ChainSyncConfig::for_testing();
        assert!(config.window_slots.is_power_of_two());
    }
}
