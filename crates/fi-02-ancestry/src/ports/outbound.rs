//! # Outbound Ports
//!
//! Where the tracker's view of an address comes from.

use crate::domain::RawOutput;
use async_trait::async_trait;
use parking_lot::RwLock;
use shared_types::LedgerError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Output source - outbound port.
///
/// Returns confirmed and unconfirmed outputs paying to `address`, each with
/// whether it is spent and which outputs its creating transaction spent.
#[async_trait]
pub trait OutputSource: Send + Sync {
    /// Outputs of `address` with spend history.
    async fn get_outputs(&self, address: &str) -> Result<Vec<RawOutput>, LedgerError>;
}

// =============================================================================
// Mock Implementations for Testing
// =============================================================================

/// Mock output source backed by a map.
#[derive(Default)]
pub struct MockOutputSource {
    outputs: RwLock<HashMap<String, Vec<RawOutput>>>,
    calls: AtomicUsize,
    /// Should return errors?
    pub should_fail: AtomicBool,
}

impl MockOutputSource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the outputs reported for `address`.
    pub fn set_outputs(&self, address: &str, outputs: Vec<RawOutput>) {
        self.outputs.write().insert(address.to_string(), outputs);
    }

    /// Number of `get_outputs` calls so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OutputSource for MockOutputSource {
    async fn get_outputs(&self, address: &str) -> Result<Vec<RawOutput>, LedgerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(LedgerError::Transport("Mock failure".to_string()));
        }
        Ok(self
            .outputs
            .read()
            .get(address)
            .cloned()
            .unwrap_or_default())
    }
}
