//! # Inbound Ports

use crate::domain::AncestryError;
use async_trait::async_trait;

/// Ancestry API - inbound port.
#[async_trait]
pub trait AncestryApi: Send + Sync {
    /// Rebuild one address from the ledger node. Returns its spendable count.
    async fn refresh(&self, address: &str) -> Result<usize, AncestryError>;

    /// Rebuild every tracked address.
    async fn refresh_all(&self) -> Result<(), AncestryError>;

    /// Addresses with a tracker.
    fn tracked_addresses(&self) -> Vec<String>;
}
