//! # Ancestry Registry
//!
//! One [`AncestryTracker`] per controlled address, each behind its own async
//! mutex. Publishers hold an address's lock across select, broadcast and
//! record so two publishes never pick overlapping inputs.

use async_trait::async_trait;
use parking_lot::RwLock;
use shared_bus::{IndexerEvent, Subscription};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::AncestryConfig;
use crate::domain::{AncestryError, AncestryTracker};
use crate::ports::{AncestryApi, OutputSource};

/// Shared handle to one address's tracker.
pub type TrackerHandle = Arc<Mutex<AncestryTracker>>;

/// Per-address trackers fed from an [`OutputSource`].
pub struct AncestryRegistry<O: OutputSource> {
    config: AncestryConfig,
    source: Arc<O>,
    trackers: RwLock<HashMap<String, TrackerHandle>>,
}

impl<O: OutputSource> AncestryRegistry<O> {
    /// Create an empty registry.
    pub fn new(config: AncestryConfig, source: Arc<O>) -> Self {
        Self {
            config,
            source,
            trackers: RwLock::new(HashMap::new()),
        }
    }

    /// Tracker for `address`, created empty on first use.
    pub fn tracker(&self, address: &str) -> TrackerHandle {
        if let Some(handle) = self.trackers.read().get(address) {
            return handle.clone();
        }
        self.trackers
            .write()
            .entry(address.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(AncestryTracker::new(self.config.clone()))))
            .clone()
    }

    /// Refresh every tracker on each connected block until cancelled.
    ///
    /// Refresh failures are logged; the next block retries.
    pub async fn run(&self, mut events: Subscription, cancel: CancellationToken) {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            if let IndexerEvent::BlockConnected(header) = event {
                debug!(height = header.height, "Refreshing ancestry trackers");
                if let Err(e) = self.refresh_all().await {
                    warn!(height = header.height, error = %e, "Ancestry refresh failed");
                }
            }
        }
        info!(lagged = events.lagged(), "Ancestry refresher stopped");
    }
}

#[async_trait]
impl<O: OutputSource> AncestryApi for AncestryRegistry<O> {
    async fn refresh(&self, address: &str) -> Result<usize, AncestryError> {
        let handle = self.tracker(address);
        // Fetch under the lock: a publish finishing in between would otherwise
        // have its optimistic update overwritten by an older view.
        let mut tracker = handle.lock().await;
        let outputs = self.source.get_outputs(address).await?;
        tracker.rebuild(outputs);
        debug!(
            address,
            spendable = tracker.spendable_count(),
            chains = tracker.links().chain_count(),
            "Tracker rebuilt"
        );
        Ok(tracker.spendable_count())
    }

    async fn refresh_all(&self) -> Result<(), AncestryError> {
        for address in self.tracked_addresses() {
            self.refresh(&address).await?;
        }
        Ok(())
    }

    fn tracked_addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self.trackers.read().keys().cloned().collect();
        addresses.sort();
        addresses
    }
}
