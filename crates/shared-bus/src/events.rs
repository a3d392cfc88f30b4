//! # Indexer Events
//!
//! Defines all event types that flow through the shared bus.

use serde::{Deserialize, Serialize};
use shared_types::entities::{BlockHeader, FloMessage};

/// Subsystem identifiers used as event sources.
pub mod subsystem {
    /// Node runtime (commit ticker, dispatcher).
    pub const RUNTIME: u8 = 0;
    /// Chain synchronization.
    pub const CHAIN_SYNC: u8 = 1;
    /// Unconfirmed-output ancestry.
    pub const ANCESTRY: u8 = 2;
    /// Multipart reassembly and publishing.
    pub const MULTIPART: u8 = 3;
}

/// All events that can be published to the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IndexerEvent {
    // =========================================================================
    // CHAIN SYNC
    // =========================================================================
    /// A block was indexed on top of the window.
    BlockConnected(BlockHeader),

    /// A block was unwound and marked orphaned.
    BlockDisconnected(BlockHeader),

    // =========================================================================
    // MESSAGES
    // =========================================================================
    /// An embedded-data message is ready for the format handlers.
    ///
    /// Carries both ordinary transaction messages and reassembled multipart
    /// messages; consumers tell them apart through `FloMessage::origin`.
    FloData {
        /// The message.
        message: FloMessage,
        /// Publishing subsystem.
        source: u8,
    },

    // =========================================================================
    // STORAGE
    // =========================================================================
    /// Buffered index writes were flushed; triggers reassembly sweeps.
    StorageCommitted {
        /// Monotonic commit counter.
        cycle: u64,
    },

    // =========================================================================
    // CRITICAL EVENTS (DLQ)
    // =========================================================================
    /// Critical error requiring operator attention.
    CriticalError {
        /// The subsystem that encountered the error.
        subsystem_id: u8,
        /// Error description.
        error: String,
    },
}

impl IndexerEvent {
    /// Get the topic for this event (for filtering).
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::BlockConnected(_) | Self::BlockDisconnected(_) => EventTopic::ChainSync,
            Self::FloData { .. } => EventTopic::FloData,
            Self::StorageCommitted { .. } => EventTopic::Storage,
            Self::CriticalError { .. } => EventTopic::DeadLetterQueue,
        }
    }

    /// Get the originating subsystem ID.
    #[must_use]
    pub fn source_subsystem(&self) -> u8 {
        match self {
            Self::BlockConnected(_) | Self::BlockDisconnected(_) => subsystem::CHAIN_SYNC,
            Self::FloData { source, .. } => *source,
            Self::StorageCommitted { .. } => subsystem::RUNTIME,
            Self::CriticalError { subsystem_id, .. } => *subsystem_id,
        }
    }
}

/// Event topics for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    /// Block connect/disconnect events.
    ChainSync,
    /// Embedded-data messages.
    FloData,
    /// Storage commit cycles.
    Storage,
    /// Dead Letter Queue for critical errors.
    DeadLetterQueue,
    /// All events (no filtering).
    All,
}

/// Filter for subscribing to specific events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topics to include. Empty means all topics.
    pub topics: Vec<EventTopic>,
    /// Source subsystems to include. Empty means all sources.
    pub source_subsystems: Vec<u8>,
}

impl EventFilter {
    /// Create a filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific topics.
    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self {
            topics,
            source_subsystems: Vec::new(),
        }
    }

    /// Create a filter for events from specific subsystems.
    #[must_use]
    pub fn from_subsystems(subsystems: Vec<u8>) -> Self {
        Self {
            topics: Vec::new(),
            source_subsystems: subsystems,
        }
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &IndexerEvent) -> bool {
        let topic_match = self.topics.is_empty()
            || self.topics.contains(&EventTopic::All)
            || self.topics.contains(&event.topic());

        let source_match = self.source_subsystems.is_empty()
            || self.source_subsystems.contains(&event.source_subsystem());

        topic_match && source_match
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::entities::MessageOrigin;

    fn flo_data(source: u8) -> IndexerEvent {
        IndexerEvent::FloData {
            message: FloMessage {
                txid: "00".repeat(32),
                block: None,
                time: 0,
                data: b"oip".to_vec(),
                origin: MessageOrigin::Transaction,
            },
            source,
        }
    }

    #[test]
    fn test_event_topic_mapping() {
        let event = IndexerEvent::BlockConnected(BlockHeader::default());
        assert_eq!(event.topic(), EventTopic::ChainSync);
        assert_eq!(event.source_subsystem(), subsystem::CHAIN_SYNC);
    }

    #[test]
    fn test_filter_all() {
        let filter = EventFilter::all();
        assert!(filter.matches(&IndexerEvent::StorageCommitted { cycle: 1 }));
    }

    #[test]
    fn test_filter_by_topic() {
        let filter = EventFilter::topics(vec![EventTopic::Storage]);
        assert!(filter.matches(&IndexerEvent::StorageCommitted { cycle: 1 }));
        assert!(!filter.matches(&flo_data(subsystem::CHAIN_SYNC)));
    }

    #[test]
    fn test_filter_by_subsystem() {
        let filter = EventFilter::from_subsystems(vec![subsystem::MULTIPART]);
        assert!(filter.matches(&flo_data(subsystem::MULTIPART)));
        assert!(!filter.matches(&flo_data(subsystem::CHAIN_SYNC)));
    }
}
