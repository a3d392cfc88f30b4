//! # Shared Bus - Event Bus for Inter-Subsystem Communication
//!
//! Subsystems never call each other's services directly for ingest-side
//! fan-out; they publish [`IndexerEvent`]s and subscribe to the topics they
//! care about.
//!
//! ## Event Flow
//!
//! ```text
//! ┌──────────────┐        FloMessage           ┌──────────────┐
//! │  Chain Sync  │ ──► MessageQueue ─────────► │  Dispatcher  │──► HandlerRegistry
//! └──────────────┘           ▲                 └──────────────┘
//!        │ BlockConnected    │ reassembled
//!        ▼                   │
//! ┌──────────────┐     ┌──────────────┐
//! │  Event Bus   │ ──► │  Multipart   │
//! └──────────────┘     │  reassembler │
//!        ▲             └──────────────┘
//! ┌──────────────┐      (StorageCommitted)
//! │ Commit timer │
//! └──────────────┘
//! ```
//!
//! The bus is fire-and-forget: a receiver more than its capacity behind
//! loses events. Embedded-data messages therefore travel through a
//! [`MessageSink`] instead; in the runtime that is a bounded
//! [`MessageQueue`] the dispatcher drains, and producers wait when it is full.
//! Reassembled multipart messages go through the same sink, so format
//! handlers cannot tell them from single-transaction messages except through
//! `FloMessage::origin`.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod delivery;
pub mod events;
pub mod publisher;
pub mod registry;
pub mod subscriber;

// Re-export main types
pub use delivery::{BusSink, DeliveryError, MessageQueue, MessageSink, QueuedMessage};
pub use events::{subsystem, EventFilter, EventTopic, IndexerEvent};
pub use publisher::{EventPublisher, InMemoryEventBus};
pub use registry::{DispatchOutcome, FloDataHandler, HandlerError, HandlerRegistry};
pub use subscriber::{EventStream, Subscription, SubscriptionError};

/// Maximum events to buffer per subscriber before lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_capacity() {
        assert_eq!(DEFAULT_CHANNEL_CAPACITY, 1000);
    }
}
