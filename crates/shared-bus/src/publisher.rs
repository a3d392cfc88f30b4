//! # Event Publisher
//!
//! The publishing half of the bus. Delivery is best effort: an event sent
//! while nobody subscribes to anything is gone.

use crate::events::{EventFilter, EventTopic, IndexerEvent};
use crate::subscriber::{EventStream, Subscription};
use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::{debug, error, trace, warn};

/// Publishing capability handed to services.
///
/// Services hold `Arc<dyn EventPublisher>` so tests can swap in a bus they
/// inspect directly.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Send `event` to every live receiver. Returns how many there were.
    async fn publish(&self, event: IndexerEvent) -> usize;

    /// Events attempted since creation, delivered or not.
    fn events_published(&self) -> u64;
}

/// Per-topic publish counters, indexed by [`topic_slot`].
#[derive(Default)]
struct TopicCounters([AtomicU64; 4]);

fn topic_slot(topic: EventTopic) -> Option<usize> {
    match topic {
        EventTopic::ChainSync => Some(0),
        EventTopic::FloData => Some(1),
        EventTopic::Storage => Some(2),
        EventTopic::DeadLetterQueue => Some(3),
        EventTopic::All => None,
    }
}

/// Single-process bus over `tokio::sync::broadcast`.
///
/// Receivers filter on their side, so a publish reaches every subscription
/// and each drops what its [`EventFilter`] rejects. A receiver that falls
/// more than `capacity` events behind lags (see [`Subscription`]).
pub struct InMemoryEventBus {
    sender: broadcast::Sender<IndexerEvent>,
    published: AtomicU64,
    by_topic: TopicCounters,
    capacity: usize,
}

impl InMemoryEventBus {
    /// Bus with [`DEFAULT_CHANNEL_CAPACITY`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Bus buffering up to `capacity` events per receiver.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            published: AtomicU64::new(0),
            by_topic: TopicCounters::default(),
            capacity,
        }
    }

    /// Receive every later event `filter` accepts.
    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        debug!(topics = ?filter.topics, "Subscribed");
        Subscription::new(self.sender.subscribe(), filter)
    }

    /// [`subscribe`](Self::subscribe) as a `Stream`.
    #[must_use]
    pub fn event_stream(&self, filter: EventFilter) -> EventStream {
        EventStream::new(self.sender.subscribe(), filter)
    }

    /// Live receivers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Per-receiver buffer size.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Events attempted on `topic`. `EventTopic::All` gives the total.
    #[must_use]
    pub fn published_on(&self, topic: EventTopic) -> u64 {
        match topic_slot(topic) {
            Some(slot) => self.by_topic.0[slot].load(Ordering::Relaxed),
            None => self.published.load(Ordering::Relaxed),
        }
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(&self, event: IndexerEvent) -> usize {
        let topic = event.topic();
        let source = event.source_subsystem();
        self.published.fetch_add(1, Ordering::Relaxed);
        if let Some(slot) = topic_slot(topic) {
            self.by_topic.0[slot].fetch_add(1, Ordering::Relaxed);
        }

        match self.sender.send(event) {
            Ok(receivers) => {
                trace!(?topic, source, receivers, "Event published");
                receivers
            }
            Err(broadcast::error::SendError(lost)) => {
                match &lost {
                    IndexerEvent::CriticalError { error: reason, .. } => {
                        error!(source, %reason, "Critical error published with no receivers")
                    }
                    IndexerEvent::FloData { message, .. } => {
                        warn!(txid = %message.txid, "Embedded-data message dropped (no receivers)")
                    }
                    _ => debug!(?topic, source, "Event dropped (no receivers)"),
                }
                0
            }
        }
    }

    fn events_published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}
