//! # Event Subscriber
//!
//! Receiving side of the bus. A subscriber that falls more than the channel
//! capacity behind loses the oldest events. Each loss is logged when it
//! happens and counted on the subscription; the sweep and ancestry loops
//! report the total when they stop. Only notifications ride the bus, so a
//! lag costs a refresh or a sweep tick, never a message.

use crate::events::{EventFilter, IndexerEvent};
use std::pin::Pin;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::Stream;
use tracing::warn;

/// Errors from subscription operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The event bus was closed.
    #[error("Event bus closed")]
    Closed,
}

/// Filtered receiver for bus events.
pub struct Subscription {
    receiver: broadcast::Receiver<IndexerEvent>,
    filter: EventFilter,
    lagged: u64,
}

impl Subscription {
    pub(crate) fn new(receiver: broadcast::Receiver<IndexerEvent>, filter: EventFilter) -> Self {
        Self {
            receiver,
            filter,
            lagged: 0,
        }
    }

    /// Next event the filter accepts. `None` once the bus is dropped.
    pub async fn recv(&mut self) -> Option<IndexerEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => self.note_lag(count),
            }
        }
    }

    /// Next buffered event the filter accepts, without waiting.
    ///
    /// `Ok(None)` when nothing matching is buffered.
    pub fn try_recv(&mut self) -> Result<Option<IndexerEvent>, SubscriptionError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.filter.matches(&event) => return Ok(Some(event)),
                Ok(_) => {}
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(SubscriptionError::Closed)
                }
                Err(broadcast::error::TryRecvError::Lagged(count)) => self.note_lag(count),
            }
        }
    }

    /// Events lost to lag since subscribing, matching or not.
    #[must_use]
    pub fn lagged(&self) -> u64 {
        self.lagged
    }

    /// This subscription's filter.
    #[must_use]
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }

    fn note_lag(&mut self, count: u64) {
        self.lagged += count;
        warn!(
            lost = count,
            total = self.lagged,
            topics = ?self.filter.topics,
            "Subscriber fell behind; events lost"
        );
    }
}

/// A filtered stream of bus events.
///
/// Wraps `BroadcastStream` so waiting consumers are woken by the channel
/// rather than polled. Lagged receivers skip the dropped events.
pub struct EventStream {
    inner: BroadcastStream<IndexerEvent>,
    filter: EventFilter,
}

impl EventStream {
    pub(crate) fn new(receiver: broadcast::Receiver<IndexerEvent>, filter: EventFilter) -> Self {
        Self {
            inner: BroadcastStream::new(receiver),
            filter,
        }
    }

    /// Get the filter for this stream.
    #[must_use]
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }
}

impl Stream for EventStream {
    type Item = IndexerEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(event))) => {
                    if self.filter.matches(&event) {
                        return Poll::Ready(Some(event));
                    }
                }
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(count)))) => {
                    warn!(lost = count, "Event stream fell behind; events lost");
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventTopic;
    use crate::publisher::InMemoryEventBus;
    use crate::EventPublisher;
    use shared_types::entities::BlockHeader;
    use std::time::Duration;
    use tokio::time::timeout;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn test_subscription_filter() {
        let bus = InMemoryEventBus::new();
        let mut sub = bus.subscribe(EventFilter::topics(vec![EventTopic::Storage]));

        bus.publish(IndexerEvent::BlockConnected(BlockHeader::default()))
            .await;
        bus.publish(IndexerEvent::StorageCommitted { cycle: 4 }).await;

        let received = timeout(Duration::from_millis(100), sub.recv())
            .await
            .expect("timeout")
            .expect("event");

        assert!(matches!(received, IndexerEvent::StorageCommitted { cycle: 4 }));
    }

    #[tokio::test]
    async fn test_subscription_drop_cleanup() {
        let bus = InMemoryEventBus::new();

        {
            let _sub1 = bus.subscribe(EventFilter::all());
            let _sub2 = bus.subscribe(EventFilter::all());
            assert_eq!(bus.subscriber_count(), 2);
        }

        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_lag_is_counted() {
        let bus = InMemoryEventBus::with_capacity(2);
        let mut sub = bus.subscribe(EventFilter::all());
        for cycle in 1..=5 {
            bus.publish(IndexerEvent::StorageCommitted { cycle }).await;
        }

        let first = sub.try_recv().unwrap().unwrap();
        assert!(matches!(first, IndexerEvent::StorageCommitted { cycle: 4 }));
        assert_eq!(sub.lagged(), 3);
    }

    #[tokio::test]
    async fn test_try_recv_empty() {
        let bus = InMemoryEventBus::new();
        let mut sub = bus.subscribe(EventFilter::all());
        assert!(matches!(sub.try_recv(), Ok(None)));
    }

    #[tokio::test]
    async fn test_event_stream_waits_for_matching_event() {
        let bus = InMemoryEventBus::new();
        let mut stream = bus.event_stream(EventFilter::topics(vec![EventTopic::ChainSync]));

        bus.publish(IndexerEvent::StorageCommitted { cycle: 1 }).await;
        bus.publish(IndexerEvent::BlockDisconnected(BlockHeader {
            height: 9,
            ..Default::default()
        }))
        .await;

        let received = timeout(Duration::from_millis(100), stream.next())
            .await
            .expect("timeout")
            .expect("event");
        assert!(matches!(received, IndexerEvent::BlockDisconnected(h) if h.height == 9));
    }

    #[tokio::test]
    async fn test_event_stream_ends_when_bus_dropped() {
        let bus = InMemoryEventBus::new();
        let mut stream = bus.event_stream(EventFilter::all());
        drop(bus);
        assert!(stream.next().await.is_none());
    }
}
