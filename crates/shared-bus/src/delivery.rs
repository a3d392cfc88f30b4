//! # Message Delivery
//!
//! Embedded-data messages are work, not notifications: every one of them
//! must reach the dispatcher, or a fragment never gets stored and its set
//! never assembles. The broadcast bus drops the oldest events for a slow
//! receiver, so producers hand messages to a [`MessageSink`] instead.
//!
//! [`MessageQueue`] is the lossless sink: a bounded `mpsc` channel whose
//! `deliver` waits for room, so a busy dispatcher slows chain sync down
//! rather than losing messages. [`BusSink`] keeps the old fire-and-forget
//! behaviour for services running without a dispatcher.

use crate::events::IndexerEvent;
use crate::publisher::EventPublisher;
use async_trait::async_trait;
use shared_types::FloMessage;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Delivery failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The receiving side is gone (runtime shutting down).
    #[error("Message queue closed")]
    Closed,
}

/// One message waiting for dispatch.
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    /// The message.
    pub message: FloMessage,
    /// Producing subsystem.
    pub source: u8,
}

/// Destination for embedded-data messages.
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Hand `message` on. May wait for capacity.
    async fn deliver(&self, message: FloMessage, source: u8) -> Result<(), DeliveryError>;
}

/// Publishes each message as an `IndexerEvent::FloData` on the bus.
pub struct BusSink(Arc<dyn EventPublisher>);

impl BusSink {
    /// Sink over `bus`.
    pub fn new(bus: Arc<dyn EventPublisher>) -> Self {
        Self(bus)
    }
}

#[async_trait]
impl MessageSink for BusSink {
    async fn deliver(&self, message: FloMessage, source: u8) -> Result<(), DeliveryError> {
        self.0.publish(IndexerEvent::FloData { message, source }).await;
        Ok(())
    }
}

/// Bounded, lossless queue in front of the dispatcher.
#[derive(Clone)]
pub struct MessageQueue {
    sender: mpsc::Sender<QueuedMessage>,
}

impl MessageQueue {
    /// Queue holding at most `capacity` undelivered messages, plus its
    /// receiving end.
    #[must_use]
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<QueuedMessage>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Messages that fit before `deliver` starts waiting.
    #[must_use]
    pub fn available(&self) -> usize {
        self.sender.capacity()
    }
}

#[async_trait]
impl MessageSink for MessageQueue {
    async fn deliver(&self, message: FloMessage, source: u8) -> Result<(), DeliveryError> {
        self.sender
            .send(QueuedMessage { message, source })
            .await
            .map_err(|_| DeliveryError::Closed)
    }
}
