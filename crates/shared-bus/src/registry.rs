//! # Handler Registry
//!
//! Explicit mapping from message-type tags to the format handlers that
//! index them. Built once during start-up and passed to the dispatcher;
//! nothing registers itself implicitly.

use async_trait::async_trait;
use shared_types::entities::FloMessage;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Error returned by a format handler.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{handler}: {reason}")]
pub struct HandlerError {
    /// Handler name.
    pub handler: String,
    /// Failure description.
    pub reason: String,
}

/// A per-format message handler.
#[async_trait]
pub trait FloDataHandler: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Index one message.
    async fn handle(&self, message: &FloMessage) -> Result<(), HandlerError>;
}

/// Result of dispatching one message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Handlers invoked.
    pub invoked: usize,
    /// Handlers that returned an error.
    pub failed: usize,
}

/// Ordered tag → handlers routing table.
#[derive(Default)]
pub struct HandlerRegistry {
    routes: Vec<(String, Vec<Arc<dyn FloDataHandler>>)>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for messages starting with `tag`.
    ///
    /// Handlers for one tag run in registration order. An empty tag matches
    /// every message.
    pub fn register(&mut self, tag: impl Into<String>, handler: Arc<dyn FloDataHandler>) {
        let tag = tag.into();
        match self.routes.iter_mut().find(|(t, _)| *t == tag) {
            Some((_, handlers)) => handlers.push(handler),
            None => self.routes.push((tag, vec![handler])),
        }
    }

    /// Registered tags in registration order.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.routes.iter().map(|(tag, _)| tag.as_str())
    }

    /// Number of registered handlers across all tags.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.routes.iter().map(|(_, h)| h.len()).sum()
    }

    /// Deliver a message to every handler whose tag prefixes it.
    ///
    /// A failing handler is logged and does not stop the others.
    pub async fn dispatch(&self, message: &FloMessage) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();
        for (tag, handlers) in &self.routes {
            if !message.has_prefix(tag) {
                continue;
            }
            for handler in handlers {
                outcome.invoked += 1;
                if let Err(e) = handler.handle(message).await {
                    outcome.failed += 1;
                    warn!(txid = %message.txid, handler = handler.name(), error = %e, "Handler failed");
                }
            }
        }
        if outcome.invoked == 0 {
            debug!(txid = %message.txid, "No handler matched message");
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use shared_types::entities::MessageOrigin;

    struct Recorder {
        name: String,
        log: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl FloDataHandler for Recorder {
        fn name(&self) -> &str {
            &self.name
        }

        async fn handle(&self, message: &FloMessage) -> Result<(), HandlerError> {
            self.log.lock().push(format!("{}:{}", self.name, message.text()));
            if self.fail {
                return Err(HandlerError {
                    handler: self.name.clone(),
                    reason: "boom".into(),
                });
            }
            Ok(())
        }
    }

    fn recorder(name: &str, log: &Arc<Mutex<Vec<String>>>, fail: bool) -> Arc<dyn FloDataHandler> {
        Arc::new(Recorder {
            name: name.into(),
            log: log.clone(),
            fail,
        })
    }

    fn message(text: &str) -> FloMessage {
        FloMessage {
            txid: "ab".repeat(32),
            block: None,
            time: 0,
            data: text.as_bytes().to_vec(),
            origin: MessageOrigin::Transaction,
        }
    }

    #[tokio::test]
    async fn test_dispatch_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HandlerRegistry::new();
        registry.register("json:", recorder("first", &log, false));
        registry.register("json:", recorder("second", &log, false));
        registry.register("t1:", recorder("other", &log, false));

        let outcome = registry.dispatch(&message("json:{}")).await;

        assert_eq!(outcome, DispatchOutcome { invoked: 2, failed: 0 });
        assert_eq!(*log.lock(), vec!["first:json:{}", "second:json:{}"]);
    }

    #[tokio::test]
    async fn test_failing_handler_is_isolated() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HandlerRegistry::new();
        registry.register("p", recorder("bad", &log, true));
        registry.register("", recorder("catch-all", &log, false));

        let outcome = registry.dispatch(&message("payload")).await;

        assert_eq!(outcome, DispatchOutcome { invoked: 2, failed: 1 });
        assert_eq!(log.lock().len(), 2);
        assert_eq!(registry.handler_count(), 2);
    }
}
