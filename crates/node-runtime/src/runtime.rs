//! # Indexer Runtime
//!
//! Wires chain sync, ancestry and multipart services onto one event bus and
//! owns the background tasks that connect them.
//!
//! Notifications travel on the bus. Embedded-data messages travel on a
//! bounded [`MessageQueue`] that the dispatcher drains; producers wait when
//! it is full, so no message is lost to a slow handler.
//!
//! ## Tasks
//!
//! ```text
//! notifications ──→ [chain sync] ──BlockConnected──→ [ancestry refresher]
//!                        │
//!                        └──queue──→ [dispatcher] ──fragment──→ reassembler.ingest
//!                                        │    ↑
//!                                        │    └──queue(Reassembled)──┐
//!                                        └──plain──→ HandlerRegistry │
//!                                                                    │
//! [commit ticker] ──StorageCommitted──→ [reassembler sweep] ─────────┘
//! ```

use fi_01_chain_sync::{BlockStore, ChainSyncApi, ChainSyncError, ChainSyncService, LedgerNode, LedgerNotification};
use fi_02_ancestry::{AncestryRegistry, OutputSource};
use fi_03_multipart::{
    FragmentStore, IngestOutcome, LedgerWallet, MultipartPublisher, MultipartReassembler,
    PublishError, PublisherApi, ReassemblerApi, SystemTimeSource, TimeSource,
};
use parking_lot::Mutex;
use shared_bus::{
    subsystem, EventFilter, EventPublisher, EventTopic, HandlerRegistry, InMemoryEventBus,
    IndexerEvent, MessageQueue, QueuedMessage,
};
use shared_crypto::{FloMessageVerifier, MessageSigner, MessageVerifier};
use shared_types::{BlockHeader, ChainStatus, MessageOrigin, TxId};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::adapters::StoreCommit;
use crate::config::NodeConfig;

/// Runtime errors.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Chain sync failed to build, start or catch up.
    #[error("Chain sync failed: {0}")]
    Sync(#[from] ChainSyncError),

    /// No publishing identity is configured.
    #[error("Publishing is not configured")]
    PublishingDisabled,

    /// A publish failed.
    #[error(transparent)]
    Publish(#[from] PublishError),

    /// `start` was called twice.
    #[error("Runtime already started")]
    AlreadyStarted,
}

/// Pluggable parts of the runtime.
pub struct RuntimeOptions {
    /// Format handlers for plain and reassembled messages.
    pub handlers: HandlerRegistry,
    /// Publishing identity, if any.
    pub signer: Option<Arc<dyn MessageSigner>>,
    /// Fragment signature check.
    pub verifier: Arc<dyn MessageVerifier>,
    /// Clock for fragment staleness.
    pub time: Arc<dyn TimeSource>,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            handlers: HandlerRegistry::new(),
            signer: None,
            verifier: Arc::new(FloMessageVerifier),
            time: Arc::new(SystemTimeSource),
        }
    }
}

/// The running indexer.
///
/// `C` is the ledger client (reads, output lookups and wallet calls); `S` is
/// the index store.
pub struct IndexerRuntime<C, S>
where
    C: LedgerNode + OutputSource + LedgerWallet + 'static,
    S: BlockStore + FragmentStore + StoreCommit + 'static,
{
    config: NodeConfig,
    bus: Arc<InMemoryEventBus>,
    store: Arc<S>,
    chain_sync: Arc<ChainSyncService<C, S>>,
    reassembler: Arc<MultipartReassembler<S>>,
    ancestry: Arc<AncestryRegistry<C>>,
    publisher: Option<MultipartPublisher<C, C>>,
    handlers: Arc<HandlerRegistry>,
    queued: Option<mpsc::Receiver<QueuedMessage>>,
    cancel: CancellationToken,
    failure: Arc<Mutex<Option<String>>>,
    tasks: Vec<JoinHandle<()>>,
}

impl<C, S> IndexerRuntime<C, S>
where
    C: LedgerNode + OutputSource + LedgerWallet + 'static,
    S: BlockStore + FragmentStore + StoreCommit + 'static,
{
    /// Build every service. Nothing runs until [`start`](Self::start).
    pub fn new(
        config: NodeConfig,
        ledger: Arc<C>,
        store: Arc<S>,
        options: RuntimeOptions,
    ) -> Result<Self, RuntimeError> {
        let bus = Arc::new(InMemoryEventBus::with_capacity(config.storage.bus_capacity));
        let publisher_bus: Arc<dyn EventPublisher> = bus.clone();
        let (queue, queued) = MessageQueue::bounded(config.storage.dispatch_capacity);

        let chain_sync = Arc::new(
            ChainSyncService::new(
                config.chain_sync.clone(),
                ledger.clone(),
                store.clone(),
                publisher_bus.clone(),
            )?
            .with_message_sink(Arc::new(queue.clone())),
        );
        let reassembler = Arc::new(
            MultipartReassembler::new(
                config.reassembler.clone(),
                store.clone(),
                options.verifier,
                publisher_bus,
                options.time,
            )
            .with_message_sink(Arc::new(queue)),
        );
        let ancestry = Arc::new(AncestryRegistry::new(config.ancestry.clone(), ledger.clone()));
        let publisher = options.signer.map(|signer| {
            MultipartPublisher::new(config.splitter.clone(), ledger, ancestry.clone(), signer)
        });

        Ok(Self {
            config,
            bus,
            store,
            chain_sync,
            reassembler,
            ancestry,
            publisher,
            handlers: Arc::new(options.handlers),
            queued: Some(queued),
            cancel: CancellationToken::new(),
            failure: Arc::new(Mutex::new(None)),
            tasks: Vec::new(),
        })
    }

    /// Event bus shared by every service.
    pub fn bus(&self) -> &Arc<InMemoryEventBus> {
        &self.bus
    }

    /// Index store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Token cancelled on shutdown or after a fatal sync error.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Fatal error that stopped the runtime, if any.
    pub fn failure(&self) -> Option<String> {
        self.failure.lock().clone()
    }

    /// Publishing address, when publishing is configured.
    pub fn publish_address(&self) -> Option<&str> {
        self.publisher.as_ref().map(MultipartPublisher::address)
    }

    /// Start the background tasks, catch up to the ledger tip and hand
    /// `notifications` to chain sync. Returns the indexed tip.
    pub async fn start(
        &mut self,
        notifications: mpsc::Receiver<LedgerNotification>,
    ) -> Result<BlockHeader, RuntimeError> {
        let queued = self.queued.take().ok_or(RuntimeError::AlreadyStarted)?;

        // Subscribe before the first block is indexed so nothing is missed.
        let sweep_events = self.bus.subscribe(EventFilter::topics(vec![EventTopic::Storage]));
        let chain_events = self.bus.subscribe(EventFilter::topics(vec![EventTopic::ChainSync]));

        self.tasks.push(tokio::spawn(dispatch_loop(
            queued,
            self.reassembler.clone(),
            self.handlers.clone(),
            self.cancel.clone(),
        )));
        self.tasks.push(tokio::spawn(commit_loop(
            self.store.clone(),
            self.bus.clone(),
            self.config.storage.commit_interval(),
            self.cancel.clone(),
        )));
        let reassembler = self.reassembler.clone();
        let cancel = self.cancel.clone();
        self.tasks
            .push(tokio::spawn(async move { reassembler.run(sweep_events, cancel).await }));
        let ancestry = self.ancestry.clone();
        let cancel = self.cancel.clone();
        self.tasks
            .push(tokio::spawn(async move { ancestry.run(chain_events, cancel).await }));

        let tip = match self.catch_up().await {
            Ok(tip) => tip,
            Err(e) => {
                self.cancel.cancel();
                return Err(e);
            }
        };

        let chain_sync = self.chain_sync.clone();
        let bus = self.bus.clone();
        let failure = self.failure.clone();
        let cancel = self.cancel.clone();
        self.tasks.push(tokio::spawn(async move {
            if let Err(e) = chain_sync.run(notifications, cancel.clone()).await {
                error!(error = %e, "Chain sync stopped");
                *failure.lock() = Some(e.to_string());
                bus.publish(IndexerEvent::CriticalError {
                    subsystem_id: subsystem::CHAIN_SYNC,
                    error: e.to_string(),
                })
                .await;
                cancel.cancel();
            }
        }));

        info!(height = tip.height, hash = %tip.hash, "Indexer running");
        Ok(tip)
    }

    async fn catch_up(&self) -> Result<BlockHeader, RuntimeError> {
        let target = self.chain_sync.status().await?.ledger_tip_height;
        Ok(self.chain_sync.initial_sync(&self.cancel, target).await?)
    }

    /// Publish `payload` from the configured address.
    pub async fn publish_payload(&self, payload: &[u8]) -> Result<Vec<TxId>, RuntimeError> {
        let publisher = self.publisher.as_ref().ok_or(RuntimeError::PublishingDisabled)?;
        Ok(publisher.publish_payload(payload).await?)
    }

    /// Sync progress.
    pub async fn status(&self) -> Result<ChainStatus, RuntimeError> {
        Ok(self.chain_sync.status().await?)
    }

    /// Cancel every task and wait for them to finish.
    pub async fn shutdown(&mut self) {
        info!("Shutting down indexer runtime");
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(error = %e, "Runtime task ended abnormally");
            }
        }
    }
}

/// Route each embedded-data message to the reassembler or the handlers.
///
/// Dropping `queued` on exit releases producers blocked on a full queue.
async fn dispatch_loop<S: FragmentStore + 'static>(
    mut queued: mpsc::Receiver<QueuedMessage>,
    reassembler: Arc<MultipartReassembler<S>>,
    handlers: Arc<HandlerRegistry>,
    cancel: CancellationToken,
) {
    loop {
        let QueuedMessage { message, source } = tokio::select! {
            _ = cancel.cancelled() => break,
            next = queued.recv() => match next {
                Some(next) => next,
                None => break,
            },
        };
        debug!(txid = %message.txid, source, "Dispatching message");
        if matches!(message.origin, MessageOrigin::Transaction) {
            match reassembler.ingest(&message).await {
                Ok(IngestOutcome::NotFragment) => {}
                Ok(outcome) => {
                    debug!(txid = %message.txid, ?outcome, "Fragment ingested");
                    continue;
                }
                Err(e) => {
                    warn!(txid = %message.txid, error = %e, "Fragment ingest failed");
                    continue;
                }
            }
        }
        handlers.dispatch(&message).await;
    }
    info!("Dispatcher stopped");
}

/// Commit the store on a fixed period and announce each cycle.
async fn commit_loop<S: StoreCommit + 'static>(
    store: Arc<S>,
    bus: Arc<InMemoryEventBus>,
    period: std::time::Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        match store.commit().await {
            Ok(cycle) => {
                debug!(cycle, "Store committed");
                bus.publish(IndexerEvent::StorageCommitted { cycle }).await;
            }
            Err(e) => warn!(error = %e, "Store commit failed"),
        }
    }
    info!("Commit ticker stopped");
}
