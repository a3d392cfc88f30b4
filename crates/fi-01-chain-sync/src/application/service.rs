//! # Chain Sync Service
//!
//! Applies ledger notifications to the index in chain order.
//!
//! The service assumes a single notification stream per ledger node, but
//! every method takes `&self` and is safe to call from several tasks: the
//! window lock plus the disconnect gate serialize connects against
//! in-flight disconnects, and the gap-fill slot keeps fills single-flight.

use async_trait::async_trait;
use parking_lot::RwLock;
use shared_bus::{subsystem, BusSink, EventPublisher, IndexerEvent, MessageSink};
use shared_types::{BlockHeader, BlockRecord, ChainStatus, LedgerError};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::coordination::{DisconnectGate, GapFillGuard, GapFillSlot};
use crate::config::ChainSyncConfig;
use crate::domain::{BlockPlacement, ChainSyncError, RecentBlockWindow};
use crate::ports::{BlockStore, ChainSyncApi, ConnectOutcome, LedgerNode, LedgerNotification};

/// Result of one attempt to index the block above the tip.
enum Step {
    Indexed(u64),
    Reached(BlockHeader),
    Diverged(u64),
}

/// Clears a flag on drop.
struct FlagReset<'a>(&'a AtomicBool);

impl Drop for FlagReset<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Chain Sync Service - keeps the index on the ledger's best chain.
pub struct ChainSyncService<L: LedgerNode, S: BlockStore> {
    config: ChainSyncConfig,
    ledger: Arc<L>,
    store: Arc<S>,
    bus: Arc<dyn EventPublisher>,
    /// Where embedded-data messages go. Defaults to the bus.
    messages: Arc<dyn MessageSink>,
    /// Recent-block window. Held for the whole of each block's indexing.
    window: Mutex<RecentBlockWindow>,
    /// Copy of the window tip for lock-free status reads.
    tip: RwLock<Option<BlockHeader>>,
    disconnects: DisconnectGate,
    gap_fill: GapFillSlot,
    initial_sync: AtomicBool,
}

impl<L: LedgerNode, S: BlockStore> ChainSyncService<L, S> {
    /// Create a new chain sync service.
    pub fn new(
        config: ChainSyncConfig,
        ledger: Arc<L>,
        store: Arc<S>,
        bus: Arc<dyn EventPublisher>,
    ) -> Result<Self, ChainSyncError> {
        let window = RecentBlockWindow::new(config.window_slots)?;
        let messages: Arc<dyn MessageSink> = Arc::new(BusSink::new(bus.clone()));
        Ok(Self {
            config,
            ledger,
            store,
            bus,
            messages,
            window: Mutex::new(window),
            tip: RwLock::new(None),
            disconnects: DisconnectGate::default(),
            gap_fill: GapFillSlot::default(),
            initial_sync: AtomicBool::new(false),
        })
    }

    /// Send embedded-data messages to `sink` instead of the bus.
    ///
    /// Indexing waits on `sink`, so a bounded queue throttles the sync to
    /// the pace of whoever drains it.
    #[must_use]
    pub fn with_message_sink(mut self, sink: Arc<dyn MessageSink>) -> Self {
        self.messages = sink;
        self
    }

    /// Newest indexed header.
    pub fn indexed_tip(&self) -> Option<BlockHeader> {
        self.tip.read().clone()
    }

    /// Whether a gap fill is running.
    pub fn is_gap_filling(&self) -> bool {
        self.gap_fill.is_active()
    }

    /// Number of disconnects currently in flight.
    pub fn disconnects_in_flight(&self) -> usize {
        self.disconnects.in_flight()
    }

    /// Number of headers in the recent-block window.
    pub async fn window_len(&self) -> usize {
        self.window.lock().await.len()
    }

    /// Verify the stored tip against the ledger and seed the window.
    ///
    /// Fails with `HashMismatch` when the index and the ledger disagree at
    /// the stored tip; the caller must not continue syncing.
    pub async fn initialize(&self) -> Result<BlockHeader, ChainSyncError> {
        let mut window = self.window.lock().await;
        if let Some(block) = self.store.get_last_block().await? {
            let ledger_hash = self.ledger_call(self.ledger.get_block_hash(block.height)).await?;
            if ledger_hash != block.hash {
                error!(
                    height = block.height,
                    stored = %block.hash,
                    ledger = %ledger_hash,
                    "Indexed tip is not on the ledger's best chain"
                );
                return Err(ChainSyncError::HashMismatch {
                    height: block.height,
                    stored: block.hash,
                    ledger: ledger_hash,
                });
            }
            let header = block.header();
            window.seed(header.clone());
            self.set_tip(&window);
            info!(height = header.height, hash = %header.hash, "Resuming from stored tip");
            return Ok(header);
        }
        self.ensure_tip(&mut window).await
    }

    /// Index a block that joined the best chain.
    pub async fn on_block_connected(
        &self,
        header: BlockHeader,
        cancel: &CancellationToken,
    ) -> Result<ConnectOutcome, ChainSyncError> {
        let mut window = self.lock_window().await;
        let tip = self.ensure_tip(&mut window).await?;

        match window.classify(&header) {
            BlockPlacement::Continuation => {
                let block = self.ledger_call(self.ledger.get_block_verbose(&header.hash)).await?;
                self.index_block(&mut window, block).await?;
                Ok(ConnectOutcome::Indexed {
                    height: header.height,
                })
            }
            BlockPlacement::Gap { from, to } => {
                let Some(guard) = self.gap_fill.try_begin(header.height) else {
                    debug!(height = header.height, "Gap fill in progress; deferring");
                    return Ok(ConnectOutcome::Deferred {
                        target: header.height,
                    });
                };
                info!(from, to, target = header.height, "Gap detected; filling");
                drop(window);
                self.fill_gap(guard, header.height, cancel).await
            }
            BlockPlacement::Behind | BlockPlacement::Unanchored => {
                info!(
                    height = header.height,
                    hash = %header.hash,
                    tip = tip.height,
                    "Connect at or behind indexed tip; ignoring"
                );
                Ok(ConnectOutcome::Ignored {
                    height: header.height,
                })
            }
        }
    }

    /// Unwind a block that left the best chain.
    pub async fn on_block_disconnected(&self, header: BlockHeader) -> Result<(), ChainSyncError> {
        let _in_flight = self.disconnects.enter();
        let mut window = self.window.lock().await;

        if !self.store.mark_orphaned(&header.hash).await? {
            warn!(height = header.height, hash = %header.hash, "Disconnected block was never indexed");
        }
        match window.pop_tip() {
            Ok(popped) if popped.hash != header.hash => warn!(
                expected = %header.hash,
                popped = %popped.hash,
                height = popped.height,
                "Disconnect out of order with window tip"
            ),
            Ok(_) => {}
            Err(_) => warn!(height = header.height, "Disconnect with empty window"),
        }
        self.set_tip(&window);
        drop(window);

        info!(height = header.height, hash = %header.hash, "Block disconnected");
        self.bus.publish(IndexerEvent::BlockDisconnected(header)).await;
        Ok(())
    }

    /// Record a transaction that entered the mempool.
    pub async fn on_unconfirmed_transaction(&self, txid: &str) -> Result<(), ChainSyncError> {
        let tx = self.ledger_call(self.ledger.get_transaction(txid)).await?;
        self.store.put_transaction(&tx).await?;
        if tx.has_flo_data() {
            self.messages
                .deliver(tx.to_message(), subsystem::CHAIN_SYNC)
                .await?;
        }
        Ok(())
    }

    /// Consume notifications in order until cancelled or the channel closes.
    pub async fn run(
        &self,
        mut notifications: mpsc::Receiver<LedgerNotification>,
        cancel: CancellationToken,
    ) -> Result<(), ChainSyncError> {
        loop {
            let notification = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                next = notifications.recv() => match next {
                    Some(n) => n,
                    None => return Ok(()),
                },
            };
            match self.handle_notification(notification, &cancel).await {
                Err(ChainSyncError::Cancelled(height)) => {
                    info!(height, "Sync loop cancelled");
                    return Ok(());
                }
                Err(ChainSyncError::DeliveryFailed(_)) if cancel.is_cancelled() => {
                    info!("Sync loop stopped with the dispatcher");
                    return Ok(());
                }
                other => other?,
            }
        }
    }

    // -------------------------------------------------------------------------
    // internals
    // -------------------------------------------------------------------------

    /// Lock the window once no disconnect is in flight.
    async fn lock_window(&self) -> MutexGuard<'_, RecentBlockWindow> {
        loop {
            self.disconnects.wait_idle().await;
            let window = self.window.lock().await;
            // A disconnect may have registered while we waited for the lock.
            if self.disconnects.in_flight() == 0 {
                return window;
            }
        }
    }

    async fn ledger_call<T, F>(&self, call: F) -> Result<T, ChainSyncError>
    where
        F: Future<Output = Result<T, LedgerError>>,
    {
        match tokio::time::timeout(self.config.fetch_timeout(), call).await {
            Ok(result) => result.map_err(ChainSyncError::FetchFailed),
            Err(_) => Err(ChainSyncError::FetchFailed(LedgerError::Timeout(
                self.config.fetch_timeout_ms,
            ))),
        }
    }

    fn set_tip(&self, window: &RecentBlockWindow) {
        *self.tip.write() = window.tip().cloned();
    }

    /// Tip of the window, re-seeding it from storage (or the configured
    /// start height) when a deep unwind emptied it.
    async fn ensure_tip(&self, window: &mut RecentBlockWindow) -> Result<BlockHeader, ChainSyncError> {
        if let Some(tip) = window.tip() {
            return Ok(tip.clone());
        }
        if let Some(block) = self.store.get_last_block().await? {
            let header = block.header();
            window.seed(header.clone());
            self.set_tip(window);
            debug!(height = header.height, "Window re-seeded from storage");
            return Ok(header);
        }
        let start = self.config.start_height;
        let hash = self.ledger_call(self.ledger.get_block_hash(start)).await?;
        let block = self.ledger_call(self.ledger.get_block_verbose(&hash)).await?;
        let header = block.header();
        self.index_block(window, block).await?;
        info!(height = start, "Indexed start block");
        Ok(header)
    }

    /// Persist a block, push it on the window and announce it.
    ///
    /// The store write happens first, so a failure leaves the window on the
    /// previous tip. Messages are delivered in block order; a full sink
    /// holds the window lock until it drains.
    async fn index_block(
        &self,
        window: &mut RecentBlockWindow,
        block: BlockRecord,
    ) -> Result<(), ChainSyncError> {
        let header = block.header();
        self.store.put_block(&block).await?;
        window.push(header.clone())?;
        self.set_tip(window);

        debug!(
            height = header.height,
            hash = %header.hash,
            txs = block.transactions.len(),
            "Block indexed"
        );
        self.bus.publish(IndexerEvent::BlockConnected(header)).await;
        for tx in block.transactions.iter().filter(|tx| tx.has_flo_data()) {
            self.messages
                .deliver(tx.to_message(), subsystem::CHAIN_SYNC)
                .await?;
        }
        Ok(())
    }

    /// Index the best-chain block directly above the tip, unless the tip
    /// already reached `target`.
    async fn advance_next(&self, target: u64) -> Result<Step, ChainSyncError> {
        let mut window = self.lock_window().await;
        let tip = self.ensure_tip(&mut window).await?;
        if tip.height >= target {
            return Ok(Step::Reached(tip));
        }

        let height = tip.height + 1;
        let hash = self.ledger_call(self.ledger.get_block_hash(height)).await?;
        let block = self.ledger_call(self.ledger.get_block_verbose(&hash)).await?;
        if block.previous_hash != tip.hash {
            warn!(
                height,
                parent = %block.previous_hash,
                tip = %tip.hash,
                "Ledger block does not extend indexed tip"
            );
            return Ok(Step::Diverged(height));
        }
        self.index_block(&mut window, block).await?;
        Ok(Step::Indexed(height))
    }

    async fn fill_gap(
        &self,
        mut guard: GapFillGuard<'_>,
        target: u64,
        cancel: &CancellationToken,
    ) -> Result<ConnectOutcome, ChainSyncError> {
        let mut target = target;
        let mut filled: Option<(u64, u64)> = None;

        loop {
            if cancel.is_cancelled() {
                let height = self.indexed_tip().map_or(0, |t| t.height);
                return Err(ChainSyncError::Cancelled(height));
            }
            match self.advance_next(target).await? {
                Step::Indexed(height) => {
                    filled = Some(filled.map_or((height, height), |(from, _)| (from, height)));
                }
                Step::Reached(_) => match guard.next_target() {
                    Some(deferred) => target = target.max(deferred),
                    None => break,
                },
                Step::Diverged(height) => {
                    warn!(height, "Stopping gap fill until disconnects arrive");
                    break;
                }
            }
        }
        drop(guard);

        Ok(match filled {
            Some((from, to)) => {
                info!(from, to, "Gap filled");
                ConnectOutcome::GapFilled { from, to }
            }
            None => ConnectOutcome::Ignored { height: target },
        })
    }
}

#[async_trait]
impl<L: LedgerNode, S: BlockStore> ChainSyncApi for ChainSyncService<L, S> {
    async fn initial_sync(
        &self,
        cancel: &CancellationToken,
        target_height: u64,
    ) -> Result<BlockHeader, ChainSyncError> {
        self.initial_sync.store(true, Ordering::SeqCst);
        let _reset = FlagReset(&self.initial_sync);

        let start = self.initialize().await?;
        info!(from = start.height, to = target_height, "Initial sync started");
        loop {
            if cancel.is_cancelled() {
                let height = self.indexed_tip().map_or(start.height, |t| t.height);
                return Err(ChainSyncError::Cancelled(height));
            }
            match self.advance_next(target_height).await? {
                Step::Indexed(height) if height % 1000 == 0 => {
                    info!(height, target = target_height, "Initial sync progress");
                }
                Step::Indexed(_) => {}
                Step::Reached(tip) => {
                    info!(height = tip.height, "Initial sync complete");
                    return Ok(tip);
                }
                Step::Diverged(height) => return Err(ChainSyncError::Diverged(height)),
            }
        }
    }

    async fn handle_notification(
        &self,
        notification: LedgerNotification,
        cancel: &CancellationToken,
    ) -> Result<(), ChainSyncError> {
        match notification {
            LedgerNotification::BlockConnected(header) => {
                self.on_block_connected(header, cancel).await.map(|_| ())
            }
            LedgerNotification::BlockDisconnected(header) => {
                self.on_block_disconnected(header).await
            }
            LedgerNotification::TransactionAccepted(txid) => {
                self.on_unconfirmed_transaction(&txid).await
            }
        }
    }

    async fn status(&self) -> Result<ChainStatus, ChainSyncError> {
        let tip = self.indexed_tip();
        let ledger_tip_height = self.ledger_call(self.ledger.get_block_count()).await?;
        Ok(ChainStatus {
            is_initial_sync: self.initial_sync.load(Ordering::SeqCst),
            indexed_height: tip.as_ref().map_or(0, |t| t.height),
            indexed_timestamp: tip.as_ref().map_or(0, |t| t.timestamp),
            ledger_tip_height,
        })
    }
}
