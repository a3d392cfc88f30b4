//! # Polling Notifier
//!
//! Turns ledger polling into [`LedgerNotification`]s for chain sync.
//!
//! On start the notifier walks back from the indexed tip by parent hash so
//! a reorg below the tip is still seen. Each poll:
//! 1. walks the announced headers from the top, disconnecting every one the
//!    node no longer has at its height;
//! 2. announces the new best-chain blocks, one per height when the advance
//!    is within `reorg_depth`, otherwise only the tip (chain sync fills the
//!    gap);
//! 3. announces txids that entered the mempool since the last poll.

use fi_01_chain_sync::{LedgerNode, LedgerNotification};
use shared_types::{BlockHeader, LedgerError, TxId};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::NotifierConfig;

/// Polls a [`LedgerNode`] and emits notifications in chain order.
pub struct PollingNotifier<L: LedgerNode> {
    ledger: Arc<L>,
    config: NotifierConfig,
    announced: VecDeque<BlockHeader>,
    mempool: HashSet<TxId>,
}

impl<L: LedgerNode> PollingNotifier<L> {
    /// Start from the indexed tip.
    pub fn new(ledger: Arc<L>, config: NotifierConfig, indexed_tip: BlockHeader) -> Self {
        Self {
            ledger,
            config,
            announced: VecDeque::from([indexed_tip]),
            mempool: HashSet::new(),
        }
    }

    /// Load up to `reorg_depth` ancestors of the oldest announced header,
    /// following parent hashes. Returns how many were added.
    pub async fn backfill(&mut self) -> Result<usize, LedgerError> {
        let mut added = 0;
        while self.announced.len() < self.config.reorg_depth {
            let Some(oldest) = self.announced.front() else {
                break;
            };
            if oldest.height == 0 {
                break;
            }
            let parent = self.ledger.get_block_header(&oldest.previous_hash).await?;
            self.announced.push_front(parent);
            added += 1;
        }
        Ok(added)
    }

    /// Newest announced header.
    pub fn announced_tip(&self) -> Option<&BlockHeader> {
        self.announced.back()
    }

    /// One poll. On error nothing is emitted and the announced headers are
    /// left as they were.
    pub async fn poll_once(&mut self) -> Result<Vec<LedgerNotification>, LedgerError> {
        let saved = self.announced.clone();
        let result = self.poll_ledger().await;
        if result.is_err() {
            self.announced = saved;
        }
        result
    }

    async fn poll_ledger(&mut self) -> Result<Vec<LedgerNotification>, LedgerError> {
        let mut out = Vec::new();
        let count = self.ledger.get_block_count().await?;

        while let Some(top) = self.announced.back() {
            if top.height <= count && self.ledger.get_block_hash(top.height).await? == top.hash {
                break;
            }
            let top = top.clone();
            debug!(height = top.height, hash = %top.hash, "Announced block left the best chain");
            out.push(LedgerNotification::BlockDisconnected(top));
            self.announced.pop_back();
        }
        if self.announced.is_empty() && !out.is_empty() {
            warn!(depth = out.len(), "Reorg deeper than remembered headers");
        }

        let next = match self.announced.back() {
            Some(top) if count <= top.height => None,
            Some(top) if count - top.height <= self.config.reorg_depth as u64 => Some(top.height + 1),
            _ => Some(count),
        };
        if let Some(from) = next {
            for height in from..=count {
                let hash = self.ledger.get_block_hash(height).await?;
                let header = self.ledger.get_block_header(&hash).await?;
                out.push(LedgerNotification::BlockConnected(header.clone()));
                self.announced.push_back(header);
            }
            while self.announced.len() > self.config.reorg_depth.max(1) {
                self.announced.pop_front();
            }
        }

        let current: HashSet<TxId> = self.ledger.get_raw_mempool().await?.into_iter().collect();
        let mut entered: Vec<&TxId> = current.difference(&self.mempool).collect();
        entered.sort();
        out.extend(
            entered
                .into_iter()
                .map(|txid| LedgerNotification::TransactionAccepted(txid.clone())),
        );
        self.mempool = current;

        Ok(out)
    }

    /// Poll until cancelled or the receiver is gone.
    ///
    /// Poll errors are logged; the next tick retries from the same state.
    pub async fn run(mut self, sender: mpsc::Sender<LedgerNotification>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        match self.backfill().await {
            Ok(added) => debug!(added, "Notifier history loaded"),
            Err(e) => warn!(error = %e, "Notifier history incomplete"),
        }

        'poll: loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let notifications = match self.poll_once().await {
                Ok(n) => n,
                Err(e) => {
                    warn!(error = %e, "Ledger poll failed");
                    continue;
                }
            };
            for notification in notifications {
                if sender.send(notification).await.is_err() {
                    break 'poll;
                }
            }
        }
        info!("Polling notifier stopped");
    }
}
