//! # Multipart Reassembler
//!
//! Ingest stores validated fragments as pending records. A sweep, run once
//! per storage commit, groups pending records by reference, publishes every
//! set that became complete and retires sets past retention.
//!
//! Sweeps never overlap: a sweep that finds another one running returns a
//! skipped report and leaves the work to the next commit.

use async_trait::async_trait;
use shared_bus::{subsystem, BusSink, EventPublisher, IndexerEvent, MessageSink, Subscription};
use shared_crypto::MessageVerifier;
use shared_types::{FloMessage, FragmentStatus, FragmentUpdate, MessageOrigin};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ReassemblerConfig;
use crate::domain::{assemble, fragment_from_message, group_fragments, ReassemblerError};
use crate::ports::{
    FragmentStore, FragmentWrite, IngestOutcome, ReassemblerApi, SweepReport, TimeSource,
};

/// Fragment ingest and completion sweeps over a [`FragmentStore`].
pub struct MultipartReassembler<S: FragmentStore> {
    config: ReassemblerConfig,
    store: Arc<S>,
    verifier: Arc<dyn MessageVerifier>,
    messages: Arc<dyn MessageSink>,
    time: Arc<dyn TimeSource>,
    sweep_lock: Mutex<()>,
}

impl<S: FragmentStore> MultipartReassembler<S> {
    /// Create a reassembler that publishes assembled messages on `bus`.
    pub fn new(
        config: ReassemblerConfig,
        store: Arc<S>,
        verifier: Arc<dyn MessageVerifier>,
        bus: Arc<dyn EventPublisher>,
        time: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            config,
            store,
            verifier,
            messages: Arc::new(BusSink::new(bus)),
            time,
            sweep_lock: Mutex::new(()),
        }
    }

    /// Send assembled messages to `sink` instead of the bus.
    #[must_use]
    pub fn with_message_sink(mut self, sink: Arc<dyn MessageSink>) -> Self {
        self.messages = sink;
        self
    }

    /// Fragment store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Sweep after every storage commit until cancelled.
    pub async fn run(&self, mut events: Subscription, cancel: CancellationToken) {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            if let IndexerEvent::StorageCommitted { cycle } = event {
                match self.run_sweep().await {
                    Ok(report) if report.skipped => debug!(cycle, "Sweep already running"),
                    Ok(report) => debug!(
                        cycle,
                        groups = report.groups,
                        assembled = report.assembled.len(),
                        stale = report.stale.len(),
                        "Sweep finished"
                    ),
                    Err(e) => warn!(cycle, error = %e, "Sweep failed"),
                }
            }
        }
        // A lagging subscription only loses commit ticks; the next sweep
        // picks up whatever the missed ones would have.
        info!(lagged = events.lagged(), "Multipart reassembler stopped");
    }
}

#[async_trait]
impl<S: FragmentStore> ReassemblerApi for MultipartReassembler<S> {
    async fn ingest(&self, message: &FloMessage) -> Result<IngestOutcome, ReassemblerError> {
        let record = match fragment_from_message(message, self.verifier.as_ref()) {
            None => return Ok(IngestOutcome::NotFragment),
            Some(Err(e)) => {
                debug!(txid = %message.txid, error = %e, "Fragment rejected");
                return Ok(IngestOutcome::Rejected(e));
            }
            Some(Ok(record)) => record,
        };

        let reference = record.reference.clone();
        let part = record.part;
        match self.store.put_fragment(&record).await? {
            FragmentWrite::Inserted => {
                debug!(txid = %message.txid, %reference, part, "Fragment stored");
                Ok(IngestOutcome::Stored { reference, part })
            }
            FragmentWrite::Confirmed => {
                debug!(txid = %message.txid, %reference, part, "Fragment confirmed");
                Ok(IngestOutcome::Confirmed { reference, part })
            }
            FragmentWrite::Unchanged => Ok(IngestOutcome::Duplicate { reference, part }),
        }
    }

    async fn run_sweep(&self) -> Result<SweepReport, ReassemblerError> {
        let Ok(_guard) = self.sweep_lock.try_lock() else {
            return Ok(SweepReport {
                skipped: true,
                ..SweepReport::default()
            });
        };

        let pending = self
            .store
            .query_fragments(FragmentStatus::Pending, self.config.query_limit)
            .await?;
        let grouping = group_fragments(pending, self.config.max_groups_per_cycle);
        let now = self.time.now();

        let mut report = SweepReport {
            groups: grouping.groups.len(),
            deferred: grouping.deferred,
            ..SweepReport::default()
        };
        if grouping.deferred > 0 {
            info!(deferred = grouping.deferred, "Fragment groups deferred to next cycle");
        }

        for group in grouping.groups {
            match assemble(&group) {
                Ok(Some(message)) => {
                    info!(
                        reference = %message.reference,
                        parts = message.parts,
                        bytes = message.payload.len(),
                        "Multipart message assembled"
                    );
                    let reference = message.reference.clone();
                    let updates: Vec<FragmentUpdate> = group
                        .txids()
                        .into_iter()
                        .map(|txid| FragmentUpdate::Complete {
                            txid,
                            assembled: message.payload.clone(),
                        })
                        .collect();

                    // Deliver before marking complete: a failed hand-off
                    // leaves the set pending for the next sweep.
                    self.messages
                        .deliver(
                            FloMessage {
                                txid: message.head.txid.clone(),
                                block: message.head.block.clone(),
                                time: message.head.time,
                                data: message.payload,
                                origin: MessageOrigin::Reassembled {
                                    reference: reference.clone(),
                                    parts: message.parts,
                                },
                            },
                            subsystem::MULTIPART,
                        )
                        .await?;
                    self.store.batch_update_fragments(&updates).await?;
                    report.assembled.push(reference);
                }
                Ok(None) if group.is_stale(now, self.config.retention_secs) => {
                    let updates: Vec<FragmentUpdate> = group
                        .txids()
                        .into_iter()
                        .map(|txid| FragmentUpdate::Stale { txid })
                        .collect();
                    self.store.batch_update_fragments(&updates).await?;
                    debug!(reference = %group.reference, members = updates.len(), "Fragment set stale");
                    report.stale.push(group.reference);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(reference = %group.reference, error = %e, "Fragment set failed to decode");
                    report.decode_failures += 1;
                }
            }
        }

        Ok(report)
    }
}
