//! # Multipart Publisher
//!
//! Publishes a payload from the signer's address. Payloads that fit one
//! transaction go out as-is; anything larger is planned into a chain whose
//! parts each spend the previous part's change.
//!
//! The address's tracker stays locked for the whole chain so a concurrent
//! publish cannot select the same outputs mid-chain.

use async_trait::async_trait;
use fi_02_ancestry::{AncestryApi, AncestryRegistry, AncestryTracker, BroadcastRecord, OutputSource};
use shared_crypto::MessageSigner;
use shared_types::TxId;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::SplitterConfig;
use crate::domain::{is_fragment, plan_chain, FragmentLayout, FragmentMessage, PublishError};
use crate::ports::{LedgerWallet, PublisherApi, TransactionRequest};

/// Splits, signs and funds outgoing payloads.
pub struct MultipartPublisher<W: LedgerWallet, O: OutputSource> {
    config: SplitterConfig,
    wallet: Arc<W>,
    ancestry: Arc<AncestryRegistry<O>>,
    signer: Arc<dyn MessageSigner>,
}

impl<W: LedgerWallet, O: OutputSource> MultipartPublisher<W, O> {
    /// Create a publisher.
    pub fn new(
        config: SplitterConfig,
        wallet: Arc<W>,
        ancestry: Arc<AncestryRegistry<O>>,
        signer: Arc<dyn MessageSigner>,
    ) -> Self {
        Self {
            config,
            wallet,
            ancestry,
            signer,
        }
    }

    /// Address every transaction is funded from and signed by.
    pub fn address(&self) -> &str {
        self.signer.address()
    }

    fn fits_single(&self, payload: &[u8]) -> bool {
        payload.len() <= self.config.data_limit
            && std::str::from_utf8(payload).is_ok()
            && !is_fragment(payload)
    }

    /// Fund, build and broadcast one transaction, then record it.
    async fn send(
        &self,
        tracker: &mut AncestryTracker,
        flo_data: String,
    ) -> Result<TxId, PublishError> {
        let selection = tracker.select_inputs(self.config.fee)?;
        let request = TransactionRequest {
            inputs: selection.inputs.clone(),
            change_address: self.address().to_string(),
            fee: self.config.fee,
            flo_data,
        };
        let built = self.wallet.build_transaction(&request).await?;
        let txid = self.wallet.broadcast(&built.raw).await?;

        tracker.record_broadcast(BroadcastRecord {
            txid: txid.clone(),
            spent: selection.keys(),
            change: built.change,
        });
        Ok(txid)
    }

    async fn publish_chain(
        &self,
        payload: &[u8],
        tracker: &mut AncestryTracker,
    ) -> Result<Vec<TxId>, PublishError> {
        let layout = FragmentLayout {
            address_len: self.address().len(),
            signature_len: self.signer.signature_len(),
        };
        let plan = plan_chain(payload, &layout, &self.config)?;
        info!(
            bytes = payload.len(),
            parts = plan.parts.len(),
            rebuilds = plan.rebuilds,
            "Publishing multipart chain"
        );

        let mut txids: Vec<TxId> = Vec::with_capacity(plan.parts.len());
        for planned in plan.parts {
            let reference = txids.first().cloned().unwrap_or_default();
            let mut message = FragmentMessage {
                part: planned.part,
                max: plan.max,
                address: self.address().to_string(),
                reference,
                signature: String::new(),
                chunk: planned.chunk,
            };
            message.signature = self.signer.sign(&message.preimage())?;

            let encoded = message.encode();
            if encoded.len() > self.config.data_limit {
                return Err(PublishError::Oversized {
                    part: planned.part,
                    len: encoded.len(),
                    limit: self.config.data_limit,
                });
            }

            match self.send(tracker, encoded).await {
                Ok(txid) => {
                    debug!(part = planned.part, %txid, "Part broadcast");
                    txids.push(txid);
                }
                Err(e) => {
                    if !txids.is_empty() {
                        warn!(
                            part = planned.part,
                            broadcast = txids.len(),
                            error = %e,
                            "Chain interrupted; earlier parts were already broadcast"
                        );
                    }
                    return Err(e);
                }
            }
        }
        Ok(txids)
    }
}

#[async_trait]
impl<W: LedgerWallet, O: OutputSource> PublisherApi for MultipartPublisher<W, O> {
    async fn publish_payload(&self, payload: &[u8]) -> Result<Vec<TxId>, PublishError> {
        let address = self.address().to_string();
        let handle = self.ancestry.tracker(&address);

        let empty = handle.lock().await.spendable_count() == 0;
        if empty {
            self.ancestry.refresh(&address).await?;
        }

        let mut tracker = handle.lock().await;
        if !payload.is_empty() && self.fits_single(payload) {
            let text = String::from_utf8_lossy(payload).into_owned();
            let txid = self.send(&mut tracker, text).await?;
            info!(%txid, bytes = payload.len(), "Published single transaction");
            return Ok(vec![txid]);
        }
        self.publish_chain(payload, &mut tracker).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{strip_fragment_prefix, SplitError};
    use crate::ports::{MockLedgerWallet, MockSigner, MockVerifier};
    use fi_02_ancestry::{AncestryConfig, MockOutputSource, RawOutput};
    use shared_crypto::MessageVerifier;
    use shared_types::UnspentOutput;
    use std::sync::atomic::Ordering;

    struct Harness {
        wallet: Arc<MockLedgerWallet>,
        source: Arc<MockOutputSource>,
        ancestry: Arc<AncestryRegistry<MockOutputSource>>,
        publisher: MultipartPublisher<MockLedgerWallet, MockOutputSource>,
    }

    fn harness() -> Harness {
        let wallet = Arc::new(MockLedgerWallet::new());
        let source = Arc::new(MockOutputSource::new());
        let ancestry = Arc::new(AncestryRegistry::new(AncestryConfig::for_testing(), source.clone()));
        let publisher = MultipartPublisher::new(
            SplitterConfig::for_testing(),
            wallet.clone(),
            ancestry.clone(),
            Arc::new(MockSigner::new(3)),
        );
        Harness {
            wallet,
            source,
            ancestry,
            publisher,
        }
    }

    fn fund(h: &Harness, outputs: u8) {
        let address = h.publisher.address().to_string();
        let raw = (0..outputs)
            .map(|n| RawOutput {
                output: UnspentOutput {
                    txid: format!("{:02x}", n + 0x10).repeat(32),
                    index: 0,
                    script: "76a9".to_string(),
                    value: 1_000_000,
                    confirmations: 6,
                    address: address.clone(),
                },
                spent: false,
                parents: Vec::new(),
            })
            .collect();
        h.source.set_outputs(&address, raw);
    }

    #[tokio::test]
    async fn test_small_text_is_one_transaction() {
        let h = harness();
        fund(&h, 1);
        let txids = h.publisher.publish_payload(b"text:hello").await.unwrap();
        assert_eq!(txids.len(), 1);

        let broadcasts = h.wallet.broadcasts();
        assert_eq!(broadcasts[0].1.flo_data, "text:hello");
        assert_eq!(broadcasts[0].1.fee, 1_000);
    }

    #[tokio::test]
    async fn test_chain_spends_previous_change() {
        let h = harness();
        fund(&h, 1);
        let payload = "chained payload ".repeat(200).into_bytes();

        let txids = h.publisher.publish_payload(&payload).await.unwrap();
        assert!(txids.len() >= 2);

        let broadcasts = h.wallet.broadcasts();
        assert_eq!(broadcasts.len(), txids.len());
        for window in broadcasts.windows(2) {
            let (previous, _) = &window[0];
            let (_, request) = &window[1];
            assert_eq!(&request.inputs[0].txid, previous);
        }

        // Every part references part 0's txid and verifies.
        for (i, (_, request)) in broadcasts.iter().enumerate() {
            assert!(request.flo_data.len() <= 1040);
            let body = strip_fragment_prefix(&request.flo_data).unwrap();
            let message = FragmentMessage::parse(body).unwrap();
            assert_eq!(message.part as usize, i);
            if i > 0 {
                assert_eq!(message.reference, txids[0]);
            }
            assert!(MockVerifier.verify(&message.preimage(), &message.address, &message.signature));
        }

        let tracker = h.ancestry.tracker(h.publisher.address());
        let tracker = tracker.lock().await;
        assert_eq!(tracker.spendable_count(), 1);
        assert_eq!(tracker.balance(), 1_000_000 - 1_000 * txids.len() as u64);
    }

    #[tokio::test]
    async fn test_ancestor_limit_stops_long_chain() {
        let h = harness();
        fund(&h, 1);
        // Each text payload is its own transaction; the limit is 5 in testing.
        for n in 0..5 {
            let payload = format!("text:{n}");
            h.publisher.publish_payload(payload.as_bytes()).await.unwrap();
        }
        let err = h.publisher.publish_payload(b"text:5").await.unwrap_err();
        assert!(matches!(err, PublishError::Funding(_)));
        assert_eq!(h.wallet.broadcasts().len(), 5);
    }

    #[tokio::test]
    async fn test_unfunded_address_fails() {
        let h = harness();
        let err = h.publisher.publish_payload(b"text:x").await.unwrap_err();
        assert!(matches!(err, PublishError::Funding(_)));
        assert!(h.wallet.broadcasts().is_empty());
    }

    #[tokio::test]
    async fn test_empty_payload_rejected() {
        let h = harness();
        fund(&h, 1);
        let err = h.publisher.publish_payload(b"").await.unwrap_err();
        assert!(matches!(err, PublishError::Split(SplitError::EmptyPayload)));
    }

    #[tokio::test]
    async fn test_broadcast_failure_surfaces() {
        let h = harness();
        fund(&h, 1);
        h.ancestry.refresh(h.publisher.address()).await.unwrap();
        h.wallet.should_fail.store(true, Ordering::SeqCst);
        let err = h.publisher.publish_payload(b"text:x").await.unwrap_err();
        assert!(matches!(err, PublishError::Ledger(_)));
    }
}
