//! # Multipart Flows
//!
//! Splitter output fed straight back through the reassembler, and a full
//! publish → mine → index → reassemble → dispatch loop through the runtime.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use fi_03_multipart::{
        plan_chain, FragmentLayout, FragmentMessage, InMemoryFragmentStore, IngestOutcome,
        MockSigner, MockTimeSource, MockVerifier, MultipartReassembler, ReassemblerApi,
        ReassemblerConfig, SplitterConfig, DEFAULT_DATA_LIMIT,
    };
    use node_runtime::adapters::{MemoryIndexStore, PollingNotifier};
    use node_runtime::{IndexerRuntime, NodeConfig, RuntimeOptions};
    use shared_bus::{EventFilter, EventTopic, HandlerRegistry, InMemoryEventBus, IndexerEvent};
    use shared_crypto::MessageSigner;
    use shared_types::{BlockRef, FloMessage, MessageOrigin};
    use tokio::sync::mpsc;

    use crate::integration::harness::{noisy_payload, wait_until, RecordingHandler, TestLedger};

    // =========================================================================
    // SPLITTER ↔ REASSEMBLER ROUND TRIP
    // =========================================================================

    /// Plan, sign and encode `payload`, ingest every part in reverse order,
    /// sweep once and return the assembled bytes.
    async fn round_trip(payload: &[u8]) -> Vec<u8> {
        let config = SplitterConfig::for_testing();
        let signer = MockSigner::new(3);
        let layout = FragmentLayout {
            address_len: signer.address().len(),
            signature_len: signer.signature_len(),
        };
        let plan = plan_chain(payload, &layout, &config).unwrap();
        assert_eq!(plan.parts.len(), plan.max as usize + 1);

        let txids: Vec<String> = (0..plan.parts.len()).map(|i| format!("{:064x}", i + 1)).collect();
        let bus = Arc::new(InMemoryEventBus::new());
        let mut assembled = bus.subscribe(EventFilter::topics(vec![EventTopic::FloData]));
        let reassembler = MultipartReassembler::new(
            ReassemblerConfig {
                query_limit: plan.parts.len() * 2,
                ..ReassemblerConfig::for_testing()
            },
            Arc::new(InMemoryFragmentStore::new()),
            Arc::new(MockVerifier),
            bus.clone(),
            Arc::new(MockTimeSource::new(1_600_000_000)),
        );

        for planned in plan.parts.iter().rev() {
            let index = planned.part as usize;
            let mut fragment = FragmentMessage {
                part: planned.part,
                max: plan.max,
                address: signer.address().to_string(),
                reference: if index == 0 { String::new() } else { txids[0].clone() },
                signature: String::new(),
                chunk: planned.chunk.clone(),
            };
            fragment.signature = signer.sign(&fragment.preimage()).unwrap();
            let data = fragment.encode();
            assert!(
                data.len() <= config.data_limit,
                "part {index} is {} bytes",
                data.len()
            );

            let carrier = FloMessage {
                txid: txids[index].clone(),
                block: Some(BlockRef {
                    height: 500,
                    hash: "b".repeat(64),
                }),
                time: 1_600_000_000,
                data: data.into_bytes(),
                origin: MessageOrigin::Transaction,
            };
            let outcome = reassembler.ingest(&carrier).await.unwrap();
            assert!(matches!(outcome, IngestOutcome::Stored { .. }), "part {index}: {outcome:?}");
        }

        let report = reassembler.run_sweep().await.unwrap();
        assert_eq!(report.assembled.len(), 1, "{report:?}");
        match assembled.try_recv().unwrap() {
            Some(IndexerEvent::FloData { message, .. }) => {
                assert_eq!(message.txid, txids[0]);
                assert_eq!(
                    message.origin,
                    MessageOrigin::Reassembled {
                        reference: txids[0][..10].to_string(),
                        parts: plan.max + 1,
                    }
                );
                message.data
            }
            other => panic!("expected FloData, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_round_trip_just_over_limit() {
        let payload = noisy_payload(DEFAULT_DATA_LIMIT + 1, 1);
        assert_eq!(round_trip(&payload).await, payload);
    }

    #[tokio::test]
    async fn test_round_trip_ten_times_limit() {
        let payload = noisy_payload(DEFAULT_DATA_LIMIT * 10, 2);
        assert_eq!(round_trip(&payload).await, payload);
    }

    #[tokio::test]
    async fn test_round_trip_thousand_times_limit() {
        let payload = noisy_payload(DEFAULT_DATA_LIMIT * 1000, 3);
        assert_eq!(round_trip(&payload).await, payload);
    }

    #[tokio::test]
    async fn test_round_trip_compressible_text() {
        let payload = "a fairly repetitive line of text\n".repeat(400).into_bytes();
        assert_eq!(round_trip(&payload).await, payload);
    }

    // =========================================================================
    // PUBLISH → INDEX → REASSEMBLE
    // =========================================================================

    #[tokio::test]
    async fn test_published_chain_is_reassembled_from_blocks() {
        let ledger = TestLedger::linear(20);
        let signer: Arc<dyn MessageSigner> = Arc::new(MockSigner::new(9));
        ledger.fund(signer.address(), 3, 10_000_000);

        let handler = Arc::new(RecordingHandler::default());
        let mut handlers = HandlerRegistry::new();
        handlers.register("", handler.clone());

        let mut config = NodeConfig::for_testing();
        config.ancestry.ancestor_limit = 25;
        let notifier_config = config.notifier.clone();
        let mut runtime = IndexerRuntime::new(
            config,
            ledger.clone(),
            Arc::new(MemoryIndexStore::new()),
            RuntimeOptions {
                handlers,
                signer: Some(signer),
                verifier: Arc::new(MockVerifier),
                time: Arc::new(MockTimeSource::new(ledger.tip().timestamp + 100)),
            },
        )
        .unwrap();

        let (tx, rx) = mpsc::channel(64);
        let tip = runtime.start(rx).await.unwrap();
        assert_eq!(tip.height, 20);
        let notifier = PollingNotifier::new(ledger.clone(), notifier_config, tip);
        let notifier_task = tokio::spawn(notifier.run(tx, runtime.cancel_token()));

        let payload = noisy_payload(DEFAULT_DATA_LIMIT * 2, 42);
        let txids = runtime.publish_payload(&payload).await.unwrap();
        assert!(txids.len() >= 3);

        let block = ledger.mine_broadcasts(0);
        assert_eq!(block.transactions.len(), txids.len());

        wait_until("reassembled message", || {
            handler
                .messages()
                .iter()
                .any(|m| matches!(m.origin, MessageOrigin::Reassembled { .. }))
        })
        .await;

        let messages = handler.messages();
        let reassembled: Vec<&FloMessage> = messages
            .iter()
            .filter(|m| matches!(m.origin, MessageOrigin::Reassembled { .. }))
            .collect();
        assert_eq!(reassembled.len(), 1);
        assert_eq!(reassembled[0].data, payload);
        assert_eq!(reassembled[0].txid, txids[0]);
        assert_eq!(reassembled[0].block.as_ref().map(|b| b.height), Some(21));
        // Raw fragments are never handed to format handlers.
        assert!(messages
            .iter()
            .all(|m| !matches!(m.origin, MessageOrigin::Transaction)));

        runtime.shutdown().await;
        notifier_task.await.unwrap();
    }
}
