//! # Chain Sync Flows
//!
//! Ledger changes observed by the polling notifier, applied by chain sync
//! and visible in the store and at the handlers.
//!
//! ## Flows Tested
//!
//! 1. Reorg below the tip: old blocks orphaned, new branch indexed
//! 2. Mempool transaction: stored unconfirmed, dispatched with no block
//! 3. Restart: resumes from the stored tip without refetching
//! 4. Restart after an offline reorg: refuses to start

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use fi_01_chain_sync::{mock_block, mock_block_hash, ChainSyncError};
    use node_runtime::adapters::{MemoryIndexStore, PollingNotifier};
    use node_runtime::{IndexerRuntime, NodeConfig, RuntimeError, RuntimeOptions};
    use shared_bus::HandlerRegistry;
    use shared_types::TransactionRecord;
    use tokio::sync::mpsc;
    use tokio::task::JoinHandle;

    use crate::integration::harness::{wait_until, RecordingHandler, TestLedger};

    type Runtime = IndexerRuntime<TestLedger, MemoryIndexStore>;

    /// Start a runtime plus notifier over `ledger` and `store`.
    async fn start(
        ledger: &Arc<TestLedger>,
        store: &Arc<MemoryIndexStore>,
        handler: &Arc<RecordingHandler>,
    ) -> (Runtime, JoinHandle<()>) {
        let mut handlers = HandlerRegistry::new();
        handlers.register("", handler.clone());
        let config = NodeConfig::for_testing();
        let notifier_config = config.notifier.clone();
        let mut runtime = IndexerRuntime::new(
            config,
            ledger.clone(),
            store.clone(),
            RuntimeOptions {
                handlers,
                ..RuntimeOptions::default()
            },
        )
        .unwrap();

        let (tx, rx) = mpsc::channel(64);
        let tip = runtime.start(rx).await.unwrap();
        let notifier = PollingNotifier::new(ledger.clone(), notifier_config, tip);
        let task = tokio::spawn(notifier.run(tx, runtime.cancel_token()));
        (runtime, task)
    }

    async fn stop(mut runtime: Runtime, notifier: JoinHandle<()>) {
        runtime.shutdown().await;
        notifier.await.unwrap();
    }

    #[tokio::test]
    async fn test_reorg_below_tip_reindexes_new_branch() {
        let ledger = TestLedger::linear(8);
        let store = Arc::new(MemoryIndexStore::new());
        let handler = Arc::new(RecordingHandler::default());
        let (runtime, notifier) = start(&ledger, &store, &handler).await;

        ledger.node.reorg_to(vec![
            mock_block(7, 1, 0, &[]),
            mock_block(8, 1, 1, &[]),
            mock_block(9, 1, 1, &["after reorg"]),
        ]);

        let new_tip = mock_block_hash(9, 1);
        wait_until("new branch indexed", || {
            store.blocks().block(&new_tip).is_some()
        })
        .await;

        for height in [7, 8] {
            let old = store.blocks().block(&mock_block_hash(height, 0)).unwrap();
            assert!(old.orphaned, "height {height} should be orphaned");
            let new = store.blocks().block(&mock_block_hash(height, 1)).unwrap();
            assert!(!new.orphaned);
        }
        wait_until("message dispatched", || !handler.messages().is_empty()).await;
        assert_eq!(handler.messages()[0].text(), "after reorg");
        assert_eq!(runtime.status().await.unwrap().indexed_height, 9);

        stop(runtime, notifier).await;
    }

    #[tokio::test]
    async fn test_mempool_transaction_stored_unconfirmed() {
        let ledger = TestLedger::linear(3);
        let store = Arc::new(MemoryIndexStore::new());
        let handler = Arc::new(RecordingHandler::default());
        let (runtime, notifier) = start(&ledger, &store, &handler).await;

        let txid = "cd".repeat(32);
        ledger.node.add_mempool_tx(TransactionRecord {
            txid: txid.clone(),
            flo_data: b"pending note".to_vec(),
            time: 1_700_000_000,
            ..TransactionRecord::default()
        });

        wait_until("mempool message dispatched", || !handler.messages().is_empty()).await;
        let message = &handler.messages()[0];
        assert_eq!(message.txid, txid);
        assert!(message.block.is_none());
        assert!(store.blocks().transaction(&txid).unwrap().block().is_none());

        stop(runtime, notifier).await;
    }

    #[tokio::test]
    async fn test_restart_resumes_from_stored_tip() {
        let ledger = TestLedger::linear(10);
        let store = Arc::new(MemoryIndexStore::new());
        let handler = Arc::new(RecordingHandler::default());
        let (runtime, notifier) = start(&ledger, &store, &handler).await;
        stop(runtime, notifier).await;

        for height in 11..=15 {
            ledger.node.push_block(mock_block(height, 0, 0, &[]));
        }
        ledger.node.clear_fetch_log();

        let (runtime, notifier) = start(&ledger, &store, &handler).await;
        assert_eq!(runtime.status().await.unwrap().indexed_height, 15);
        assert_eq!(ledger.node.fetched_heights(), vec![11, 12, 13, 14, 15]);
        stop(runtime, notifier).await;
    }

    #[tokio::test]
    async fn test_offline_reorg_refuses_to_start() {
        let ledger = TestLedger::linear(10);
        let store = Arc::new(MemoryIndexStore::new());
        let handler = Arc::new(RecordingHandler::default());
        let (runtime, notifier) = start(&ledger, &store, &handler).await;
        stop(runtime, notifier).await;

        ledger.node.reorg_to(vec![mock_block(10, 1, 0, &[])]);

        let mut runtime: Runtime = IndexerRuntime::new(
            NodeConfig::for_testing(),
            ledger.clone(),
            store.clone(),
            RuntimeOptions::default(),
        )
        .unwrap();
        let err = runtime.start(mpsc::channel(1).1).await.unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Sync(ChainSyncError::HashMismatch { height: 10, .. })
        ));
        runtime.shutdown().await;
    }
}
