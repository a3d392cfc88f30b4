//! # FLO Indexer
//!
//! Follows a FLO Core node over JSON-RPC, indexes its blocks and embedded
//! data, and reassembles multipart messages.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration (`FI_CONFIG` file, then `FI_*` overrides)
//! 2. Install the `tracing` subscriber
//! 3. Connect the RPC client and open the store
//! 4. Catch up to the node's tip
//! 5. Poll the node for new blocks until Ctrl+C

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use fi_01_chain_sync::BlockStore;
use fi_03_multipart::FragmentStore;
use node_runtime::adapters::{FlodRpcClient, MemoryIndexStore, PollingNotifier, StoreCommit};
use node_runtime::config::NodeConfig;
use node_runtime::telemetry::init_logging;
use node_runtime::{IndexerRuntime, RuntimeOptions, StorageBackend};
use shared_bus::{FloDataHandler, HandlerError, HandlerRegistry};
use shared_crypto::{LocalKeySigner, MessageSigner};
use shared_types::FloMessage;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

/// Logs every message that reaches dispatch.
struct MessageLog;

#[async_trait]
impl FloDataHandler for MessageLog {
    fn name(&self) -> &str {
        "message-log"
    }

    async fn handle(&self, message: &FloMessage) -> Result<(), HandlerError> {
        info!(
            txid = %message.txid,
            height = message.block.as_ref().map(|b| b.height),
            bytes = message.data.len(),
            origin = ?message.origin,
            "Embedded data"
        );
        Ok(())
    }
}

fn publish_signer(config: &NodeConfig) -> Result<Option<Arc<dyn MessageSigner>>> {
    let (Some(address), Some(wif)) = (&config.publish.address, &config.publish.wif) else {
        return Ok(None);
    };
    let signer = LocalKeySigner::from_wif(wif).context("Invalid publish.wif")?;
    if signer.address() != address {
        bail!(
            "publish.wif belongs to {}, not {}",
            signer.address(),
            address
        );
    }
    Ok(Some(Arc::new(signer)))
}

async fn serve<S>(config: NodeConfig, client: Arc<FlodRpcClient>, store: Arc<S>) -> Result<()>
where
    S: BlockStore + FragmentStore + StoreCommit + 'static,
{
    let mut handlers = HandlerRegistry::new();
    handlers.register("", Arc::new(MessageLog));
    let options = RuntimeOptions {
        handlers,
        signer: publish_signer(&config)?,
        ..RuntimeOptions::default()
    };

    let (tx, rx) = mpsc::channel(config.notifier.channel_capacity);
    let notifier_config = config.notifier.clone();
    let mut runtime = IndexerRuntime::new(config, client.clone(), store, options)?;
    if let Some(address) = runtime.publish_address() {
        info!(%address, "Publishing enabled");
    }

    let tip = runtime.start(rx).await.context("Initial sync failed")?;
    let cancel = runtime.cancel_token();
    let notifier = PollingNotifier::new(client, notifier_config, tip);
    let notifier_task = tokio::spawn(notifier.run(tx, cancel.clone()));

    info!("Indexer is running. Press Ctrl+C to stop.");
    tokio::select! {
        signal = tokio::signal::ctrl_c() => signal?,
        _ = cancel.cancelled() => {}
    }

    runtime.shutdown().await;
    notifier_task.await?;
    if let Some(failure) = runtime.failure() {
        error!(%failure, "Indexer stopped on error");
        bail!("Indexer stopped: {failure}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = NodeConfig::load().context("Failed to load configuration")?;
    init_logging(&config.logging)?;
    info!(version = node_runtime::VERSION, rpc = %config.rpc.url, "Starting FLO indexer");

    let mut client = FlodRpcClient::new(config.rpc.clone())?;
    if let Some(wif) = &config.publish.wif {
        client = client.with_signing_key(wif.clone());
    }
    let client = Arc::new(client);

    match config.storage.backend {
        StorageBackend::Memory => serve(config, client, Arc::new(MemoryIndexStore::new())).await,
        #[cfg(feature = "rocksdb")]
        StorageBackend::Rocksdb => {
            use node_runtime::adapters::{RocksDbConfig, RocksDbIndexStore};
            let store = RocksDbIndexStore::open(RocksDbConfig {
                path: config.storage.data_dir.join("index"),
                ..RocksDbConfig::default()
            })?;
            serve(config, client, Arc::new(store)).await
        }
        #[cfg(not(feature = "rocksdb"))]
        StorageBackend::Rocksdb => bail!("storage.backend = \"rocksdb\" needs the `rocksdb` feature"),
    }
}
