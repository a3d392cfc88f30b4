//! # Ledger Node RPC Adapter
//!
//! JSON-RPC client for a FLO Core node. One client serves three ports:
//! [`LedgerNode`] for chain sync, [`OutputSource`] for ancestry and
//! [`LedgerWallet`] for publishing.
//!
//! | Port call | RPC |
//! |-----------|-----|
//! | `get_block_count` | `getblockcount` |
//! | `get_block_hash` | `getblockhash` |
//! | `get_block_header` | `getblockheader` |
//! | `get_block_verbose` | `getblock <hash> 2` |
//! | `get_transaction` | `getrawtransaction <txid> 1` |
//! | `get_raw_mempool` | `getrawmempool` |
//! | `get_outputs` | `listunspent` + `getrawtransaction` for mempool ancestry |
//! | `build_transaction` | `createrawtransaction` + `signrawtransaction` |
//! | `broadcast` | `sendrawtransaction` |

use async_trait::async_trait;
use fi_01_chain_sync::LedgerNode;
use fi_02_ancestry::{OutputSource, RawOutput};
use fi_03_multipart::{BuiltTransaction, LedgerWallet, TransactionRequest};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared_types::{
    BlockHash, BlockHeader, BlockRecord, BlockRef, Confirmation, LedgerError, OutputKey,
    TransactionRecord, TxId, TxInput, TxOutput, UnspentOutput,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

use crate::config::RpcConfig;

/// Satoshis per coin.
pub const COIN: u64 = 100_000_000;

/// Mempool transactions walked per `get_outputs` call.
const MAX_ANCESTRY_WALK: usize = 1_000;

/// "Invalid address or key": unknown txid or block hash.
const RPC_INVALID_ADDRESS_OR_KEY: i64 = -5;
/// "Invalid parameter": height out of range.
const RPC_INVALID_PARAMETER: i64 = -8;

#[derive(Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct JsonRpcResponse<R> {
    result: Option<R>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcHeader {
    hash: String,
    height: u64,
    time: u64,
    #[serde(default)]
    previousblockhash: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RpcBlock {
    #[serde(flatten)]
    header: RpcHeader,
    #[serde(default)]
    tx: Vec<RpcTransaction>,
}

#[derive(Debug, Deserialize)]
struct RpcTransaction {
    txid: String,
    #[serde(default)]
    vin: Vec<RpcVin>,
    #[serde(default)]
    vout: Vec<RpcVout>,
    #[serde(default, rename = "floData")]
    flo_data: String,
    #[serde(default)]
    blockhash: Option<String>,
    #[serde(default)]
    blocktime: Option<u64>,
    #[serde(default)]
    time: Option<u64>,
    #[serde(default)]
    confirmations: Option<u64>,
}

impl RpcTransaction {
    fn is_confirmed(&self) -> bool {
        self.blockhash.is_some() && self.confirmations.unwrap_or(0) > 0
    }

    fn parent_keys(&self) -> Vec<OutputKey> {
        self.vin
            .iter()
            .filter_map(|vin| Some(OutputKey::new(vin.txid.clone()?, vin.vout?)))
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct RpcVin {
    #[serde(default)]
    txid: Option<String>,
    #[serde(default)]
    vout: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RpcVout {
    value: f64,
    n: u32,
    #[serde(rename = "scriptPubKey")]
    script: RpcScript,
}

#[derive(Debug, Deserialize)]
struct RpcScript {
    #[serde(default)]
    hex: String,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    addresses: Vec<String>,
}

impl RpcScript {
    fn address(&self) -> Option<String> {
        self.address
            .clone()
            .or_else(|| self.addresses.first().cloned())
    }
}

#[derive(Debug, Deserialize)]
struct RpcUnspent {
    txid: String,
    vout: u32,
    #[serde(default)]
    address: String,
    #[serde(default, rename = "scriptPubKey")]
    script: String,
    amount: f64,
    confirmations: u32,
}

#[derive(Debug, Deserialize)]
struct RpcSigned {
    hex: String,
    complete: bool,
}

/// Coins (as the node reports them) to satoshis.
pub fn to_satoshis(amount: f64) -> u64 {
    (amount * COIN as f64).round().max(0.0) as u64
}

/// Satoshis to coins, for RPC parameters.
pub fn to_coins(satoshis: u64) -> f64 {
    satoshis as f64 / COIN as f64
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn header_from_rpc(header: &RpcHeader) -> BlockHeader {
    BlockHeader {
        height: header.height,
        hash: header.hash.clone(),
        previous_hash: header.previousblockhash.clone().unwrap_or_default(),
        timestamp: header.time,
    }
}

fn transaction_from_rpc(tx: RpcTransaction, confirmation: Confirmation, time: u64) -> TransactionRecord {
    let inputs = tx
        .vin
        .iter()
        .filter_map(|vin| {
            Some(TxInput {
                txid: vin.txid.clone()?,
                vout: vin.vout?,
            })
        })
        .collect();
    let outputs = tx
        .vout
        .iter()
        .map(|vout| TxOutput {
            value: to_satoshis(vout.value),
            script: vout.script.hex.clone(),
            index: vout.n,
            address: vout.script.address(),
        })
        .collect();
    TransactionRecord {
        txid: tx.txid,
        confirmation,
        flo_data: tx.flo_data.into_bytes(),
        time,
        inputs,
        outputs,
    }
}

fn block_from_rpc(block: RpcBlock) -> BlockRecord {
    let header = header_from_rpc(&block.header);
    let block_ref = BlockRef {
        height: header.height,
        hash: header.hash.clone(),
    };
    let transactions = block
        .tx
        .into_iter()
        .map(|tx| transaction_from_rpc(tx, Confirmation::InBlock(block_ref.clone()), header.timestamp))
        .collect();
    BlockRecord {
        height: header.height,
        hash: header.hash,
        previous_hash: header.previous_hash,
        timestamp: header.timestamp,
        transactions,
        orphaned: false,
    }
}

fn unspent_from_rpc(unspent: RpcUnspent) -> UnspentOutput {
    UnspentOutput {
        txid: unspent.txid,
        index: unspent.vout,
        script: unspent.script,
        value: to_satoshis(unspent.amount),
        confirmations: unspent.confirmations,
        address: unspent.address,
    }
}

fn rpc_error(error: JsonRpcError) -> LedgerError {
    match error.code {
        RPC_INVALID_ADDRESS_OR_KEY | RPC_INVALID_PARAMETER => LedgerError::NotFound(error.message),
        code => LedgerError::Rpc {
            code,
            message: error.message,
        },
    }
}

/// JSON-RPC client for a FLO Core node.
pub struct FlodRpcClient {
    client: Client,
    config: RpcConfig,
    signing_keys: Vec<String>,
    request_id: AtomicU64,
}

impl FlodRpcClient {
    /// Create a client for `config`.
    pub fn new(config: RpcConfig) -> Result<Self, LedgerError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| LedgerError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            config,
            signing_keys: Vec::new(),
            request_id: AtomicU64::new(1),
        })
    }

    /// Sign built transactions with this WIF key instead of the node wallet.
    pub fn with_signing_key(mut self, wif: impl Into<String>) -> Self {
        self.signing_keys.push(wif.into());
        self
    }

    fn next_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Call a JSON-RPC method.
    async fn call<R: DeserializeOwned>(&self, method: &str, params: Value) -> Result<R, LedgerError> {
        let request = JsonRpcRequest {
            jsonrpc: "1.0",
            id: self.next_id(),
            method,
            params,
        };
        trace!(method, id = request.id, "RPC call");

        let mut builder = self.client.post(&self.config.url).json(&request);
        if let Some(user) = &self.config.user {
            builder = builder.basic_auth(user, self.config.password.as_ref());
        }
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                LedgerError::Timeout(self.config.timeout_ms)
            } else {
                LedgerError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(LedgerError::Transport(format!("{method}: HTTP {status}")));
        }

        let body: JsonRpcResponse<R> = response
            .json()
            .await
            .map_err(|e| LedgerError::Decode(format!("{method}: {e}")))?;
        if let Some(error) = body.error {
            return Err(rpc_error(error));
        }
        body.result
            .ok_or_else(|| LedgerError::Decode(format!("{method}: missing result")))
    }

    async fn raw_transaction(&self, txid: &str) -> Result<RpcTransaction, LedgerError> {
        self.call("getrawtransaction", json!([txid, 1])).await
    }

    async fn header(&self, hash: &str) -> Result<RpcHeader, LedgerError> {
        self.call("getblockheader", json!([hash])).await
    }

    async fn list_unspent(&self, address: &str) -> Result<Vec<UnspentOutput>, LedgerError> {
        let unspent: Vec<RpcUnspent> = self
            .call("listunspent", json!([0, 9_999_999, [address]]))
            .await?;
        Ok(unspent.into_iter().map(unspent_from_rpc).collect())
    }
}

#[async_trait]
impl LedgerNode for FlodRpcClient {
    async fn get_block_count(&self) -> Result<u64, LedgerError> {
        self.call("getblockcount", json!([])).await
    }

    async fn get_block_hash(&self, height: u64) -> Result<BlockHash, LedgerError> {
        self.call("getblockhash", json!([height])).await
    }

    async fn get_block_header(&self, hash: &str) -> Result<BlockHeader, LedgerError> {
        Ok(header_from_rpc(&self.header(hash).await?))
    }

    async fn get_block_verbose(&self, hash: &str) -> Result<BlockRecord, LedgerError> {
        let block: RpcBlock = self.call("getblock", json!([hash, 2])).await?;
        Ok(block_from_rpc(block))
    }

    async fn get_transaction(&self, txid: &str) -> Result<TransactionRecord, LedgerError> {
        let tx = self.raw_transaction(txid).await?;
        let confirmation = match &tx.blockhash {
            Some(hash) if tx.is_confirmed() => {
                let header = self.header(hash).await?;
                Confirmation::InBlock(BlockRef {
                    height: header.height,
                    hash: header.hash,
                })
            }
            _ => Confirmation::Unconfirmed,
        };
        let time = tx.blocktime.or(tx.time).unwrap_or_else(now_secs);
        Ok(transaction_from_rpc(tx, confirmation, time))
    }

    async fn get_raw_mempool(&self) -> Result<Vec<TxId>, LedgerError> {
        self.call("getrawmempool", json!([])).await
    }
}

#[async_trait]
impl OutputSource for FlodRpcClient {
    /// Unspent outputs of `address`, plus every mempool transaction behind
    /// the unconfirmed ones so chain lengths come out whole.
    async fn get_outputs(&self, address: &str) -> Result<Vec<RawOutput>, LedgerError> {
        let unspent = self.list_unspent(address).await?;
        let mut by_txid: HashMap<TxId, Vec<UnspentOutput>> = HashMap::new();
        let mut raw = Vec::new();
        let mut queue: VecDeque<TxId> = VecDeque::new();

        for output in unspent {
            if output.is_unconfirmed() {
                queue.push_back(output.txid.clone());
                by_txid.entry(output.txid.clone()).or_default().push(output);
            } else {
                raw.push(RawOutput {
                    output,
                    spent: false,
                    parents: Vec::new(),
                });
            }
        }

        let mut visited: HashSet<TxId> = HashSet::new();
        while let Some(txid) = queue.pop_front() {
            if !visited.insert(txid.clone()) {
                continue;
            }
            if visited.len() > MAX_ANCESTRY_WALK {
                debug!(address, "Mempool ancestry walk truncated");
                break;
            }
            let tx = self.raw_transaction(&txid).await?;
            if tx.is_confirmed() {
                continue;
            }
            let parents = tx.parent_keys();

            match by_txid.remove(&txid) {
                Some(outputs) => raw.extend(outputs.into_iter().map(|output| RawOutput {
                    output,
                    spent: false,
                    parents: parents.clone(),
                })),
                // Already spent: only its place in the chain matters.
                None => {
                    let vout = tx
                        .vout
                        .iter()
                        .find(|v| v.script.address().as_deref() == Some(address))
                        .or_else(|| tx.vout.first());
                    if let Some(vout) = vout {
                        raw.push(RawOutput {
                            output: UnspentOutput {
                                txid: txid.clone(),
                                index: vout.n,
                                script: vout.script.hex.clone(),
                                value: to_satoshis(vout.value),
                                confirmations: 0,
                                address: address.to_string(),
                            },
                            spent: true,
                            parents: parents.clone(),
                        });
                    }
                }
            }
            queue.extend(parents.into_iter().map(|key| key.txid));
        }

        debug!(address, outputs = raw.len(), walked = visited.len(), "Outputs fetched");
        Ok(raw)
    }
}

#[async_trait]
impl LedgerWallet for FlodRpcClient {
    async fn build_transaction(
        &self,
        request: &TransactionRequest,
    ) -> Result<BuiltTransaction, LedgerError> {
        let total: u64 = request.inputs.iter().map(|i| i.value).sum();
        let change_value = total.checked_sub(request.fee).ok_or_else(|| LedgerError::Rpc {
            code: -6,
            message: format!("inputs {total} below fee {}", request.fee),
        })?;

        let inputs: Vec<Value> = request
            .inputs
            .iter()
            .map(|i| json!({ "txid": i.txid, "vout": i.index }))
            .collect();
        let mut outputs = serde_json::Map::new();
        if change_value > 0 {
            outputs.insert(request.change_address.clone(), json!(to_coins(change_value)));
        }

        let unsigned: String = self
            .call(
                "createrawtransaction",
                json!([inputs, outputs, 0, false, request.flo_data]),
            )
            .await?;
        let params = if self.signing_keys.is_empty() {
            json!([unsigned])
        } else {
            json!([unsigned, [], self.signing_keys])
        };
        let signed: RpcSigned = self.call("signrawtransaction", params).await?;
        if !signed.complete {
            return Err(LedgerError::Rpc {
                code: -1,
                message: "signrawtransaction left inputs unsigned".to_string(),
            });
        }

        let change = (change_value > 0).then(|| UnspentOutput {
            txid: String::new(),
            index: 0,
            script: request.inputs.first().map(|i| i.script.clone()).unwrap_or_default(),
            value: change_value,
            confirmations: 0,
            address: request.change_address.clone(),
        });
        Ok(BuiltTransaction {
            raw: signed.hex,
            change,
        })
    }

    async fn broadcast(&self, raw: &str) -> Result<TxId, LedgerError> {
        self.call("sendrawtransaction", json!([raw])).await
    }
}
