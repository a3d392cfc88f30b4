//! # Outbound Ports
//!
//! Fragment storage, transaction building/broadcast and a clock, plus mocks
//! used by this crate's tests and the workspace integration tests.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use sha2::{Digest, Sha256};
use shared_crypto::{CryptoError, FloAddress, FloNetwork, MessageSigner, MessageVerifier};
use shared_types::{
    FragmentRecord, FragmentStatus, FragmentUpdate, LedgerError, StorageError, TxId, UnspentOutput,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// What [`FragmentStore::put_fragment`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentWrite {
    /// No record existed; this one was stored.
    Inserted,
    /// The stored record took the new containing block.
    Confirmed,
    /// The stored record already matched.
    Unchanged,
}

/// Fragment store - outbound port.
#[async_trait]
pub trait FragmentStore: Send + Sync {
    /// Insert if no record exists for the txid. Otherwise the stored record
    /// only adopts a newly confirmed block (see
    /// [`FragmentRecord::adopt_confirmation`]).
    async fn put_fragment(&self, record: &FragmentRecord) -> Result<FragmentWrite, StorageError>;

    /// Up to `limit` records in `status`, oldest first.
    async fn query_fragments(
        &self,
        status: FragmentStatus,
        limit: usize,
    ) -> Result<Vec<FragmentRecord>, StorageError>;

    /// Apply updates in one batch. Returns how many records changed.
    async fn batch_update_fragments(&self, updates: &[FragmentUpdate]) -> Result<usize, StorageError>;
}

/// An unsigned transaction to build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    /// Outputs to spend.
    pub inputs: Vec<UnspentOutput>,
    /// Where the change goes.
    pub change_address: String,
    /// Fee in satoshis.
    pub fee: u64,
    /// Embedded-data field.
    pub flo_data: String,
}

/// A built, signed transaction ready to broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltTransaction {
    /// Raw transaction hex.
    pub raw: String,
    /// Change output; its txid is known only after broadcast.
    pub change: Option<UnspentOutput>,
}

/// Ledger wallet - outbound port.
#[async_trait]
pub trait LedgerWallet: Send + Sync {
    /// Build and sign a transaction.
    async fn build_transaction(
        &self,
        request: &TransactionRequest,
    ) -> Result<BuiltTransaction, LedgerError>;

    /// Broadcast a raw transaction, returning its txid.
    async fn broadcast(&self, raw: &str) -> Result<TxId, LedgerError>;
}

/// Unix time source - outbound port.
pub trait TimeSource: Send + Sync {
    /// Current unix time in seconds.
    fn now(&self) -> u64;
}

/// Default system time source.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

// =============================================================================
// Mock Implementations for Testing
// =============================================================================

/// In-memory fragment store.
#[derive(Default)]
pub struct InMemoryFragmentStore {
    records: RwLock<BTreeMap<TxId, FragmentRecord>>,
    /// Should return errors?
    pub should_fail: AtomicBool,
}

impl InMemoryFragmentStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored record by txid.
    pub fn get(&self, txid: &str) -> Option<FragmentRecord> {
        self.records.read().get(txid).cloned()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    fn check_failure(&self) -> Result<(), StorageError> {
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(StorageError::DatabaseError("Mock failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl FragmentStore for InMemoryFragmentStore {
    async fn put_fragment(&self, record: &FragmentRecord) -> Result<FragmentWrite, StorageError> {
        self.check_failure()?;
        let mut records = self.records.write();
        match records.get_mut(&record.txid) {
            Some(stored) => {
                if stored.adopt_confirmation(record) {
                    Ok(FragmentWrite::Confirmed)
                } else {
                    Ok(FragmentWrite::Unchanged)
                }
            }
            None => {
                records.insert(record.txid.clone(), record.clone());
                Ok(FragmentWrite::Inserted)
            }
        }
    }

    async fn query_fragments(
        &self,
        status: FragmentStatus,
        limit: usize,
    ) -> Result<Vec<FragmentRecord>, StorageError> {
        self.check_failure()?;
        let mut matching: Vec<FragmentRecord> = self
            .records
            .read()
            .values()
            .filter(|r| r.status() == status)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.time.cmp(&b.time).then_with(|| a.txid.cmp(&b.txid)));
        matching.truncate(limit);
        Ok(matching)
    }

    async fn batch_update_fragments(&self, updates: &[FragmentUpdate]) -> Result<usize, StorageError> {
        self.check_failure()?;
        let mut records = self.records.write();
        let mut changed = 0;
        for update in updates {
            if let Some(record) = records.get_mut(update.txid()) {
                update.apply(record);
                changed += 1;
            }
        }
        Ok(changed)
    }
}

/// Mock wallet: builds fake raw transactions and records broadcasts.
#[derive(Default)]
pub struct MockLedgerWallet {
    built: Mutex<HashMap<String, TransactionRequest>>,
    broadcasts: Mutex<Vec<(TxId, TransactionRequest)>>,
    /// Should return errors?
    pub should_fail: AtomicBool,
}

impl MockLedgerWallet {
    /// Create an empty wallet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Broadcast transactions in order.
    pub fn broadcasts(&self) -> Vec<(TxId, TransactionRequest)> {
        self.broadcasts.lock().clone()
    }

    fn check_failure(&self) -> Result<(), LedgerError> {
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(LedgerError::Transport("Mock failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerWallet for MockLedgerWallet {
    async fn build_transaction(
        &self,
        request: &TransactionRequest,
    ) -> Result<BuiltTransaction, LedgerError> {
        self.check_failure()?;
        let total: u64 = request.inputs.iter().map(|i| i.value).sum();
        if total < request.fee {
            return Err(LedgerError::Rpc {
                code: -6,
                message: "Insufficient funds".to_string(),
            });
        }

        let mut hasher = Sha256::new();
        for input in &request.inputs {
            hasher.update(input.key().to_string());
        }
        hasher.update(request.flo_data.as_bytes());
        let raw = hex::encode(hasher.finalize());

        let change = (total > request.fee).then(|| UnspentOutput {
            txid: String::new(),
            index: 0,
            script: "76a9".to_string(),
            value: total - request.fee,
            confirmations: 0,
            address: request.change_address.clone(),
        });
        self.built.lock().insert(raw.clone(), request.clone());
        Ok(BuiltTransaction { raw, change })
    }

    async fn broadcast(&self, raw: &str) -> Result<TxId, LedgerError> {
        self.check_failure()?;
        let request = self
            .built
            .lock()
            .remove(raw)
            .ok_or_else(|| LedgerError::Rpc {
                code: -22,
                message: "TX decode failed".to_string(),
            })?;
        let txid = hex::encode(Sha256::digest(raw.as_bytes()));
        self.broadcasts.lock().push((txid.clone(), request));
        Ok(txid)
    }
}

/// Mock time source.
#[derive(Debug, Default)]
pub struct MockTimeSource {
    time: AtomicU64,
}

impl MockTimeSource {
    /// Start at `initial` seconds.
    pub fn new(initial: u64) -> Self {
        Self {
            time: AtomicU64::new(initial),
        }
    }

    /// Move forward by `secs`.
    pub fn advance(&self, secs: u64) {
        self.time.fetch_add(secs, Ordering::SeqCst);
    }
}

impl TimeSource for MockTimeSource {
    fn now(&self) -> u64 {
        self.time.load(Ordering::SeqCst)
    }
}

/// Mock signer: a keyed digest instead of an ECDSA signature.
///
/// The address is a real FLO address so validation's address check passes.
pub struct MockSigner {
    address: String,
}

impl MockSigner {
    /// Signer whose address hash is `seed` repeated.
    pub fn new(seed: u8) -> Self {
        Self {
            address: FloAddress::from_pubkey_hash(FloNetwork::Mainnet, [seed; 20]).to_string(),
        }
    }
}

fn mock_signature(address: &str, preimage: &str) -> String {
    let digest = Sha256::new()
        .chain_update(address.as_bytes())
        .chain_update(b"|")
        .chain_update(preimage.as_bytes())
        .finalize();
    format!("{}{}", hex::encode(digest), "=".repeat(24))
}

impl MessageSigner for MockSigner {
    fn address(&self) -> &str {
        &self.address
    }

    fn sign(&self, preimage: &str) -> Result<String, CryptoError> {
        Ok(mock_signature(&self.address, preimage))
    }
}

/// Verifier for [`MockSigner`] signatures.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockVerifier;

impl MessageVerifier for MockVerifier {
    fn verify(&self, preimage: &str, address: &str, signature: &str) -> bool {
        mock_signature(address, preimage) == signature
    }
}
