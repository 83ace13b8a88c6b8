// src/blockchain/mock.rs
//! Deterministic in-memory collaborators for tests.

use crate::adapters::utxo::null_data_payload;
use crate::blockchain::{AccountRegistry, ChainBackends, Ledger, RegistryRecord};
use crate::error::{MdipError, Result};
use crate::models::did::Network;
use crate::models::transaction::{
    Block, LedgerTransaction, OutPointRef, OutputKind, SpendableInput, TxOutputView, UnsignedContractCall,
    UtxoStatus,
};
use crate::storage::document_store::InMemoryDocumentStore;
use crate::storage::ContentStore;
use async_trait::async_trait;
use bitcoin::hashes::Hash;
use bitcoin::{
    absolute, transaction, Address, Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid,
    Witness,
};
use ethers_core::utils::hex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub(crate) fn pay(n: u32, value_sats: u64, address: &str) -> TxOutputView {
    TxOutputView {
        n,
        value_sats,
        kind: OutputKind::Address(address.to_string()),
    }
}

pub(crate) fn data(n: u32, payload: &[u8]) -> TxOutputView {
    TxOutputView {
        n,
        value_sats: 0,
        kind: OutputKind::NullData(payload.to_vec()),
    }
}

pub(crate) fn transaction(txid: &str, inputs: &[(&str, u32)], outputs: Vec<TxOutputView>) -> LedgerTransaction {
    LedgerTransaction {
        txid: txid.to_string(),
        inputs: inputs
            .iter()
            .map(|(txid, vout)| OutPointRef::new(*txid, *vout))
            .collect(),
        outputs,
        block_hash: None,
        hex: None,
        confirmations: 0,
    }
}

/// A confirmed-looking transaction paying `value_sats` to `address`, and the
/// spendable input it creates.
pub(crate) fn funding_transaction(address: &Address, value_sats: u64) -> (Transaction, SpendableInput) {
    let tx = Transaction {
        version: transaction::Version::ONE,
        lock_time: absolute::LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint::new(Txid::from_byte_array(rand::random()), 0),
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: vec![TxOut {
            value: Amount::from_sat(value_sats),
            script_pubkey: address.script_pubkey(),
        }],
    };
    let input = SpendableInput {
        txid: tx.compute_txid().to_string(),
        vout: 0,
        amount_sats: value_sats,
        raw_tx_hex: Some(bitcoin::consensus::encode::serialize_hex(&tx)),
    };
    (tx, input)
}

/// Ledger view of a real transaction, as a node would report it.
pub(crate) fn ledger_view(tx: &Transaction, network: Network) -> LedgerTransaction {
    let outputs = tx
        .output
        .iter()
        .enumerate()
        .map(|(n, output)| {
            let kind = match null_data_payload(&output.script_pubkey) {
                Some(payload) => OutputKind::NullData(payload),
                None => match Address::from_script(&output.script_pubkey, network.to_bitcoin()) {
                    Ok(address) => OutputKind::Address(address.to_string()),
                    Err(_) => OutputKind::NonStandard,
                },
            };
            TxOutputView {
                n: n as u32,
                value_sats: output.value.to_sat(),
                kind,
            }
        })
        .collect();
    LedgerTransaction {
        txid: tx.compute_txid().to_string(),
        inputs: tx
            .input
            .iter()
            .map(|input| OutPointRef::new(input.previous_output.txid.to_string(), input.previous_output.vout))
            .collect(),
        outputs,
        block_hash: None,
        hex: Some(bitcoin::consensus::encode::serialize_hex(tx)),
        confirmations: 0,
    }
}

#[derive(Default)]
struct LedgerState {
    blocks: Vec<Block>,
    unspent: HashMap<String, Vec<SpendableInput>>,
    mempool: Vec<LedgerTransaction>,
    broadcasts: Vec<String>,
}

/// A ledger whose chain is built block by block by the test.
#[derive(Default)]
pub(crate) struct MockLedger {
    state: Mutex<LedgerState>,
    requests: AtomicUsize,
}

impl MockLedger {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Appends a block and returns its hash. Heights start at 0.
    pub(crate) fn push_block(&self, mut transactions: Vec<LedgerTransaction>) -> String {
        let mut state = self.state.lock().unwrap();
        let height = state.blocks.len() as u32;
        let hash = format!("{:064x}", height + 1);
        for tx in &mut transactions {
            tx.block_hash = Some(hash.clone());
        }
        if let Some(previous) = state.blocks.last_mut() {
            previous.next_block_hash = Some(hash.clone());
        }
        state.blocks.push(Block {
            hash: hash.clone(),
            height,
            transactions,
            next_block_hash: None,
        });
        hash
    }

    pub(crate) fn add_unspent(&self, address: &str, input: SpendableInput) {
        let mut state = self.state.lock().unwrap();
        state.unspent.entry(address.to_string()).or_default().push(input);
    }

    /// Holds `tx` as relayed but unconfirmed.
    pub(crate) fn add_to_mempool(&self, tx: LedgerTransaction) {
        self.state.lock().unwrap().mempool.push(tx);
    }

    pub(crate) fn broadcasts(&self) -> Vec<String> {
        self.state.lock().unwrap().broadcasts.clone()
    }

    /// Number of ledger requests served so far.
    pub(crate) fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    fn find_transaction(state: &LedgerState, txid: &str) -> Option<LedgerTransaction> {
        let depth = state.blocks.len() as u32;
        state
            .blocks
            .iter()
            .find_map(|block| {
                let tx = block.transactions.iter().find(|tx| tx.txid == txid)?;
                Some(LedgerTransaction {
                    confirmations: depth - block.height,
                    ..tx.clone()
                })
            })
            .or_else(|| state.mempool.iter().find(|tx| tx.txid == txid).cloned())
    }

    fn count(&self) {
        self.requests.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Ledger for MockLedger {
    async fn get_raw_transaction(&self, txid: &str) -> Result<LedgerTransaction> {
        self.count();
        let state = self.state.lock().unwrap();
        Self::find_transaction(&state, txid).ok_or_else(|| MdipError::NotFound(format!("transaction {}", txid)))
    }

    async fn get_block(&self, block_hash: &str) -> Result<Block> {
        self.count();
        let state = self.state.lock().unwrap();
        state
            .blocks
            .iter()
            .find(|block| block.hash == block_hash)
            .cloned()
            .ok_or_else(|| MdipError::NotFound(format!("block {}", block_hash)))
    }

    async fn get_block_hash(&self, height: u32) -> Result<String> {
        self.count();
        let state = self.state.lock().unwrap();
        state
            .blocks
            .get(height as usize)
            .map(|block| block.hash.clone())
            .ok_or_else(|| MdipError::NotFound(format!("block at height {}", height)))
    }

    async fn list_unspent(&self, address: &str) -> Result<Vec<SpendableInput>> {
        self.count();
        let state = self.state.lock().unwrap();
        Ok(state.unspent.get(address).cloned().unwrap_or_default())
    }

    async fn get_utxo_status(&self, outpoint: &OutPointRef) -> Result<UtxoStatus> {
        self.count();
        let state = self.state.lock().unwrap();
        // confirmed spends only, mempool spenders are not consulted
        let spent = state
            .blocks
            .iter()
            .flat_map(|block| block.transactions.iter())
            .any(|tx| tx.spends(outpoint));
        if spent {
            return Ok(UtxoStatus::Spent);
        }
        let tx = Self::find_transaction(&state, &outpoint.txid)
            .ok_or_else(|| MdipError::NotFound(format!("transaction {}", outpoint.txid)))?;
        let output = tx
            .outputs
            .iter()
            .find(|output| output.n == outpoint.vout)
            .ok_or_else(|| MdipError::NotFound(format!("output {}", outpoint)))?;
        Ok(UtxoStatus::Unspent {
            value_sats: output.value_sats,
            address: output.address().map(str::to_string),
        })
    }

    async fn send_raw_transaction(&self, raw: &str) -> Result<String> {
        self.count();
        let bytes = hex::decode(raw).map_err(|e| MdipError::UpstreamUnavailable(e.to_string()))?;
        let tx: Transaction = bitcoin::consensus::deserialize(&bytes)
            .map_err(|e| MdipError::UpstreamUnavailable(e.to_string()))?;
        self.state.lock().unwrap().broadcasts.push(raw.to_string());
        Ok(tx.compute_txid().to_string())
    }
}

/// Registry double that answers every preparation with a recognisable call.
#[derive(Default)]
pub(crate) struct MockRegistry {
    records: Mutex<HashMap<String, RegistryRecord>>,
    calls: Mutex<Vec<String>>,
}

impl MockRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, record: RegistryRecord) {
        self.records.lock().unwrap().insert(record.id.clone(), record);
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn prepared(&self, call: String) -> UnsignedContractCall {
        self.calls.lock().unwrap().push(call.clone());
        UnsignedContractCall {
            from: "0x0000000000000000000000000000000000000001".into(),
            contract_address: "0x0000000000000000000000000000000000000002".into(),
            data: format!("0x{}", hex::encode(call.as_bytes())),
            gas_price: 20_000_000_000,
            gas_limit: 150_000,
            nonce: 0,
            chain_id: 5,
        }
    }
}

#[async_trait]
impl AccountRegistry for MockRegistry {
    async fn create(&self, document_cid: &str, public_key: &str) -> Result<UnsignedContractCall> {
        Ok(self.prepared(format!("create:{}:{}", document_cid, public_key)))
    }

    async fn set_metadata(&self, public_key: &str, did_id: &str, document_cid: &str) -> Result<UnsignedContractCall> {
        Ok(self.prepared(format!("setMetadata:{}:{}:{}", public_key, did_id, document_cid)))
    }

    async fn set_controller(&self, public_key: &str, new_owner: &str, did_id: &str) -> Result<UnsignedContractCall> {
        Ok(self.prepared(format!("setController:{}:{}:{}", public_key, new_owner, did_id)))
    }

    async fn delete(&self, public_key: &str, did_id: &str) -> Result<UnsignedContractCall> {
        Ok(self.prepared(format!("delete:{}:{}", public_key, did_id)))
    }

    async fn lookup(&self, did_id: &str) -> Result<RegistryRecord> {
        self.records
            .lock()
            .unwrap()
            .get(did_id)
            .cloned()
            .ok_or_else(|| MdipError::NotFound(format!("registry id {}", did_id)))
    }

    async fn send_raw_transaction(&self, raw: &str) -> Result<String> {
        self.calls.lock().unwrap().push(format!("send:{}", raw));
        Ok(format!("0x{}", hex::encode(ethers_core::utils::keccak256(raw.as_bytes()))))
    }
}

/// Content store backed by a map from location to bytes.
#[derive(Default)]
pub(crate) struct MemoryContentStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryContentStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn put(&self, location: &str, data: &[u8]) {
        self.objects.lock().unwrap().insert(location.to_string(), data.to_vec());
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn fetch(&self, location: &str) -> Result<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(location)
            .cloned()
            .ok_or_else(|| MdipError::UpstreamUnavailable(format!("{} unreachable", location)))
    }

    async fn store(&self, data: &[u8]) -> Result<String> {
        let cid = format!("Qm{}", hex::encode(&ethers_core::utils::keccak256(data)[..16]));
        self.put(&cid, data);
        Ok(cid)
    }
}

/// Every collaborator as a test double, with typed handles kept for assertions.
pub(crate) struct MockBackends {
    pub(crate) bitcoin: Arc<MockLedger>,
    pub(crate) omni: Arc<MockLedger>,
    pub(crate) registry: Arc<MockRegistry>,
    pub(crate) documents: Arc<InMemoryDocumentStore>,
    pub(crate) content: Arc<MemoryContentStore>,
}

impl MockBackends {
    pub(crate) fn new() -> Self {
        MockBackends {
            bitcoin: Arc::new(MockLedger::new()),
            omni: Arc::new(MockLedger::new()),
            registry: Arc::new(MockRegistry::new()),
            documents: Arc::new(InMemoryDocumentStore::new()),
            content: Arc::new(MemoryContentStore::new()),
        }
    }

    pub(crate) fn backends(&self) -> ChainBackends {
        ChainBackends {
            bitcoin: self.bitcoin.clone(),
            omni: self.omni.clone(),
            registry: self.registry.clone(),
            documents: self.documents.clone(),
            content: self.content.clone(),
        }
    }
}
