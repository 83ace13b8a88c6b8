// src/blockchain/mod.rs
//! Ledger collaborators.
//!
//! The core never talks to a node directly; it consumes the capabilities below.
//! [`bitcoin_rpc::BitcoinRpc`] and [`registry_client::RegistryClient`] are the
//! default network implementations.

pub mod bitcoin_rpc;
#[cfg(test)]
pub(crate) mod mock;
pub mod registry_client;

use crate::error::{MdipError, Result};
use crate::models::did::ChainTag;
use crate::models::transaction::{
    Block, LedgerTransaction, OutPointRef, SpendableInput, UnsignedContractCall, UtxoStatus,
};
use crate::storage::{ContentStore, DocumentStore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Queries answered by a UTXO ledger node.
///
/// Every call is a single remote request; retries belong to the transport.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn get_raw_transaction(&self, txid: &str) -> Result<LedgerTransaction>;

    async fn get_block(&self, block_hash: &str) -> Result<Block>;

    async fn get_block_hash(&self, height: u32) -> Result<String>;

    /// Confirmed unspent outputs paying to `address`.
    async fn list_unspent(&self, address: &str) -> Result<Vec<SpendableInput>>;

    /// Whether `outpoint` is still in the UTXO set.
    async fn get_utxo_status(&self, outpoint: &OutPointRef) -> Result<UtxoStatus>;

    /// Broadcasts a raw transaction and returns its txid.
    async fn send_raw_transaction(&self, hex: &str) -> Result<String>;
}

/// State of an account-chain DID as recorded by the registry contract.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RegistryRecord {
    pub id: String,
    pub controller: String,
    /// Content id of the current DID document
    pub metadata: String,
}

/// Remote-assisted operations of the account-chain registry contract.
///
/// Each `prepare` call returns the unsigned contract call exactly as the remote
/// registry built it.
#[async_trait]
pub trait AccountRegistry: Send + Sync {
    async fn create(&self, document_cid: &str, public_key: &str) -> Result<UnsignedContractCall>;

    async fn set_metadata(&self, public_key: &str, did_id: &str, document_cid: &str) -> Result<UnsignedContractCall>;

    async fn set_controller(&self, public_key: &str, new_owner: &str, did_id: &str) -> Result<UnsignedContractCall>;

    async fn delete(&self, public_key: &str, did_id: &str) -> Result<UnsignedContractCall>;

    async fn lookup(&self, did_id: &str) -> Result<RegistryRecord>;

    async fn send_raw_transaction(&self, raw: &str) -> Result<String>;
}

/// Handles to every remote collaborator, shared read-only between calls.
#[derive(Clone)]
pub struct ChainBackends {
    pub bitcoin: Arc<dyn Ledger>,
    pub omni: Arc<dyn Ledger>,
    pub registry: Arc<dyn AccountRegistry>,
    pub documents: Arc<dyn DocumentStore>,
    pub content: Arc<dyn ContentStore>,
}

impl ChainBackends {
    /// Node serving a UTXO chain.
    pub fn ledger(&self, chain: ChainTag) -> Result<Arc<dyn Ledger>> {
        match chain {
            ChainTag::Btc => Ok(self.bitcoin.clone()),
            ChainTag::Omni => Ok(self.omni.clone()),
            other => Err(MdipError::UnsupportedOperation(format!(
                "{} is not a UTXO chain",
                other
            ))),
        }
    }
}
