// src/adapters/mod.rs
//! Per-chain transaction construction.
//!
//! Every chain exposes the same [`ChainAdapter`] surface; the variant is chosen once
//! per call from the identifier's chain tag and owns its own constants (metadata
//! limit, dust value, payload header).

pub mod account;
pub mod document_store;
pub mod utxo;

use crate::blockchain::ChainBackends;
use crate::error::Result;
use crate::models::did::{ChainTag, Network};
use crate::models::transaction::{FeeSchedule, OutPointRef, SpendableInput, UnsignedTransaction};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use account::AccountAdapter;
pub use document_store::DocumentStoreAdapter;
pub use utxo::UtxoAdapter;

/// Value of the output that marks the controller of a UTXO DID, in satoshis.
pub const DUST_VALUE: u64 = 600;

/// Parameters of a DID creation.
///
/// For UTXO chains `creator` receives the change and `updater` the dust output that
/// becomes the DID's anchor. Account and document-store chains key the new DID on
/// `public_key` instead.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest {
    #[serde(default)]
    pub network: Network,
    #[serde(default)]
    pub creator: String,
    #[serde(default)]
    pub updater: String,
    /// Hex public key of the creator (`eth`, `mongodb`)
    #[serde(default)]
    pub public_key: Option<String>,
    #[serde(default)]
    pub inputs: Vec<SpendableInput>,
    /// Explicit fee tiers; estimated from the configured rate when absent
    #[serde(default)]
    pub fees: Option<FeeSchedule>,
    #[serde(default)]
    pub document_url: Option<String>,
    /// Skip fetching and validating the document behind `document_url`
    #[serde(default)]
    pub trust_document: bool,
}

/// Current tip of a UTXO DID, found by walking the document chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTip {
    pub outpoint: OutPointRef,
    pub value_sats: u64,
    /// Address the tip pays to, i.e. the current controller
    pub address: Option<String>,
}

/// Parameters of a DID update or deletion.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRequest {
    pub did: String,
    #[serde(default)]
    pub network: Network,
    /// Address the caller claims controls the DID
    #[serde(default)]
    pub controller: Option<String>,
    /// UTXO chains: receiver of the new tip. `eth`: new owner.
    #[serde(default)]
    pub new_receiver: Option<String>,
    /// Hex public key of the caller (`eth`)
    #[serde(default)]
    pub public_key: Option<String>,
    #[serde(default)]
    pub document_url: Option<String>,
    /// Replacement controller key of a document-store DID
    #[serde(default)]
    pub new_controller_key: Option<String>,
    /// Extra inputs, spent only when the tip alone cannot pay the fee
    #[serde(default)]
    pub funding: Vec<SpendableInput>,
    #[serde(default)]
    pub fees: Option<FeeSchedule>,
    #[serde(default)]
    pub trust_document: bool,
    /// Bitcoin signed-message over the DID string (`mongodb`)
    #[serde(default)]
    pub control_signature: Option<String>,
    /// Filled in by the preparer before the adapter runs
    #[serde(skip)]
    pub tip: Option<ChainTip>,
}

/// Chain-specific construction of create, update and delete operations.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn chain(&self) -> ChainTag;

    /// Largest metadata payload the chain accepts, `None` when unbounded.
    fn max_metadata_bytes(&self) -> Option<usize>;

    fn dust_value(&self) -> u64 {
        DUST_VALUE
    }

    /// Wraps a document pointer into the chain's data-carrier payload.
    ///
    /// # Errors
    /// `PayloadTooLarge` when `payload` exceeds [`ChainAdapter::max_metadata_bytes`].
    fn encode_metadata(&self, payload: &[u8]) -> Result<Vec<u8>>;

    /// Inverse of [`ChainAdapter::encode_metadata`].
    fn decode_metadata(&self, data: &[u8]) -> Result<Vec<u8>>;

    async fn prepare_create(&self, request: &CreateRequest) -> Result<UnsignedTransaction>;

    async fn prepare_update(&self, request: &ChangeRequest) -> Result<UnsignedTransaction>;

    async fn prepare_delete(&self, request: &ChangeRequest) -> Result<UnsignedTransaction>;
}

/// One adapter per chain, built from the shared backends.
pub struct Adapters {
    bitcoin: UtxoAdapter,
    omni: UtxoAdapter,
    account: AccountAdapter,
    records: DocumentStoreAdapter,
}

impl Adapters {
    /// # Arguments
    /// * `backends` - Shared collaborator handles
    /// * `fee_rate` - Satoshis per byte used when a request carries no fee tiers
    pub fn new(backends: &ChainBackends, fee_rate: u64) -> Self {
        Adapters {
            bitcoin: UtxoAdapter::bitcoin(backends.bitcoin.clone(), fee_rate),
            omni: UtxoAdapter::omni(backends.omni.clone(), fee_rate),
            account: AccountAdapter::new(backends.registry.clone(), backends.content.clone()),
            records: DocumentStoreAdapter::new(backends.documents.clone(), backends.content.clone()),
        }
    }

    pub fn for_chain(&self, chain: ChainTag) -> &dyn ChainAdapter {
        match chain {
            ChainTag::Btc => &self.bitcoin,
            ChainTag::Omni => &self.omni,
            ChainTag::Eth => &self.account,
            ChainTag::MongoDb => &self.records,
        }
    }
}
