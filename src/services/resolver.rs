// src/services/resolver.rs
//! DID resolution.
//!
//! UTXO DIDs are resolved by walking the ledger forward from the anchor output:
//! each spend of the current frontier must carry a new document pointer and hands
//! control to its first output. The walk stops at the first unspent frontier and
//! the latest pointer wins. Account-chain DIDs are read from the registry and
//! document-store DIDs from the store.
//!
//! All walk state lives in the call; concurrent resolutions share nothing but the
//! backend handles.

use crate::adapters::{Adapters, ChainAdapter, ChainTip};
use crate::blockchain::{ChainBackends, Ledger};
use crate::error::{MdipError, Result};
use crate::identifier::txref::{self, TxRef};
use crate::identifier::{self as codec};
use crate::models::did::{ChainTag, DIDDocument, Identifier, Network};
use crate::models::transaction::{LedgerTransaction, OutPointRef, UtxoStatus};
use ethers_core::utils::hex;
use log::{debug, info};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

/// Outcome of a resolution, tagged with the path that produced it.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum ResolvedDocument {
    /// Latest document pointer published on the ledger (a URL or an inline blob)
    Pointer(String),
    /// Synthesized because the anchor transaction published no pointer
    DefaultDocument(DIDDocument),
    /// Document read from the registry's content id or the document store
    Document(DIDDocument),
}

/// Result of walking a document chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainWalk {
    /// The unspent frontier the walk stopped at
    pub tip: ChainTip,
    /// Decoded pointers of every continuation, oldest first
    pub trail: Vec<Vec<u8>>,
}

/// Transaction spending `outpoint`, searched from the block that created it
/// forward.
async fn find_spender(ledger: &dyn Ledger, outpoint: &OutPointRef) -> Result<LedgerTransaction> {
    let creator = ledger.get_raw_transaction(&outpoint.txid).await?;
    let mut block_hash = creator.block_hash.ok_or_else(|| {
        MdipError::BrokenDocumentChain(format!("{} is spent but unconfirmed", outpoint.txid))
    })?;
    loop {
        let block = ledger.get_block(&block_hash).await?;
        if let Some(spender) = block.transactions.into_iter().find(|tx| tx.spends(outpoint)) {
            return Ok(spender);
        }
        block_hash = block.next_block_hash.ok_or_else(|| {
            MdipError::BrokenDocumentChain(format!("no spender of {} found up to block {}", outpoint, block.height))
        })?;
    }
}

/// Walks from `anchor` to the current tip.
///
/// # Errors
/// - `BrokenDocumentChain` when a spent frontier has no locatable spender, or the
///   walk comes back to a frontier it already visited
/// - `MissingContinuationMetadata` when a spender carries no pointer
pub async fn walk_chain(ledger: &dyn Ledger, adapter: &dyn ChainAdapter, anchor: OutPointRef) -> Result<ChainWalk> {
    let mut frontier = anchor;
    let mut trail = Vec::new();
    let mut visited = HashSet::new();

    loop {
        if !visited.insert(frontier.clone()) {
            return Err(MdipError::BrokenDocumentChain(format!("walk revisited {}", frontier)));
        }
        match ledger.get_utxo_status(&frontier).await? {
            UtxoStatus::Unspent { value_sats, address } => {
                debug!("tip {} after {} continuations", frontier, trail.len());
                return Ok(ChainWalk {
                    tip: ChainTip {
                        outpoint: frontier,
                        value_sats,
                        address,
                    },
                    trail,
                });
            }
            UtxoStatus::Spent => {
                let spender = find_spender(ledger, &frontier).await?;
                let metadata = spender.metadata().ok_or_else(|| MdipError::MissingContinuationMetadata {
                    txid: spender.txid.clone(),
                })?;
                trail.push(adapter.decode_metadata(metadata)?);
                let next = spender.first_output().ok_or_else(|| {
                    MdipError::BrokenDocumentChain(format!("{} has no outputs", spender.txid))
                })?;
                debug!("{} continued by {}", frontier, spender.txid);
                frontier = OutPointRef::new(spender.txid, next);
            }
        }
    }
}

/// Anchor output of a UTXO identifier.
pub async fn anchor_of(ledger: &dyn Ledger, identifier: &Identifier, network: Network) -> Result<OutPointRef> {
    let txref = TxRef::decode(&identifier.reference, network)?;
    txref::locate(ledger, &txref).await
}

fn pointer(bytes: &[u8]) -> Result<ResolvedDocument> {
    String::from_utf8(bytes.to_vec())
        .map(ResolvedDocument::Pointer)
        .map_err(|e| MdipError::SchemaViolation(format!("document pointer is not UTF-8: {}", e)))
}

/// Resolution engine over the configured backends.
#[derive(Clone)]
pub struct Resolver {
    backends: ChainBackends,
    adapters: Arc<Adapters>,
    network: Network,
}

impl Resolver {
    pub fn new(backends: ChainBackends, adapters: Arc<Adapters>, network: Network) -> Self {
        Resolver {
            backends,
            adapters,
            network,
        }
    }

    /// Resolves a DID to its current document.
    ///
    /// # Errors
    /// `MalformedIdentifier`/`InvalidReference` for bad identifiers, the walk errors
    /// of [`walk_chain`], `NotFound` for unknown registry ids or records.
    pub async fn resolve(&self, did: &str) -> Result<ResolvedDocument> {
        let identifier = codec::parse(did)?;
        let resolved = match identifier.chain {
            ChainTag::Btc | ChainTag::Omni => self.resolve_utxo(&identifier).await?,
            ChainTag::Eth => self.resolve_registry(&identifier).await?,
            ChainTag::MongoDb => self.resolve_record(&identifier).await?,
        };
        info!("resolved {}", did);
        Ok(resolved)
    }

    async fn resolve_utxo(&self, identifier: &Identifier) -> Result<ResolvedDocument> {
        let ledger = self.backends.ledger(identifier.chain)?;
        let adapter = self.adapters.for_chain(identifier.chain);
        let anchor = anchor_of(ledger.as_ref(), identifier, self.network).await?;
        let walk = walk_chain(ledger.as_ref(), adapter, anchor.clone()).await?;
        if let Some(latest) = walk.trail.last() {
            return pointer(latest);
        }

        let anchor_tx = ledger.get_raw_transaction(&anchor.txid).await?;
        if let Some(metadata) = anchor_tx.metadata() {
            return pointer(&adapter.decode_metadata(metadata)?);
        }

        let funding = anchor_tx.inputs.first().ok_or_else(|| {
            MdipError::BrokenDocumentChain(format!("anchor {} has no spendable inputs", anchor.txid))
        })?;
        let funding_tx = ledger.get_raw_transaction(&funding.txid).await?;
        let address = funding_tx
            .outputs
            .iter()
            .find(|output| output.n == funding.vout)
            .and_then(|output| output.address())
            .ok_or_else(|| MdipError::BrokenDocumentChain(format!("funding output {} has no address", funding)))?;
        debug!("{} published no pointer, using its funding address", identifier);
        Ok(ResolvedDocument::DefaultDocument(DIDDocument::default_capability(
            &identifier.to_string(),
            address,
        )))
    }

    async fn resolve_registry(&self, identifier: &Identifier) -> Result<ResolvedDocument> {
        let record = self.backends.registry.lookup(&identifier.reference).await?;
        if record.metadata.is_empty() {
            return Err(MdipError::NotFound(format!("{} has no document", identifier)));
        }
        let bytes = self.backends.content.fetch(&record.metadata).await?;
        Ok(ResolvedDocument::Document(DIDDocument::from_slice(&bytes)?))
    }

    async fn resolve_record(&self, identifier: &Identifier) -> Result<ResolvedDocument> {
        self.backends
            .documents
            .get(&identifier.reference)
            .await?
            .map(|record| ResolvedDocument::Document(record.document))
            .ok_or_else(|| MdipError::NotFound(identifier.to_string()))
    }

    /// Mints the DID of a confirmed create transaction, anchored at its first output.
    pub async fn mint_utxo_did(&self, chain: ChainTag, txid: &str) -> Result<Identifier> {
        let ledger = self.backends.ledger(chain)?;
        let txref = txref::txref_for(ledger.as_ref(), &OutPointRef::new(txid, 0), self.network).await?;
        Ok(Identifier::new(chain, txref.encode()?))
    }

    /// Mints the DID a confirmed create produced on `chain`.
    ///
    /// `created` is the create's txid on the UTXO chains, the hex data of the
    /// registry's creation event on `eth`, and the record id on the document store.
    ///
    /// # Errors
    /// `NotFound` for an unconfirmed transaction or an unknown record,
    /// `InvalidReference` for undecodable event data.
    pub async fn mint_did(&self, chain: ChainTag, created: &str) -> Result<Identifier> {
        let identifier = match chain {
            ChainTag::Btc | ChainTag::Omni => self.mint_utxo_did(chain, created).await?,
            ChainTag::Eth => {
                let log_data = hex::decode(created.trim_start_matches("0x"))
                    .map_err(|e| MdipError::InvalidReference(format!("creation event is not hex: {}", e)))?;
                codec::mint_account_did(&log_data)?
            }
            ChainTag::MongoDb => {
                if self.backends.documents.get(created).await?.is_none() {
                    return Err(MdipError::NotFound(format!("record {}", created)));
                }
                codec::mint_record_did(created)
            }
        };
        info!("minted {}", identifier);
        Ok(identifier)
    }
}
