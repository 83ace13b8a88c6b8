// src/services/ledger_info.rs
//! Read-only ledger queries for wallets driving the UTXO chains.
//!
//! Funding discovery quotes the spendable outputs of an address together with the
//! fee tiers a transaction spending all of them would pay.

use crate::blockchain::Ledger;
use crate::error::{MdipError, Result};
use crate::models::did::Network;
use crate::models::transaction::{FeeSchedule, LedgerTransaction, OutPointRef, SpendableInput};
use crate::wallet::key_management::parse_address;
use log::debug;
use serde::Serialize;

/// Value outputs of a funded operation: dust to the updater, change to the
/// creator, and room for a third receiver.
const QUOTED_OUTPUTS: usize = 3;

/// Spendable outputs of an address and the fee of spending them.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FundingQuote {
    /// Unspent outputs, each with the raw transaction that created it
    pub inputs: Vec<SpendableInput>,
    pub total_sats: u64,
    pub fees: FeeSchedule,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct TxConfirmations {
    pub txid: String,
    pub confirmations: u32,
}

/// Confirmation depths of a batch of transactions.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationReport {
    pub valid: Vec<TxConfirmations>,
    /// Ids the ledger does not know
    pub invalid: Vec<String>,
}

/// A transaction with its position on the chain.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TxDetails {
    pub transaction: LedgerTransaction,
    /// `None` while unconfirmed
    pub block_height: Option<u32>,
    pub tx_index: Option<usize>,
}

/// Unspent outputs of `address`, with the creating transaction attached to each.
pub async fn spendable_outputs(ledger: &dyn Ledger, address: &str) -> Result<Vec<SpendableInput>> {
    let mut inputs = ledger.list_unspent(address).await?;
    for input in &mut inputs {
        if input.raw_tx_hex.is_none() {
            input.raw_tx_hex = ledger.get_raw_transaction(&input.txid).await?.hex;
        }
    }
    Ok(inputs)
}

/// Quotes the funds available to `address` for a new operation.
///
/// # Arguments
/// * `ledger` - Node of the chain the operation targets
/// * `address` - Funding address, checked against `network`
/// * `network` - Network the address must belong to
/// * `fee_rate` - Satoshis per byte
///
/// # Errors
/// - `InvalidAddress` for an address of another network
/// - `InsufficientFunds` when the outputs cannot pay the base fee
pub async fn quote_funding(
    ledger: &dyn Ledger,
    address: &str,
    network: Network,
    fee_rate: u64,
) -> Result<FundingQuote> {
    parse_address(address, network)?;
    let inputs = spendable_outputs(ledger, address).await?;
    let total_sats: u64 = inputs.iter().map(|input| input.amount_sats).sum();
    let fees = FeeSchedule::estimate(inputs.len(), QUOTED_OUTPUTS, fee_rate);
    if inputs.is_empty() || total_sats < fees.base {
        return Err(MdipError::InsufficientFunds {
            available: total_sats,
            required: fees.base,
        });
    }
    debug!("{} holds {} sats in {} outputs", address, total_sats, inputs.len());
    Ok(FundingQuote {
        inputs,
        total_sats,
        fees,
    })
}

/// Confirmed balance of `address`, in satoshis.
pub async fn balance(ledger: &dyn Ledger, address: &str, network: Network) -> Result<u64> {
    parse_address(address, network)?;
    let unspent = ledger.list_unspent(address).await?;
    Ok(unspent.iter().map(|input| input.amount_sats).sum())
}

/// Confirmation depth of every known transaction in `txids`.
///
/// # Errors
/// `NotFound` when none of the ids is known; upstream failures are passed through.
pub async fn confirmations(ledger: &dyn Ledger, txids: &[String]) -> Result<ConfirmationReport> {
    let mut report = ConfirmationReport {
        valid: Vec::new(),
        invalid: Vec::new(),
    };
    for txid in txids {
        match ledger.get_raw_transaction(txid).await {
            Ok(tx) => report.valid.push(TxConfirmations {
                txid: txid.clone(),
                confirmations: tx.confirmations,
            }),
            Err(MdipError::NotFound(_)) => report.invalid.push(txid.clone()),
            Err(e) => return Err(e),
        }
    }
    if report.valid.is_empty() {
        return Err(MdipError::NotFound(format!("none of {:?} is known", report.invalid)));
    }
    Ok(report)
}

/// Looks a transaction up together with its block height and index in the block.
pub async fn tx_details(ledger: &dyn Ledger, txid: &str) -> Result<TxDetails> {
    let transaction = ledger.get_raw_transaction(txid).await?;
    let (block_height, tx_index) = match &transaction.block_hash {
        Some(block_hash) => {
            let block = ledger.get_block(block_hash).await?;
            let index = block.transactions.iter().position(|tx| tx.txid == txid);
            (Some(block.height), index)
        }
        None => (None, None),
    };
    Ok(TxDetails {
        transaction,
        block_height,
        tx_index,
    })
}

/// Outputs of `address` that can fund a change of the DID tip `tip`, excluding the
/// tip itself.
pub async fn funding_besides(ledger: &dyn Ledger, address: &str, tip: &OutPointRef) -> Result<Vec<SpendableInput>> {
    let inputs = ledger.list_unspent(address).await?;
    Ok(inputs
        .into_iter()
        .filter(|input| &input.outpoint() != tip)
        .collect())
}
