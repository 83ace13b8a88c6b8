// src/models/transaction.rs
//! Ledger views and the payloads that flow between the preparer, the signer and
//! the broadcaster.
//!
//! The views are read-only projections of what a ledger node reports; they only
//! carry the fields the resolution walk and the preparer look at.

use crate::models::did::{ChainTag, Network};
use bitcoin::psbt::Psbt;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A transaction output reference, `(txid, vout)`.
///
/// For UTXO identifiers the anchor point is the output decoded from the DID's
/// txref; during resolution it is the walk's frontier.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutPointRef {
    pub txid: String,
    pub vout: u32,
}

impl OutPointRef {
    pub fn new(txid: impl Into<String>, vout: u32) -> Self {
        OutPointRef {
            txid: txid.into(),
            vout,
        }
    }
}

impl fmt::Display for OutPointRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}

/// What an output pays to.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum OutputKind {
    /// A standard output with a decodable address
    Address(String),
    /// A data-carrier (OP_RETURN) output and its pushed bytes
    NullData(Vec<u8>),
    NonStandard,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TxOutputView {
    pub n: u32,
    pub value_sats: u64,
    pub kind: OutputKind,
}

impl TxOutputView {
    pub fn address(&self) -> Option<&str> {
        match &self.kind {
            OutputKind::Address(address) => Some(address),
            _ => None,
        }
    }
}

/// Read-only view of a ledger transaction.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LedgerTransaction {
    pub txid: String,
    /// Outputs spent by this transaction, in input order. Coinbase inputs are omitted.
    pub inputs: Vec<OutPointRef>,
    pub outputs: Vec<TxOutputView>,
    /// Hash of the containing block, `None` while unconfirmed
    pub block_hash: Option<String>,
    /// Raw consensus-encoded transaction in hex, when the node reported it
    pub hex: Option<String>,
    /// Depth below the chain tip, 0 while unconfirmed or when not reported
    #[serde(default)]
    pub confirmations: u32,
}

impl LedgerTransaction {
    /// Raw payload of the transaction's data-carrier output.
    ///
    /// Only one metadata output per transaction is meaningful; when several are
    /// present the last one wins.
    pub fn metadata(&self) -> Option<&[u8]> {
        self.outputs.iter().rev().find_map(|output| match &output.kind {
            OutputKind::NullData(data) => Some(data.as_slice()),
            _ => None,
        })
    }

    pub fn spends(&self, outpoint: &OutPointRef) -> bool {
        self.inputs.iter().any(|input| input == outpoint)
    }

    /// Index of the first output, the continuation of the document chain.
    pub fn first_output(&self) -> Option<u32> {
        self.outputs.first().map(|output| output.n)
    }
}

/// Read-only view of a block with its full transaction list.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub hash: String,
    pub height: u32,
    pub transactions: Vec<LedgerTransaction>,
    pub next_block_hash: Option<String>,
}

/// Spentness of an output as reported by the node's UTXO set.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum UtxoStatus {
    Unspent {
        value_sats: u64,
        address: Option<String>,
    },
    /// Absent from the UTXO set
    Spent,
}

/// An output the caller is able to spend.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SpendableInput {
    pub txid: String,
    pub vout: u32,
    pub amount_sats: u64,
    /// Raw hex of the transaction that created the output. Fetched from the ledger
    /// when absent.
    #[serde(default)]
    pub raw_tx_hex: Option<String>,
}

impl SpendableInput {
    pub fn outpoint(&self) -> OutPointRef {
        OutPointRef::new(self.txid.clone(), self.vout)
    }
}

/// Two-tier fee policy of the UTXO chains, in satoshis.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSchedule {
    /// Fee of a transaction without a data-carrier output
    pub base: u64,
    /// Fee of a transaction carrying a data-carrier output
    pub nulldata: u64,
}

impl FeeSchedule {
    /// Estimated size of a legacy P2PKH transaction: 10 bytes of overhead,
    /// 148 per input and 34 per output.
    pub fn estimate(input_count: usize, output_count: usize, sat_per_byte: u64) -> Self {
        let base_size = 10 + 148 * input_count as u64 + 34 * output_count as u64;
        // OP_RETURN output: value, script length, opcode, push prefix and an 80 byte payload
        let nulldata_size = base_size + 8 + 1 + 1 + 2 + 80;
        FeeSchedule {
            base: base_size * sat_per_byte,
            nulldata: nulldata_size * sat_per_byte,
        }
    }

    pub fn for_metadata(&self, has_metadata: bool) -> u64 {
        if has_metadata {
            self.nulldata
        } else {
            self.base
        }
    }
}

/// An unsigned UTXO transaction in PSBT form, with the previous transactions of
/// every input attached.
#[derive(Debug, Clone, PartialEq)]
pub struct UnsignedUtxoTransaction {
    pub chain: ChainTag,
    pub network: Network,
    pub psbt: Psbt,
}

impl UnsignedUtxoTransaction {
    pub fn to_hex(&self) -> String {
        ethers_core::utils::hex::encode(self.psbt.serialize())
    }

    pub fn from_hex(chain: ChainTag, network: Network, hex: &str) -> crate::error::Result<Self> {
        let bytes = ethers_core::utils::hex::decode(hex)
            .map_err(|e| crate::error::MdipError::SignatureValidationFailed(e.to_string()))?;
        let psbt = Psbt::deserialize(&bytes)
            .map_err(|e| crate::error::MdipError::SignatureValidationFailed(e.to_string()))?;
        Ok(UnsignedUtxoTransaction {
            chain,
            network,
            psbt,
        })
    }

    /// Values of the outputs, in order.
    pub fn output_values(&self) -> Vec<u64> {
        self.psbt
            .unsigned_tx
            .output
            .iter()
            .map(|output| output.value.to_sat())
            .collect()
    }

    pub fn has_metadata_output(&self) -> bool {
        self.psbt
            .unsigned_tx
            .output
            .iter()
            .any(|output| output.script_pubkey.is_op_return())
    }
}

/// Unsigned call to the account-chain registry contract, exactly as the remote
/// registry service prepared it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UnsignedContractCall {
    pub from: String,
    pub contract_address: String,
    /// ABI-encoded call data, `0x`-prefixed hex
    pub data: String,
    pub gas_price: u64,
    pub gas_limit: u64,
    pub nonce: u64,
    pub chain_id: u64,
}

impl UnsignedContractCall {
    /// Maximum fee of the call in wei.
    pub fn fee(&self) -> u128 {
        self.gas_price as u128 * self.gas_limit as u128
    }
}

/// Output of the transaction preparer.
#[derive(Debug, Clone, PartialEq)]
pub enum UnsignedTransaction {
    Utxo(UnsignedUtxoTransaction),
    ContractCall(UnsignedContractCall),
    /// A document-store DID was allocated under this record id
    Record { record_id: String },
    /// A document-store update or deletion was applied to this record
    Applied { record_id: String },
}

/// A finalized, broadcastable transaction.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum SignedTransaction {
    Utxo {
        chain: ChainTag,
        txid: String,
        hex: String,
    },
    Contract {
        hash: String,
        raw: String,
    },
}
