// src/adapters/utxo.rs
//! Bitcoin and Omni layer adapters.
//!
//! Both chains share the Bitcoin ledger and build legacy P2PKH transactions in
//! PSBT form. They differ in the metadata limit, in the Omni payload header and in
//! the position of the data-carrier output.

use crate::adapters::{ChainAdapter, ChangeRequest, CreateRequest};
use crate::blockchain::Ledger;
use crate::error::{MdipError, Result};
use crate::models::did::{ChainTag, Network};
use crate::models::transaction::{FeeSchedule, SpendableInput, UnsignedTransaction, UnsignedUtxoTransaction};
use crate::wallet::key_management::parse_address;
use async_trait::async_trait;
use bitcoin::psbt::Psbt;
use bitcoin::script::{Instruction, PushBytesBuf};
use bitcoin::{
    absolute, transaction, Address, Amount, OutPoint, Script, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid,
    Witness,
};
use ethers_core::utils::hex;
use log::{debug, warn};
use std::str::FromStr;
use std::sync::Arc;

pub const BTC_MAX_METADATA_BYTES: usize = 160;
pub const OMNI_MAX_METADATA_BYTES: usize = 144;

/// Omni class C header: marker `omni`, version 0, message type 200.
pub const OMNI_HEADER: [u8; 8] = [0x6f, 0x6d, 0x6e, 0x69, 0x00, 0x00, 0x00, 0xc8];

/// Bytes pushed by an `OP_RETURN` script, `None` for any other script.
pub fn null_data_payload(script: &Script) -> Option<Vec<u8>> {
    if !script.is_op_return() {
        return None;
    }
    let mut payload = Vec::new();
    for instruction in script.instructions().skip(1) {
        match instruction.ok()? {
            Instruction::PushBytes(bytes) => payload.extend_from_slice(bytes.as_bytes()),
            Instruction::Op(_) => return None,
        }
    }
    Some(payload)
}

/// Decodes a consensus-serialized transaction from hex.
pub fn decode_transaction(raw: &str) -> Result<Transaction> {
    let bytes = hex::decode(raw).map_err(|e| MdipError::InvalidReference(format!("transaction hex: {}", e)))?;
    bitcoin::consensus::deserialize(&bytes)
        .map_err(|e| MdipError::InvalidReference(format!("undecodable transaction: {}", e)))
}

/// Adapter of a chain living on the Bitcoin ledger.
pub struct UtxoAdapter {
    chain: ChainTag,
    ledger: Arc<dyn Ledger>,
    fee_rate: u64,
}

impl UtxoAdapter {
    pub fn bitcoin(ledger: Arc<dyn Ledger>, fee_rate: u64) -> Self {
        UtxoAdapter {
            chain: ChainTag::Btc,
            ledger,
            fee_rate,
        }
    }

    pub fn omni(ledger: Arc<dyn Ledger>, fee_rate: u64) -> Self {
        UtxoAdapter {
            chain: ChainTag::Omni,
            ledger,
            fee_rate,
        }
    }

    fn fees(&self, explicit: Option<FeeSchedule>, inputs: usize, value_outputs: usize) -> FeeSchedule {
        explicit.unwrap_or_else(|| FeeSchedule::estimate(inputs, value_outputs, self.fee_rate))
    }

    fn metadata_output(&self, document_url: &str) -> Result<TxOut> {
        let payload = self.encode_metadata(document_url.as_bytes())?;
        let push = PushBytesBuf::try_from(payload)
            .map_err(|_| MdipError::PayloadTooLarge {
                len: document_url.len(),
                max: self.max_metadata_bytes().unwrap_or(0),
            })?;
        Ok(TxOut {
            value: Amount::ZERO,
            script_pubkey: ScriptBuf::new_op_return(push),
        })
    }

    /// Previous transaction of `input`, checked against the claimed amount.
    async fn previous_transaction(&self, input: &SpendableInput) -> Result<Transaction> {
        let raw = match &input.raw_tx_hex {
            Some(raw) => raw.clone(),
            None => self
                .ledger
                .get_raw_transaction(&input.txid)
                .await?
                .hex
                .ok_or_else(|| {
                    MdipError::UpstreamUnavailable(format!("node returned no hex for {}", input.txid))
                })?,
        };
        let previous = decode_transaction(&raw)?;
        if previous.compute_txid().to_string() != input.txid {
            return Err(MdipError::InvalidReference(format!(
                "raw transaction does not hash to {}",
                input.txid
            )));
        }
        let output = previous
            .output
            .get(input.vout as usize)
            .ok_or_else(|| MdipError::InvalidReference(format!("{} has no output {}", input.txid, input.vout)))?;
        if output.value.to_sat() != input.amount_sats {
            return Err(MdipError::InvalidReference(format!(
                "{} claims {} sats, the ledger holds {}",
                input.outpoint(),
                input.amount_sats,
                output.value.to_sat()
            )));
        }
        Ok(previous)
    }

    async fn build(
        &self,
        network: Network,
        inputs: &[SpendableInput],
        outputs: Vec<TxOut>,
    ) -> Result<UnsignedTransaction> {
        let mut txins = Vec::with_capacity(inputs.len());
        let mut previous = Vec::with_capacity(inputs.len());
        for input in inputs {
            let txid = Txid::from_str(&input.txid)
                .map_err(|e| MdipError::InvalidReference(format!("{}: {}", input.txid, e)))?;
            txins.push(TxIn {
                previous_output: OutPoint::new(txid, input.vout),
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            });
            previous.push(self.previous_transaction(input).await?);
        }

        let unsigned_tx = Transaction {
            version: transaction::Version::ONE,
            lock_time: absolute::LockTime::ZERO,
            input: txins,
            output: outputs,
        };
        let mut psbt =
            Psbt::from_unsigned_tx(unsigned_tx).map_err(|e| MdipError::InvalidReference(e.to_string()))?;
        for (psbt_input, previous) in psbt.inputs.iter_mut().zip(previous) {
            psbt_input.non_witness_utxo = Some(previous);
        }
        debug!(
            "{} transaction with {} inputs and {} outputs",
            self.chain,
            psbt.unsigned_tx.input.len(),
            psbt.unsigned_tx.output.len()
        );

        Ok(UnsignedTransaction::Utxo(UnsignedUtxoTransaction {
            chain: self.chain,
            network,
            psbt,
        }))
    }

    fn pay_to(address: &Address, value: u64) -> TxOut {
        TxOut {
            value: Amount::from_sat(value),
            script_pubkey: address.script_pubkey(),
        }
    }

    /// Spends the current tip to the new receiver; `publish` adds the metadata output.
    async fn prepare_change(&self, request: &ChangeRequest, publish: bool) -> Result<UnsignedTransaction> {
        let network = request.network;
        let tip = request
            .tip
            .as_ref()
            .ok_or_else(|| MdipError::NotFound(format!("no current tip for {}", request.did)))?;
        let controller = request
            .controller
            .as_deref()
            .ok_or_else(|| MdipError::ControlVerificationFailed("no controller address supplied".into()))?;
        if tip.address.as_deref() != Some(controller) {
            warn!("{} is not the controller of {}", controller, request.did);
            return Err(MdipError::ControlVerificationFailed(format!(
                "{} does not control {}",
                controller, request.did
            )));
        }
        let receiver = parse_address(request.new_receiver.as_deref().unwrap_or(controller), network)?;

        let metadata = if publish {
            let url = request
                .document_url
                .as_deref()
                .ok_or_else(|| MdipError::InvalidDocumentURL("an update must reference a document".into()))?;
            Some(self.metadata_output(url)?)
        } else {
            None
        };

        let mut inputs = vec![SpendableInput {
            txid: tip.outpoint.txid.clone(),
            vout: tip.outpoint.vout,
            amount_sats: tip.value_sats,
            raw_tx_hex: None,
        }];
        let tip_fees = self.fees(request.fees, 1, 1);
        let required = tip_fees.for_metadata(metadata.is_some()) + self.dust_value();
        if tip.value_sats < required {
            inputs.extend(request.funding.iter().cloned());
        }
        let fee = self.fees(request.fees, inputs.len(), 1).for_metadata(metadata.is_some());
        let required = fee + self.dust_value();
        let available: u64 = inputs.iter().map(|input| input.amount_sats).sum();
        if available < required {
            return Err(MdipError::InsufficientFunds { available, required });
        }

        let mut outputs = vec![Self::pay_to(&receiver, available - fee)];
        outputs.extend(metadata);
        self.build(network, &inputs, outputs).await
    }
}

#[async_trait]
impl ChainAdapter for UtxoAdapter {
    fn chain(&self) -> ChainTag {
        self.chain
    }

    fn max_metadata_bytes(&self) -> Option<usize> {
        match self.chain {
            ChainTag::Omni => Some(OMNI_MAX_METADATA_BYTES),
            _ => Some(BTC_MAX_METADATA_BYTES),
        }
    }

    fn encode_metadata(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let max = self.max_metadata_bytes().unwrap_or(usize::MAX);
        if payload.len() > max {
            return Err(MdipError::PayloadTooLarge {
                len: payload.len(),
                max,
            });
        }
        match self.chain {
            ChainTag::Omni => Ok(OMNI_HEADER.iter().chain(payload).copied().collect()),
            _ => Ok(payload.to_vec()),
        }
    }

    fn decode_metadata(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self.chain {
            ChainTag::Omni => Ok(data.strip_prefix(&OMNI_HEADER[..]).unwrap_or(data).to_vec()),
            _ => Ok(data.to_vec()),
        }
    }

    async fn prepare_create(&self, request: &CreateRequest) -> Result<UnsignedTransaction> {
        let network = request.network;
        let updater = parse_address(&request.updater, network)?;
        let creator = parse_address(&request.creator, network)?;
        let metadata = request
            .document_url
            .as_deref()
            .map(|url| self.metadata_output(url))
            .transpose()?;

        let fee = self
            .fees(request.fees, request.inputs.len(), 2)
            .for_metadata(metadata.is_some());
        let required = self.dust_value() + fee;
        let available: u64 = request.inputs.iter().map(|input| input.amount_sats).sum();
        if request.inputs.is_empty() || available < required {
            return Err(MdipError::InsufficientFunds { available, required });
        }
        let change = available - required;

        let mut outputs = vec![Self::pay_to(&updater, self.dust_value())];
        let change_output = (change > 0).then(|| Self::pay_to(&creator, change));
        match self.chain {
            ChainTag::Omni => {
                outputs.extend(metadata);
                outputs.extend(change_output);
            }
            _ => {
                outputs.extend(change_output);
                outputs.extend(metadata);
            }
        }
        self.build(network, &request.inputs, outputs).await
    }

    async fn prepare_update(&self, request: &ChangeRequest) -> Result<UnsignedTransaction> {
        self.prepare_change(request, true).await
    }

    async fn prepare_delete(&self, request: &ChangeRequest) -> Result<UnsignedTransaction> {
        self.prepare_change(request, false).await
    }
}
