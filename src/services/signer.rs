// src/services/signer.rs
//! Transaction and message signing.
//!
//! Keys arrive with each call and are dropped before the call returns. A UTXO
//! transaction is only finalized once every input carries a signature that
//! verifies against the output it spends; otherwise nothing is returned.

use crate::adapters::utxo::decode_transaction;
use crate::blockchain::ChainBackends;
use crate::error::{MdipError, Result};
use crate::models::did::{ChainTag, Network};
use crate::models::transaction::{
    SignedTransaction, UnsignedContractCall, UnsignedTransaction, UnsignedUtxoTransaction,
};
use crate::wallet::key_management::KeyManager;
use bitcoin::consensus::encode::serialize_hex;
use bitcoin::hashes::Hash;
use bitcoin::script::{Builder, PushBytesBuf};
use bitcoin::secp256k1::Message;
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::ScriptBuf;
use ethers::signers::Signer as _;
use ethers_core::types::transaction::eip2718::TypedTransaction;
use ethers_core::types::{Address, Bytes, TransactionRequest};
use ethers_core::utils::rlp::Rlp;
use ethers_core::utils::{hex, keccak256};
use log::{debug, info};
use std::str::FromStr;

fn rejected<E: std::fmt::Display>(e: E) -> MdipError {
    MdipError::SignatureValidationFailed(e.to_string())
}

/// Signs the output of the transaction preparer.
///
/// # Arguments
/// * `unsigned` - Prepared transaction
/// * `private_key` - WIF for UTXO chains (network taken from the transaction), hex
///   for the account chain
///
/// # Errors
/// - `InvalidKey` for an unparsable key or a key of the wrong network
/// - `SignatureValidationFailed` when any input cannot be signed and verified
/// - `UnsupportedOperation` for document-store results, which are gated by
///   message signatures instead
pub fn sign(unsigned: &UnsignedTransaction, private_key: &str) -> Result<SignedTransaction> {
    match unsigned {
        UnsignedTransaction::Utxo(tx) => sign_utxo(tx, private_key),
        UnsignedTransaction::ContractCall(call) => sign_contract_call(call, private_key),
        UnsignedTransaction::Record { .. } | UnsignedTransaction::Applied { .. } => Err(
            MdipError::UnsupportedOperation("document-store operations are not signed".into()),
        ),
    }
}

/// Legacy P2PKH signing of every input with `SIGHASH_ALL`.
fn sign_utxo(unsigned: &UnsignedUtxoTransaction, private_key: &str) -> Result<SignedTransaction> {
    let key = KeyManager::from_wif(private_key, unsigned.network)?;
    let public_key = key.public_key();
    let expected_script = ScriptBuf::new_p2pkh(&public_key.pubkey_hash());
    let mut psbt = unsigned.psbt.clone();

    let mut signatures = Vec::with_capacity(psbt.inputs.len());
    {
        let cache = SighashCache::new(&psbt.unsigned_tx);
        for (index, (input, txin)) in psbt.inputs.iter().zip(&psbt.unsigned_tx.input).enumerate() {
            let previous = input
                .non_witness_utxo
                .as_ref()
                .ok_or_else(|| rejected(format!("input {} lacks its previous transaction", index)))?;
            if previous.compute_txid() != txin.previous_output.txid {
                return Err(rejected(format!("input {} carries the wrong previous transaction", index)));
            }
            let spent = previous
                .output
                .get(txin.previous_output.vout as usize)
                .ok_or_else(|| rejected(format!("input {} spends a missing output", index)))?;
            if spent.script_pubkey != expected_script {
                return Err(rejected(format!("input {} is not spendable by the supplied key", index)));
            }

            let sighash = cache
                .legacy_signature_hash(index, &spent.script_pubkey, EcdsaSighashType::All.to_u32())
                .map_err(rejected)?;
            let message = Message::from_digest(sighash.to_byte_array());
            let signature = key.secp().sign_ecdsa(&message, key.secret_key());
            key.secp()
                .verify_ecdsa(&message, &signature, &public_key.inner)
                .map_err(rejected)?;
            signatures.push(bitcoin::ecdsa::Signature {
                signature,
                sighash_type: EcdsaSighashType::All,
            });
        }
    }

    for (input, signature) in psbt.inputs.iter_mut().zip(signatures) {
        let push = PushBytesBuf::try_from(signature.to_vec()).map_err(rejected)?;
        input.final_script_sig = Some(Builder::new().push_slice(push).push_key(&public_key).into_script());
    }
    let tx = psbt.extract_tx_unchecked_fee_rate();
    let txid = tx.compute_txid().to_string();
    debug!("signed {} transaction {}", unsigned.chain, txid);

    Ok(SignedTransaction::Utxo {
        chain: unsigned.chain,
        txid,
        hex: serialize_hex(&tx),
    })
}

/// EIP-155 signing of a registry call with a transient wallet.
fn sign_contract_call(call: &UnsignedContractCall, private_key: &str) -> Result<SignedTransaction> {
    let key = KeyManager::from_hex(private_key)?;
    let wallet = key.ethereum_wallet(call.chain_id)?;
    let from = Address::from_str(&call.from).map_err(|e| MdipError::InvalidAddress(e.to_string()))?;
    if from != wallet.address() {
        return Err(MdipError::InvalidKey(format!("key does not belong to {}", call.from)));
    }
    let to = Address::from_str(&call.contract_address).map_err(|e| MdipError::InvalidAddress(e.to_string()))?;
    let data = Bytes::from_str(&call.data).map_err(|e| MdipError::SchemaViolation(format!("call data: {}", e)))?;

    let tx: TypedTransaction = TransactionRequest::new()
        .from(from)
        .to(to)
        .data(data)
        .gas(call.gas_limit)
        .gas_price(call.gas_price)
        .nonce(call.nonce)
        .chain_id(call.chain_id)
        .into();
    let signature = wallet.sign_transaction_sync(&tx).map_err(rejected)?;
    let raw = tx.rlp_signed(&signature);
    drop(wallet);

    Ok(SignedTransaction::Contract {
        hash: format!("0x{}", hex::encode(keccak256(&raw))),
        raw: format!("0x{}", hex::encode(&raw)),
    })
}

/// Signs a payload exactly as given.
///
/// # Returns
/// - `btc`/`omni`: base64 bitcoin signed-message, WIF key for `network`
/// - `mongodb`: base64 bitcoin signed-message, hex key
/// - `eth`: `0x` hex EIP-191 personal-sign signature, hex key
pub fn sign_message(
    payload: &str,
    private_key: &str,
    chain: ChainTag,
    network: Network,
    extra_entropy: Option<&[u8; 32]>,
) -> Result<String> {
    match chain {
        ChainTag::Btc | ChainTag::Omni => {
            Ok(KeyManager::from_wif(private_key, network)?.sign_bitcoin_message(payload, extra_entropy))
        }
        ChainTag::MongoDb => Ok(KeyManager::from_hex(private_key)?.sign_bitcoin_message(payload, extra_entropy)),
        ChainTag::Eth => KeyManager::from_hex(private_key)?.sign_ethereum_message(payload.as_bytes()),
    }
}

/// Wraps a transaction signed outside this service so it can be broadcast.
///
/// # Arguments
/// * `chain` - Chain the transaction belongs to
/// * `raw` - Consensus hex for UTXO chains, RLP hex for `eth`, with or without `0x`
///
/// # Errors
/// - `SignatureValidationFailed` when the transaction does not decode or a UTXO
///   input carries no signature
/// - `UnsupportedOperation` for the document store
pub fn from_signed_raw(chain: ChainTag, raw: &str) -> Result<SignedTransaction> {
    let raw = raw.trim_start_matches("0x");
    match chain {
        ChainTag::Btc | ChainTag::Omni => {
            let tx = decode_transaction(raw).map_err(rejected)?;
            if let Some(index) = tx
                .input
                .iter()
                .position(|input| input.script_sig.is_empty() && input.witness.is_empty())
            {
                return Err(rejected(format!("input {} is not signed", index)));
            }
            Ok(SignedTransaction::Utxo {
                chain,
                txid: tx.compute_txid().to_string(),
                hex: raw.to_string(),
            })
        }
        ChainTag::Eth => {
            let bytes = hex::decode(raw).map_err(rejected)?;
            TypedTransaction::decode_signed(&Rlp::new(&bytes)).map_err(rejected)?;
            Ok(SignedTransaction::Contract {
                hash: format!("0x{}", hex::encode(keccak256(&bytes))),
                raw: format!("0x{}", raw),
            })
        }
        ChainTag::MongoDb => Err(MdipError::UnsupportedOperation(
            "document-store changes are applied when prepared".into(),
        )),
    }
}

/// Submits a signed transaction to the node or registry of its chain and returns
/// the transaction id reported back.
pub async fn broadcast(backends: &ChainBackends, signed: &SignedTransaction) -> Result<String> {
    let id = match signed {
        SignedTransaction::Utxo { chain, hex, .. } => backends.ledger(*chain)?.send_raw_transaction(hex).await?,
        SignedTransaction::Contract { raw, .. } => backends.registry.send_raw_transaction(raw).await?,
    };
    info!("broadcast {}", id);
    Ok(id)
}
