// src/blockchain/bitcoin_rpc.rs
//! bitcoind JSON-RPC client.
//!
//! Implements [`Ledger`] for Bitcoin and for the Omni layer node, which exposes the
//! same RPC surface for the shared ledger.

use crate::adapters::utxo::null_data_payload;
use crate::blockchain::Ledger;
use crate::error::{MdipError, Result};
use crate::models::transaction::{
    Block, LedgerTransaction, OutPointRef, OutputKind, SpendableInput, TxOutputView, UtxoStatus,
};
use async_trait::async_trait;
use bitcoin::{Amount, ScriptBuf};
use log::debug;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

/// JSON-RPC client for a bitcoind-compatible node.
///
/// # Features
/// - HTTP basic authentication
/// - Verbose transaction/block decoding into ledger views
/// - No internal retries; every failure surfaces as `UpstreamUnavailable`
#[derive(Clone)]
pub struct BitcoinRpc {
    client: reqwest::Client,
    url: String,
    user: Option<String>,
    password: Option<String>,
}

#[derive(Deserialize)]
struct RpcResponse<R> {
    result: Option<R>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct RpcTransaction {
    txid: String,
    #[serde(default)]
    vin: Vec<RpcInput>,
    #[serde(default)]
    vout: Vec<RpcOutput>,
    blockhash: Option<String>,
    hex: Option<String>,
    // absent on the transactions of a verbose block
    #[serde(default)]
    confirmations: u32,
}

#[derive(Deserialize)]
struct RpcInput {
    // absent on coinbase inputs
    txid: Option<String>,
    vout: Option<u32>,
}

#[derive(Deserialize)]
struct RpcOutput {
    value: f64,
    n: u32,
    #[serde(rename = "scriptPubKey")]
    script_pub_key: RpcScript,
}

#[derive(Deserialize)]
struct RpcScript {
    #[serde(rename = "type")]
    script_type: String,
    hex: String,
    address: Option<String>,
    #[serde(default)]
    addresses: Vec<String>,
}

#[derive(Deserialize)]
struct RpcBlock {
    hash: String,
    height: u32,
    tx: Vec<RpcTransaction>,
    nextblockhash: Option<String>,
}

#[derive(Deserialize)]
struct RpcTxOut {
    value: f64,
    #[serde(rename = "scriptPubKey")]
    script_pub_key: RpcScript,
}

#[derive(Deserialize)]
struct RpcUnspent {
    txid: String,
    vout: u32,
    amount: f64,
}

fn to_sats(value: f64) -> Result<u64> {
    Amount::from_btc(value)
        .map(|amount| amount.to_sat())
        .map_err(|e| MdipError::UpstreamUnavailable(format!("invalid amount {}: {}", value, e)))
}

impl RpcScript {
    fn address(&self) -> Option<String> {
        self.address.clone().or_else(|| self.addresses.first().cloned())
    }

    fn kind(&self) -> OutputKind {
        if self.script_type == "nulldata" {
            let payload = ScriptBuf::from_hex(&self.hex)
                .ok()
                .and_then(|script| null_data_payload(&script));
            if let Some(payload) = payload {
                return OutputKind::NullData(payload);
            }
        }
        match self.address() {
            Some(address) => OutputKind::Address(address),
            None => OutputKind::NonStandard,
        }
    }
}

impl RpcTransaction {
    fn into_view(self) -> Result<LedgerTransaction> {
        let inputs = self
            .vin
            .into_iter()
            .filter_map(|input| match (input.txid, input.vout) {
                (Some(txid), Some(vout)) => Some(OutPointRef::new(txid, vout)),
                _ => None,
            })
            .collect();
        let outputs = self
            .vout
            .into_iter()
            .map(|output| {
                Ok(TxOutputView {
                    n: output.n,
                    value_sats: to_sats(output.value)?,
                    kind: output.script_pub_key.kind(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(LedgerTransaction {
            txid: self.txid,
            inputs,
            outputs,
            block_hash: self.blockhash,
            hex: self.hex,
            confirmations: self.confirmations,
        })
    }
}

impl BitcoinRpc {
    /// Creates a client for the node at `url`.
    ///
    /// # Arguments
    /// * `url` - RPC endpoint, e.g. `http://127.0.0.1:18332`
    /// * `user` / `password` - RPC credentials, if the node requires them
    pub fn new(url: &str, user: Option<String>, password: Option<String>) -> Self {
        BitcoinRpc {
            client: reqwest::Client::new(),
            url: url.to_string(),
            user,
            password,
        }
    }

    /// Performs one JSON-RPC call. A `null` result is returned as `None`.
    async fn call<R: DeserializeOwned>(&self, method: &str, params: Value) -> Result<Option<R>> {
        debug!("rpc {} {}", method, params);
        let mut request = self.client.post(&self.url).json(&json!({
            "jsonrpc": "1.0",
            "id": "mdip",
            "method": method,
            "params": params,
        }));
        if let Some(user) = &self.user {
            request = request.basic_auth(user, self.password.as_ref());
        }

        let response: RpcResponse<R> = request.send().await?.json().await?;
        if let Some(error) = response.error {
            return Err(MdipError::UpstreamUnavailable(format!(
                "{} failed ({}): {}",
                method, error.code, error.message
            )));
        }
        Ok(response.result)
    }

    async fn call_required<R: DeserializeOwned>(&self, method: &str, params: Value) -> Result<R> {
        self.call(method, params)
            .await?
            .ok_or_else(|| MdipError::UpstreamUnavailable(format!("{} returned no result", method)))
    }
}

/// `gettxout` against the confirmed UTXO set only. An output spent by a mempool
/// transaction still reads as unspent, since the walk only finds spenders in
/// blocks.
fn gettxout_params(outpoint: &OutPointRef) -> Value {
    json!([outpoint.txid, outpoint.vout, false])
}

#[async_trait]
impl Ledger for BitcoinRpc {
    async fn get_raw_transaction(&self, txid: &str) -> Result<LedgerTransaction> {
        let tx: RpcTransaction = self.call_required("getrawtransaction", json!([txid, true])).await?;
        tx.into_view()
    }

    async fn get_block(&self, block_hash: &str) -> Result<Block> {
        let block: RpcBlock = self.call_required("getblock", json!([block_hash, 2])).await?;
        let transactions = block
            .tx
            .into_iter()
            .map(|tx| {
                let mut view = tx.into_view()?;
                view.block_hash.get_or_insert_with(|| block.hash.clone());
                Ok(view)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Block {
            hash: block.hash,
            height: block.height,
            transactions,
            next_block_hash: block.nextblockhash,
        })
    }

    async fn get_block_hash(&self, height: u32) -> Result<String> {
        self.call_required("getblockhash", json!([height])).await
    }

    async fn list_unspent(&self, address: &str) -> Result<Vec<SpendableInput>> {
        let unspents: Vec<RpcUnspent> = self
            .call_required("listunspent", json!([1, 9_999_999, [address]]))
            .await?;
        unspents
            .into_iter()
            .map(|unspent| {
                Ok(SpendableInput {
                    txid: unspent.txid,
                    vout: unspent.vout,
                    amount_sats: to_sats(unspent.amount)?,
                    raw_tx_hex: None,
                })
            })
            .collect()
    }

    async fn get_utxo_status(&self, outpoint: &OutPointRef) -> Result<UtxoStatus> {
        let txout: Option<RpcTxOut> = self.call("gettxout", gettxout_params(outpoint)).await?;
        match txout {
            Some(txout) => Ok(UtxoStatus::Unspent {
                value_sats: to_sats(txout.value)?,
                address: txout.script_pub_key.address(),
            }),
            None => Ok(UtxoStatus::Spent),
        }
    }

    async fn send_raw_transaction(&self, hex: &str) -> Result<String> {
        self.call_required("sendrawtransaction", json!([hex])).await
    }
}
