// src/identifier/txref.rs
//! BIP-136 transaction references.
//!
//! A txref is a bech32 encoding of `(block height, position in block, output index)`
//! under the human-readable prefix `tx` (mainnet) or `txtest` (testnet). DIDs carry
//! the data part only, grouped by four characters (`did:mdip:btc-yxxx-xxxx-...`),
//! so the network must be known to verify the checksum.

use crate::blockchain::Ledger;
use crate::error::{MdipError, Result};
use crate::models::did::Network;
use crate::models::transaction::{OutPointRef, OutputKind};
use bech32::{u5, Variant};
use log::debug;

/// Characters of the bech32 data alphabet.
pub const BECH32_CHARSET: &str = "qpzry9x8gf2tvdw0s3jn54khce6mua7l";

const MAGIC_MAIN: u8 = 0x3;
const MAGIC_MAIN_EXTENDED: u8 = 0x4;
const MAGIC_TEST: u8 = 0x6;
const MAGIC_TEST_EXTENDED: u8 = 0x7;

const SHORT_DATA_LEN: usize = 9;
const EXTENDED_DATA_LEN: usize = 12;

const MAX_BLOCK_HEIGHT: u32 = 0xFF_FFFF;
const MAX_POSITION: u16 = 0x7FFF;

/// Location of a transaction output on a UTXO ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxRef {
    pub network: Network,
    pub block_height: u32,
    pub tx_index: u16,
    pub output_index: u16,
}

impl TxRef {
    pub fn new(network: Network, block_height: u32, tx_index: u16, output_index: u16) -> Self {
        TxRef {
            network,
            block_height,
            tx_index,
            output_index,
        }
    }

    pub fn hrp(network: Network) -> &'static str {
        match network {
            Network::Mainnet => "tx",
            Network::Testnet => "txtest",
        }
    }

    /// Encodes the extended form of the reference, without the `tx1:`/`txtest1:`
    /// prefix and hyphenated in groups of four.
    pub fn encode(&self) -> Result<String> {
        if self.block_height > MAX_BLOCK_HEIGHT || self.tx_index > MAX_POSITION || self.output_index > MAX_POSITION {
            return Err(MdipError::InvalidReference(format!(
                "location {}/{}/{} is out of txref range",
                self.block_height, self.tx_index, self.output_index
            )));
        }
        let height = self.block_height;
        let position = u32::from(self.tx_index);
        let output = u32::from(self.output_index);

        let magic = match self.network {
            Network::Mainnet => MAGIC_MAIN_EXTENDED,
            Network::Testnet => MAGIC_TEST_EXTENDED,
        };
        // bit 0 of the second group is the version, always 0
        let groups: [u32; EXTENDED_DATA_LEN] = [
            u32::from(magic),
            (height & 0xF) << 1,
            (height >> 4) & 0x1F,
            (height >> 9) & 0x1F,
            (height >> 14) & 0x1F,
            (height >> 19) & 0x1F,
            position & 0x1F,
            (position >> 5) & 0x1F,
            (position >> 10) & 0x1F,
            output & 0x1F,
            (output >> 5) & 0x1F,
            (output >> 10) & 0x1F,
        ];
        let data = groups
            .iter()
            .map(|group| u5::try_from_u8(*group as u8))
            .collect::<std::result::Result<Vec<u5>, _>>()
            .map_err(|e| MdipError::InvalidReference(e.to_string()))?;

        let hrp = Self::hrp(self.network);
        let encoded = bech32::encode(hrp, data, Variant::Bech32)
            .map_err(|e| MdipError::InvalidReference(e.to_string()))?;
        let body: Vec<char> = encoded[hrp.len() + 1..].chars().collect();

        Ok(body
            .chunks(4)
            .map(|chunk| chunk.iter().collect::<String>())
            .collect::<Vec<_>>()
            .join("-"))
    }

    /// Decodes a hyphenated reference for `network`.
    ///
    /// Accepts the extended form and the short form (output index 0).
    ///
    /// # Errors
    /// `InvalidReference` on checksum mismatch, a reference minted for the other
    /// network, an unknown magic or a non-zero version.
    pub fn decode(reference: &str, network: Network) -> Result<Self> {
        let compact: String = reference.chars().filter(|c| *c != '-').collect();
        let hrp = Self::hrp(network);
        let (decoded_hrp, data, variant) = bech32::decode(&format!("{}1{}", hrp, compact))
            .map_err(|e| MdipError::InvalidReference(format!("{}: {}", reference, e)))?;
        if decoded_hrp != hrp || variant != Variant::Bech32 {
            return Err(MdipError::InvalidReference(format!("{} is not a {} txref", reference, hrp)));
        }

        let values: Vec<u32> = data.iter().map(|v| u32::from(v.to_u8())).collect();
        let (short_magic, extended_magic) = match network {
            Network::Mainnet => (MAGIC_MAIN, MAGIC_MAIN_EXTENDED),
            Network::Testnet => (MAGIC_TEST, MAGIC_TEST_EXTENDED),
        };
        let extended = match (values.len(), values.first().copied()) {
            (SHORT_DATA_LEN, Some(magic)) if magic == u32::from(short_magic) => false,
            (EXTENDED_DATA_LEN, Some(magic)) if magic == u32::from(extended_magic) => true,
            _ => {
                return Err(MdipError::InvalidReference(format!(
                    "{} has an unexpected magic or length for {:?}",
                    reference, network
                )))
            }
        };
        if values[1] & 1 != 0 {
            return Err(MdipError::InvalidReference(format!("{} has an unknown version", reference)));
        }

        let block_height =
            (values[1] >> 1) | (values[2] << 4) | (values[3] << 9) | (values[4] << 14) | (values[5] << 19);
        let tx_index = values[6] | (values[7] << 5) | (values[8] << 10);
        let output_index = if extended {
            values[9] | (values[10] << 5) | (values[11] << 10)
        } else {
            0
        };

        Ok(TxRef {
            network,
            block_height,
            tx_index: tx_index as u16,
            output_index: output_index as u16,
        })
    }
}

/// Resolves a txref to the output it designates: height → block hash → the
/// transaction at the referenced position.
///
/// # Errors
/// `NotFound` when the block has no transaction at that position, or the
/// transaction has no spendable output at the referenced index.
pub async fn locate(ledger: &dyn Ledger, txref: &TxRef) -> Result<OutPointRef> {
    let block_hash = ledger.get_block_hash(txref.block_height).await?;
    let block = ledger.get_block(&block_hash).await?;
    let tx = block
        .transactions
        .get(usize::from(txref.tx_index))
        .ok_or_else(|| {
            MdipError::NotFound(format!(
                "no transaction at position {} of block {}",
                txref.tx_index, txref.block_height
            ))
        })?;
    let vout = u32::from(txref.output_index);
    let spendable = tx
        .outputs
        .iter()
        .any(|output| output.n == vout && !matches!(output.kind, OutputKind::NullData(_)));
    if !spendable {
        return Err(MdipError::NotFound(format!("{} has no spendable output {}", tx.txid, vout)));
    }
    debug!("txref {}/{} located at {}", txref.block_height, txref.tx_index, tx.txid);
    Ok(OutPointRef::new(tx.txid.clone(), vout))
}

/// Computes the txref of a confirmed output.
pub async fn txref_for(ledger: &dyn Ledger, outpoint: &OutPointRef, network: Network) -> Result<TxRef> {
    let tx = ledger.get_raw_transaction(&outpoint.txid).await?;
    let block_hash = tx
        .block_hash
        .ok_or_else(|| MdipError::NotFound(format!("transaction {} is unconfirmed", outpoint.txid)))?;
    let block = ledger.get_block(&block_hash).await?;
    let position = block
        .transactions
        .iter()
        .position(|candidate| candidate.txid == outpoint.txid)
        .ok_or_else(|| MdipError::NotFound(format!("{} not listed in block {}", outpoint.txid, block_hash)))?;
    let tx_index = u16::try_from(position)
        .map_err(|_| MdipError::InvalidReference(format!("position {} exceeds txref range", position)))?;
    let output_index = u16::try_from(outpoint.vout)
        .map_err(|_| MdipError::InvalidReference(format!("output {} exceeds txref range", outpoint.vout)))?;

    Ok(TxRef::new(network, block.height, tx_index, output_index))
}
