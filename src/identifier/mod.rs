// src/identifier/mod.rs
//! Identifier codec for `did:mdip` strings.
//!
//! A DID is `did:mdip:<chain>-<reference>`. The reference is chain-native: a
//! hyphenated BIP-136 txref for `btc`/`omni` (see [`txref`]), the registry event id
//! for `eth` and the record id for `mongodb`.

pub mod txref;

use crate::error::{MdipError, Result};
use crate::models::did::{ChainTag, Identifier, DID_METHOD};
use ethers_core::abi::{decode, ParamType, Token};
use ethers_core::utils::hex;

/// Parses a `did:mdip` string into its chain tag and reference.
///
/// # Errors
/// `MalformedIdentifier` when the prefix, the chain tag or the reference is invalid.
/// The reference's checksum is not verified here; see [`txref::TxRef::decode`].
pub fn parse(did: &str) -> Result<Identifier> {
    let rest = did
        .strip_prefix("did:")
        .and_then(|rest| rest.strip_prefix(DID_METHOD))
        .and_then(|rest| rest.strip_prefix(':'))
        .ok_or_else(|| MdipError::MalformedIdentifier(format!("'{}' is not a did:{} DID", did, DID_METHOD)))?;

    let (tag, reference) = rest
        .split_once('-')
        .ok_or_else(|| MdipError::MalformedIdentifier(format!("'{}' lacks a chain reference", did)))?;
    let chain: ChainTag = tag.parse()?;

    if reference.is_empty() {
        return Err(MdipError::MalformedIdentifier(format!("'{}' has an empty reference", did)));
    }
    let valid = match chain {
        ChainTag::Btc | ChainTag::Omni => reference
            .chars()
            .all(|c| c == '-' || txref::BECH32_CHARSET.contains(c)),
        ChainTag::Eth => reference
            .strip_prefix("0x")
            .map(|id| !id.is_empty() && id.chars().all(|c| c.is_ascii_hexdigit()))
            .unwrap_or(false),
        ChainTag::MongoDb => reference.chars().all(|c| c.is_ascii_alphanumeric()),
    };
    if !valid {
        return Err(MdipError::MalformedIdentifier(format!(
            "'{}' is not a valid {} reference",
            reference, chain
        )));
    }

    Ok(Identifier::new(chain, reference))
}

/// Mints the identifier of an account-chain DID from the data of the registry's
/// creation event, `(bytes32 id, bytes32 metadata)`.
pub fn mint_account_did(log_data: &[u8]) -> Result<Identifier> {
    let tokens = decode(&[ParamType::FixedBytes(32), ParamType::FixedBytes(32)], log_data)
        .map_err(|e| MdipError::InvalidReference(format!("undecodable creation event: {}", e)))?;
    match tokens.first() {
        Some(Token::FixedBytes(id)) => Ok(Identifier::new(
            ChainTag::Eth,
            format!("0x{}", hex::encode(id)),
        )),
        _ => Err(MdipError::InvalidReference("creation event lacks an id".into())),
    }
}

/// Identifier of a document-store DID.
pub fn mint_record_did(record_id: &str) -> Identifier {
    Identifier::new(ChainTag::MongoDb, record_id)
}
