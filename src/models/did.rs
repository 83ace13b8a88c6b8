// src/models/did.rs
//! Decentralized Identifier (DID) data model implementation.
//!
//! Defines the `did:mdip` identifier, the ledgers it can be anchored on and the
//! DID Document shape following the
//! [DID Core Specification](https://www.w3.org/TR/did-core/).

use crate::error::{MdipError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Method name of every identifier produced by this crate.
pub const DID_METHOD: &str = "mdip";

/// JSON-LD context of DID documents.
pub const DID_CONTEXT: &str = "https://www.w3.org/ns/did/v1";

/// Key type advertised for every secp256k1 verification key.
pub const SECP256K1_KEY_TYPE: &str = "EcdsaSecp256k1VerificationKey2019";

/// Ledger an identifier is anchored on.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ChainTag {
    /// Bitcoin, UTXO model
    Btc,
    /// Omni layer, an overlay protocol on the Bitcoin ledger
    Omni,
    /// Ethereum registry contract, account model
    Eth,
    /// Private document store
    #[serde(rename = "mongodb")]
    MongoDb,
}

impl ChainTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainTag::Btc => "btc",
            ChainTag::Omni => "omni",
            ChainTag::Eth => "eth",
            ChainTag::MongoDb => "mongodb",
        }
    }

    /// Whether the chain is walked output by output (Bitcoin and its overlay).
    pub fn is_utxo(&self) -> bool {
        matches!(self, ChainTag::Btc | ChainTag::Omni)
    }
}

impl fmt::Display for ChainTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChainTag {
    type Err = MdipError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "btc" => Ok(ChainTag::Btc),
            "omni" => Ok(ChainTag::Omni),
            "eth" => Ok(ChainTag::Eth),
            "mongodb" => Ok(ChainTag::MongoDb),
            other => Err(MdipError::MalformedIdentifier(format!(
                "unknown chain tag '{}'",
                other
            ))),
        }
    }
}

/// Network a UTXO identifier lives on. Selects the txref prefix, the WIF and address
/// encodings and the node set.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    #[default]
    Testnet,
}

impl Network {
    pub fn to_bitcoin(self) -> bitcoin::Network {
        match self {
            Network::Mainnet => bitcoin::Network::Bitcoin,
            Network::Testnet => bitcoin::Network::Testnet,
        }
    }
}

impl FromStr for Network {
    type Err = MdipError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mainnet" => Ok(Network::Mainnet),
            "testnet" => Ok(Network::Testnet),
            other => Err(MdipError::UnsupportedOperation(format!(
                "unknown network '{}'",
                other
            ))),
        }
    }
}

/// A parsed `did:mdip` identifier.
///
/// The identifier never changes once minted; updates only move the document it
/// points to. `reference` is chain-native:
/// - `btc`/`omni`: BIP-136 transaction reference without its human-readable prefix
/// - `eth`: hex id emitted by the registry contract
/// - `mongodb`: record id in the document store
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier {
    pub chain: ChainTag,
    pub reference: String,
}

impl Identifier {
    pub fn new(chain: ChainTag, reference: impl Into<String>) -> Self {
        Identifier {
            chain,
            reference: reference.into(),
        }
    }

    /// Parses a DID string. See [`crate::identifier::parse`].
    pub fn parse(did: &str) -> Result<Self> {
        crate::identifier::parse(did)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "did:{}:{}-{}", DID_METHOD, self.chain, self.reference)
    }
}

impl FromStr for Identifier {
    type Err = MdipError;

    fn from_str(s: &str) -> Result<Self> {
        crate::identifier::parse(s)
    }
}

/// Key material of a verification method.
///
/// UTXO-anchored documents carry the controlling address, document-store
/// documents carry the compressed public key in hex.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PublicKeyMaterial {
    PublicKeyBase58(String),
    PublicKeyHex(String),
}

impl PublicKeyMaterial {
    pub fn value(&self) -> &str {
        match self {
            PublicKeyMaterial::PublicKeyBase58(v) | PublicKeyMaterial::PublicKeyHex(v) => v,
        }
    }
}

/// One entry of a DID document's `publicKey` list.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyEntry {
    pub id: String,
    pub controller: String,
    #[serde(rename = "type")]
    pub key_type: String,
    #[serde(flatten)]
    pub material: PublicKeyMaterial,
}

/// A DID Document describing the keys that control a `did:mdip` identifier.
///
/// # Fields
/// - `context`: JSON-LD context (`@context`)
/// - `id`: the DID the document describes
/// - `public_key`: verification keys
/// - `authentication`: references into `public_key` usable for authentication
/// - `assertion_method`: references into `public_key` usable for credential proofs
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DIDDocument {
    #[serde(rename = "@context", default = "default_context")]
    pub context: Vec<String>,
    pub id: String,
    pub public_key: Vec<PublicKeyEntry>,
    pub authentication: Vec<String>,
    pub assertion_method: Vec<String>,
}

fn default_context() -> Vec<String> {
    vec![DID_CONTEXT.to_string()]
}

impl DIDDocument {
    /// Builds the document implied by an anchor that never published a pointer.
    ///
    /// Both the authentication key and the assertion key are the funding address
    /// of the anchor transaction.
    pub fn default_capability(did: &str, controller_address: &str) -> Self {
        Self::with_material(did, PublicKeyMaterial::PublicKeyBase58(controller_address.to_string()))
    }

    /// Initial document of a document-store DID, keyed on the creator's public key.
    pub fn initial_record(did: &str, public_key_hex: &str) -> Self {
        Self::with_material(did, PublicKeyMaterial::PublicKeyHex(public_key_hex.to_string()))
    }

    fn with_material(did: &str, material: PublicKeyMaterial) -> Self {
        let entry = |fragment: &str| PublicKeyEntry {
            id: format!("{}#{}", did, fragment),
            controller: did.to_string(),
            key_type: SECP256K1_KEY_TYPE.to_string(),
            material: material.clone(),
        };
        DIDDocument {
            context: default_context(),
            id: did.to_string(),
            public_key: vec![entry("auth"), entry("vc-pubkey")],
            authentication: vec!["#auth".to_string()],
            assertion_method: vec!["#vc-pubkey".to_string()],
        }
    }

    /// Key material of the first public key entry, the controlling key.
    pub fn controller_key(&self) -> Option<&PublicKeyMaterial> {
        self.public_key.first().map(|entry| &entry.material)
    }

    /// Replaces the material of every key entry with `public_key_hex`.
    pub fn rotate_controller(&mut self, public_key_hex: &str) {
        for entry in &mut self.public_key {
            entry.material = PublicKeyMaterial::PublicKeyHex(public_key_hex.to_string());
        }
    }

    /// Checks the structural rules a document must satisfy before it may be
    /// referenced from the ledger.
    pub fn validate(&self) -> Result<()> {
        if !self.id.starts_with("did:") {
            return Err(MdipError::SchemaViolation(format!("id '{}' is not a DID", self.id)));
        }
        if self.public_key.is_empty() {
            return Err(MdipError::SchemaViolation("publicKey must not be empty".into()));
        }
        for entry in &self.public_key {
            if entry.id.is_empty() || entry.key_type.is_empty() || entry.material.value().is_empty() {
                return Err(MdipError::SchemaViolation(format!(
                    "publicKey entry '{}' is incomplete",
                    entry.id
                )));
            }
            if !entry.controller.starts_with("did:") {
                return Err(MdipError::SchemaViolation(format!(
                    "controller '{}' is not a DID",
                    entry.controller
                )));
            }
        }
        for reference in self.authentication.iter().chain(&self.assertion_method) {
            if !self.public_key.iter().any(|entry| entry.id.ends_with(reference.as_str())) {
                return Err(MdipError::SchemaViolation(format!(
                    "reference '{}' does not match any publicKey entry",
                    reference
                )));
            }
        }
        Ok(())
    }

    /// Parses and validates a document fetched from a pointer.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let document: DIDDocument = serde_json::from_slice(bytes)
            .map_err(|e| MdipError::SchemaViolation(e.to_string()))?;
        document.validate()?;
        Ok(document)
    }
}
