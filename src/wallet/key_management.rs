// src/wallet/key_management.rs
//! Transient key handling for the signer and the credential engine.
//!
//! Keys are never stored. A [`KeyManager`] is built from the caller's WIF or hex
//! private key for the duration of one signing call and erases its secret when
//! dropped.
//!
//! Uses the following cryptographic primitives:
//! - secp256k1 ECDSA (via the `bitcoin` crate's `secp256k1` re-export, and `k256`
//!   for the Ethereum wallet)
//! - Bitcoin signed-message and EIP-191 personal-sign envelopes (see
//!   [`crate::utils::crypto`])

use crate::error::{MdipError, Result};
use crate::models::did::Network;
use crate::utils::crypto::{bitcoin_message_digest, bitcoin_message_hash, ethereum_message_hash};
use bitcoin::secp256k1::{All, Message, Secp256k1, SecretKey, VerifyOnly};
use bitcoin::sign_message::MessageSignature;
use bitcoin::{Address, NetworkKind, PrivateKey, PublicKey};
use ethers::signers::{LocalWallet, Signer};
use ethers_core::types::{Address as EthAddress, Signature as EthSignature};
use ethers_core::utils::hex;
use k256::ecdsa::SigningKey;
use once_cell::sync::Lazy;
use std::str::FromStr;

static VERIFIER: Lazy<Secp256k1<VerifyOnly>> = Lazy::new(Secp256k1::verification_only);

/// Secp256k1 key material held for a single operation.
///
/// # Security Notes
/// - The secret is never exposed and is erased on drop
/// - Signatures are deterministic (RFC 6979) unless extra entropy is supplied
pub struct KeyManager {
    secret_key: SecretKey,
    /// Whether addresses and message signatures use the compressed public key
    compressed: bool,
    secp: Secp256k1<All>,
}

impl KeyManager {
    /// Parses a WIF private key and checks that it belongs to `network`.
    ///
    /// # Errors
    /// `InvalidKey` for malformed WIF or a key minted for the other network.
    pub fn from_wif(wif: &str, network: Network) -> Result<Self> {
        let private_key = PrivateKey::from_wif(wif).map_err(|e| MdipError::InvalidKey(e.to_string()))?;
        let expected = NetworkKind::from(network.to_bitcoin());
        if private_key.network != expected {
            return Err(MdipError::InvalidKey(format!(
                "WIF key is not a {:?} key",
                network
            )));
        }
        Ok(KeyManager {
            secret_key: private_key.inner,
            compressed: private_key.compressed,
            secp: Secp256k1::new(),
        })
    }

    /// Parses a 32-byte hex private key, with or without `0x`. The key is used in
    /// compressed form.
    pub fn from_hex(private_key: &str) -> Result<Self> {
        let bytes = hex::decode(private_key.trim_start_matches("0x"))
            .map_err(|e| MdipError::InvalidKey(e.to_string()))?;
        let secret_key = SecretKey::from_slice(&bytes).map_err(|e| MdipError::InvalidKey(e.to_string()))?;
        Ok(KeyManager {
            secret_key,
            compressed: true,
            secp: Secp256k1::new(),
        })
    }

    /// Generates a fresh random key.
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let (secret_key, _) = secp.generate_keypair(&mut rand::thread_rng());
        KeyManager {
            secret_key,
            compressed: true,
            secp,
        }
    }

    pub fn public_key(&self) -> PublicKey {
        let inner = self.secret_key.public_key(&self.secp);
        if self.compressed {
            PublicKey::new(inner)
        } else {
            PublicKey::new_uncompressed(inner)
        }
    }

    /// Public key in hex, compressed unless the key was imported uncompressed.
    pub fn public_key_hex(&self) -> String {
        self.public_key().to_string()
    }

    /// Legacy pay-to-pubkey-hash address of the key.
    pub fn p2pkh_address(&self, network: Network) -> Address {
        Address::p2pkh(self.public_key().pubkey_hash(), network.to_bitcoin())
    }

    /// WIF encoding of the key for `network`.
    pub fn to_wif(&self, network: Network) -> String {
        let private_key = if self.compressed {
            PrivateKey::new(self.secret_key, network.to_bitcoin())
        } else {
            PrivateKey::new_uncompressed(self.secret_key, network.to_bitcoin())
        };
        private_key.to_wif()
    }

    pub(crate) fn secret_key(&self) -> &SecretKey {
        &self.secret_key
    }

    pub(crate) fn secp(&self) -> &Secp256k1<All> {
        &self.secp
    }

    /// Signs `message` as a bitcoin signed-message.
    ///
    /// # Arguments
    /// * `message` - Payload, signed exactly as given
    /// * `extra_entropy` - Optional 32 bytes mixed into the RFC 6979 nonce
    ///
    /// # Returns
    /// Base64 of the 65-byte recoverable signature (header byte, R, S)
    pub fn sign_bitcoin_message(&self, message: &str, extra_entropy: Option<&[u8; 32]>) -> String {
        let digest = Message::from_digest(bitcoin_message_digest(message));
        let signature = match extra_entropy {
            Some(entropy) => self
                .secp
                .sign_ecdsa_recoverable_with_noncedata(&digest, &self.secret_key, entropy),
            None => self.secp.sign_ecdsa_recoverable(&digest, &self.secret_key),
        };
        base64::encode(MessageSignature::new(signature, self.compressed).serialize())
    }

    /// Builds the transient Ethereum wallet of this key.
    pub fn ethereum_wallet(&self, chain_id: u64) -> Result<LocalWallet> {
        let signing_key = SigningKey::from_slice(&self.secret_key.secret_bytes())
            .map_err(|e| MdipError::InvalidKey(e.to_string()))?;
        Ok(LocalWallet::from(signing_key).with_chain_id(chain_id))
    }

    /// Signs `message` with EIP-191 personal-sign and returns the `0x` hex signature.
    pub fn sign_ethereum_message(&self, message: &[u8]) -> Result<String> {
        let wallet = self.ethereum_wallet(1)?;
        let signature = wallet
            .sign_hash(ethereum_message_hash(message))
            .map_err(|e| MdipError::InvalidKey(e.to_string()))?;
        Ok(format!("0x{}", hex::encode(signature.to_vec())))
    }
}

impl Drop for KeyManager {
    fn drop(&mut self) {
        self.secret_key.non_secure_erase();
    }
}

/// Parses `address` and checks it is valid on `network`.
pub fn parse_address(address: &str, network: Network) -> Result<Address> {
    Address::from_str(address)
        .map_err(|e| MdipError::InvalidAddress(format!("{}: {}", address, e)))?
        .require_network(network.to_bitcoin())
        .map_err(|e| MdipError::InvalidAddress(format!("{}: {}", address, e)))
}

/// Network an address was encoded for.
///
/// # Errors
/// `InvalidAddress` when the address is not valid on either network.
pub fn address_network(address: &str) -> Result<Network> {
    let unchecked = Address::from_str(address).map_err(|e| MdipError::InvalidAddress(format!("{}: {}", address, e)))?;
    if unchecked.is_valid_for_network(bitcoin::Network::Bitcoin) {
        Ok(Network::Mainnet)
    } else if unchecked.is_valid_for_network(bitcoin::Network::Testnet) {
        Ok(Network::Testnet)
    } else {
        Err(MdipError::InvalidAddress(format!("{} belongs to no supported network", address)))
    }
}

/// Legacy P2PKH address of a hex-encoded public key.
pub fn address_from_public_key(public_key_hex: &str, network: Network) -> Result<String> {
    let public_key = PublicKey::from_str(public_key_hex).map_err(|e| MdipError::InvalidKey(e.to_string()))?;
    Ok(Address::p2pkh(public_key.pubkey_hash(), network.to_bitcoin()).to_string())
}

/// Checks a base64 bitcoin signed-message signature against `address`.
///
/// # Returns
/// - `Ok(true)` if the key recovered from the signature controls `address`
/// - `Ok(false)` if it recovers to another key
///
/// # Errors
/// `InvalidAddress` for an unparsable address, `SignatureValidationFailed` for an
/// undecodable signature.
pub fn verify_bitcoin_message(message: &str, signature: &str, address: &str, network: Network) -> Result<bool> {
    let address = parse_address(address, network)?;
    let bytes = base64::decode(signature).map_err(|e| MdipError::SignatureValidationFailed(e.to_string()))?;
    let signature =
        MessageSignature::from_slice(&bytes).map_err(|e| MdipError::SignatureValidationFailed(e.to_string()))?;
    signature
        .is_signed_by_address(&*VERIFIER, &address, bitcoin_message_hash(message))
        .map_err(|e| MdipError::SignatureValidationFailed(e.to_string()))
}

/// Recovers the Ethereum address that produced an EIP-191 signature over `message`.
pub fn recover_ethereum_signer(message: &[u8], signature: &str) -> Result<EthAddress> {
    let signature =
        EthSignature::from_str(signature).map_err(|e| MdipError::SignatureValidationFailed(e.to_string()))?;
    signature
        .recover(message.to_vec())
        .map_err(|e| MdipError::SignatureValidationFailed(e.to_string()))
}
