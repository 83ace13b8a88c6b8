// src/utils/crypto.rs
//! Message digests of the two signature families used by mdip.
//!
//! - Bitcoin signed-message: double SHA-256 over the `"Bitcoin Signed Message:\n"`
//!   envelope, used by `btc`, `omni` and `mongodb` DIDs
//! - EIP-191 personal-sign: Keccak-256 over the `"\x19Ethereum Signed Message:\n"`
//!   envelope, used by `eth` DIDs

use bitcoin::hashes::{sha256d, Hash};
use ethers_core::types::H256;
use ethers_core::utils::hash_message;

/// Digest a bitcoin signed-message signature commits to.
pub fn bitcoin_message_hash(message: &str) -> sha256d::Hash {
    bitcoin::sign_message::signed_msg_hash(message)
}

/// Same digest, as the 32 bytes a secp256k1 message is built from.
pub fn bitcoin_message_digest(message: &str) -> [u8; 32] {
    bitcoin_message_hash(message).to_byte_array()
}

/// Digest an EIP-191 personal-sign signature commits to.
pub fn ethereum_message_hash(message: &[u8]) -> H256 {
    hash_message(message)
}
