// src/services/verifier.rs
//! Credential and presentation verification.
//!
//! Recomputes the canonical form of the unsigned object and checks its proof
//! against the address expected to have signed it: a bitcoin address (either
//! network) for bitcoin signed-messages, a `0x` address for EIP-191 signatures.

use crate::error::{MdipError, Result};
use crate::models::credential::{Proof, VerifiableCredential, VerifiablePresentation};
use crate::utils::serialization::canonical_json;
use crate::wallet::key_management::{address_network, recover_ethereum_signer, verify_bitcoin_message};
use chrono::{DateTime, Utc};
use ethers_core::types::Address as EthAddress;
use log::debug;
use std::str::FromStr;

/// Checks a detached proof over `payload`.
///
/// # Arguments
/// * `payload` - Canonical JSON the proof was computed over
/// * `proof` - The proof to check
/// * `signer_address` - Bitcoin or Ethereum address expected to have signed
///
/// # Returns
/// - `Ok(true)` if the proof was made by `signer_address`
/// - `Ok(false)` if it was made by another key
///
/// # Errors
/// `InvalidAddress` for an unparsable address, `SignatureValidationFailed` for an
/// undecodable signature.
fn verify_proof(payload: &str, proof: &Proof, signer_address: &str) -> Result<bool> {
    if signer_address.starts_with("0x") {
        let expected = EthAddress::from_str(signer_address)
            .map_err(|e| MdipError::InvalidAddress(format!("{}: {}", signer_address, e)))?;
        let recovered = recover_ethereum_signer(payload.as_bytes(), &proof.jws)?;
        return Ok(recovered == expected);
    }
    let network = address_network(signer_address)?;
    verify_bitcoin_message(payload, &proof.jws, signer_address, network)
}

/// Verifies a credential's proof and validity window.
///
/// # Returns
/// - `Ok(true)` if the proof was made by `signer_address` and the credential has
///   not expired
/// - `Ok(false)` otherwise
///
/// # Errors
/// `SchemaViolation` when the proof is missing or the dates are unparsable.
pub fn verify_credential(credential: &VerifiableCredential, signer_address: &str) -> Result<bool> {
    let proof = credential
        .proof
        .as_ref()
        .ok_or_else(|| MdipError::SchemaViolation("credential carries no proof".into()))?;
    let expiration = DateTime::parse_from_rfc3339(&credential.expiration_date)
        .map_err(|e| MdipError::SchemaViolation(format!("expirationDate: {}", e)))?;
    if expiration.with_timezone(&Utc) < Utc::now() {
        debug!("credential {} expired at {}", credential.id, credential.expiration_date);
        return Ok(false);
    }
    let payload = canonical_json(&credential.unsigned())?;
    verify_proof(&payload, proof, signer_address)
}

/// Verifies a presentation's proof and its binding to `challenge` and `domain`.
///
/// The signature must cover `challenge` and `domain`; a proof whose fields were
/// rewritten after signing does not verify.
///
/// The enclosed credentials are not checked; their signers are generally not the
/// holder. Use [`verify_credential`] on each.
pub fn verify_presentation(
    presentation: &VerifiablePresentation,
    signer_address: &str,
    challenge: &str,
    domain: &str,
) -> Result<bool> {
    let proof = presentation
        .proof
        .as_ref()
        .ok_or_else(|| MdipError::SchemaViolation("presentation carries no proof".into()))?;
    if proof.challenge.as_deref() != Some(challenge) || proof.domain.as_deref() != Some(domain) {
        debug!("presentation bound to another challenge or domain");
        return Ok(false);
    }
    let payload = presentation.signing_payload(challenge, domain)?;
    verify_proof(&payload, proof, signer_address)
}
