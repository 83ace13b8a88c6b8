// src/services/credential_issuer.rs
//! Credential engine.
//!
//! Issues verifiable credentials and presentations signed with the controlling
//! key of a DID, and checks DID control for the document-store update path.
//!
//! Proofs are computed over the canonical JSON of the object without its proof
//! (see [`crate::utils::serialization::canonical_json`]) and use the native
//! message signature of the signer's chain.

use crate::error::{MdipError, Result};
use crate::identifier;
use crate::models::credential::{
    CredentialIssuerInfo, CredentialSubject, Proof, VerifiableCredential, VerifiablePresentation,
    CREDENTIALS_CONTEXT, PROOF_TYPE,
};
use crate::models::did::{ChainTag, DIDDocument, Network, PublicKeyMaterial};
use crate::services::signer;
use crate::storage::DocumentStore;
use crate::utils::serialization::canonical_json;
use crate::wallet::key_management::{address_from_public_key, address_network, verify_bitcoin_message};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use log::{info, warn};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Fixed validity window of an issued credential.
pub const CREDENTIAL_VALIDITY_DAYS: i64 = 180;

/// Claim types accepted when none are configured.
pub const DEFAULT_CREDENTIAL_TYPES: [&str; 3] = ["ageOver18", "ageOver21", "isPlatformXUser"];

/// Who signs, and with which key.
///
/// The signing chain is the chain of `did`: `btc`/`omni` expect a WIF key for
/// `network`, `eth` and `mongodb` a hex key.
#[derive(Clone)]
pub struct SigningContext {
    pub did: String,
    /// Display name of the signer, carried in the credential's issuer block
    pub name: String,
    pub private_key: String,
    pub network: Network,
    /// Mixed into the signature nonce when present
    pub extra_entropy: Option<[u8; 32]>,
}

impl SigningContext {
    fn sign(&self, payload: &str) -> Result<String> {
        let chain = identifier::parse(&self.did)?.chain;
        signer::sign_message(
            payload,
            &self.private_key,
            chain,
            self.network,
            self.extra_entropy.as_ref(),
        )
    }

    fn proof(&self, payload: &str, purpose: &str, fragment: &str, now: DateTime<Utc>) -> Result<Proof> {
        Ok(Proof {
            proof_type: PROOF_TYPE.to_string(),
            created: timestamp(now),
            proof_purpose: purpose.to_string(),
            verification_method: format!("{}#{}", self.did, fragment),
            challenge: None,
            domain: None,
            jws: self.sign(payload)?,
        })
    }
}

/// RFC 3339 in UTC with millisecond precision, e.g. `2024-01-01T00:00:00.000Z`.
pub fn timestamp(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Checks that `signature` is a bitcoin signed-message over `did` made by the
/// controlling key of `document`.
///
/// The controlling address is recomputed from the document's first public key: a
/// hex key gives its mainnet P2PKH address, an address is used as is.
///
/// # Errors
/// `ControlVerificationFailed` on any mismatch or undecodable input.
pub fn check_control(document: &DIDDocument, did: &str, claimed: Option<&str>, signature: &str) -> Result<()> {
    let reject = |reason: String| {
        warn!("control check for {} rejected: {}", did, reason);
        MdipError::ControlVerificationFailed(reason)
    };

    let (address, network) = match document.controller_key() {
        Some(PublicKeyMaterial::PublicKeyHex(public_key)) => (
            address_from_public_key(public_key, Network::Mainnet).map_err(|e| reject(e.to_string()))?,
            Network::Mainnet,
        ),
        Some(PublicKeyMaterial::PublicKeyBase58(address)) => (
            address.clone(),
            address_network(address).map_err(|e| reject(e.to_string()))?,
        ),
        None => return Err(reject("document has no public key".into())),
    };
    if let Some(claimed) = claimed {
        if claimed != address {
            return Err(reject(format!("{} is not the controlling address", claimed)));
        }
    }
    match verify_bitcoin_message(did, signature, &address, network) {
        Ok(true) => Ok(()),
        Ok(false) => Err(reject("signature was made by another key".into())),
        Err(e) => Err(reject(e.to_string())),
    }
}

/// Issues credentials and presentations, and answers control checks.
#[derive(Clone)]
pub struct CredentialEngine {
    documents: Arc<dyn DocumentStore>,
    credential_types: Vec<String>,
}

impl CredentialEngine {
    /// # Arguments
    /// * `documents` - Store holding document-store DIDs, consulted by control checks
    /// * `credential_types` - Allow-list of claim types that may be issued
    pub fn new(documents: Arc<dyn DocumentStore>, credential_types: Vec<String>) -> Self {
        CredentialEngine {
            documents,
            credential_types,
        }
    }

    pub fn credential_types(&self) -> &[String] {
        &self.credential_types
    }

    /// Issues a credential asserting `claim_type = value` about `subject`.
    ///
    /// # Arguments
    /// * `issuer` - Signing context of the attestor
    /// * `subject` - DID the claim is about
    /// * `claim_type` - Must be in the allow-list
    /// * `value` - Boolean claim value
    ///
    /// # Returns
    /// The signed credential, valid for [`CREDENTIAL_VALIDITY_DAYS`] from now.
    ///
    /// # Errors
    /// - `UnsupportedClaimType` for claim types outside the allow-list
    /// - `MalformedIdentifier` when either DID does not parse
    /// - `InvalidKey` when the key does not fit the issuer's chain
    pub fn issue_credential(
        &self,
        issuer: &SigningContext,
        subject: &str,
        claim_type: &str,
        value: bool,
    ) -> Result<VerifiableCredential> {
        if !self.credential_types.iter().any(|allowed| allowed == claim_type) {
            return Err(MdipError::UnsupportedClaimType(claim_type.to_string()));
        }
        identifier::parse(&issuer.did)?;
        identifier::parse(subject)?;

        let now = Utc::now();
        let mut claims = BTreeMap::new();
        claims.insert(claim_type.to_string(), Value::Bool(value));
        let mut credential = VerifiableCredential {
            context: vec![CREDENTIALS_CONTEXT.to_string()],
            id: issuer.did.clone(),
            types: vec!["VerifiableCredential".to_string(), claim_type.to_string()],
            issuer: CredentialIssuerInfo {
                id: issuer.did.clone(),
                name: issuer.name.clone(),
            },
            issuance_date: timestamp(now),
            expiration_date: timestamp(now + Duration::days(CREDENTIAL_VALIDITY_DAYS)),
            credential_subject: CredentialSubject {
                id: subject.to_string(),
                claims,
            },
            proof: None,
        };

        let payload = canonical_json(&credential)?;
        credential.proof = Some(issuer.proof(&payload, "assertionMethod", "vc-pubkey", now)?);
        info!("issued {} credential for {}", claim_type, subject);
        Ok(credential)
    }

    /// Wraps `credentials` into a presentation signed by `holder`.
    ///
    /// `challenge` and `domain` are signed together with the presentation and
    /// carried in the proof, binding it to one verifier request.
    pub fn create_presentation(
        &self,
        credentials: Vec<VerifiableCredential>,
        holder: &SigningContext,
        challenge: &str,
        domain: &str,
    ) -> Result<VerifiablePresentation> {
        let mut presentation = VerifiablePresentation {
            context: vec![CREDENTIALS_CONTEXT.to_string()],
            presentation_type: "VerifiablePresentation".to_string(),
            verifiable_credential: credentials,
            proof: None,
        };
        let payload = presentation.signing_payload(challenge, domain)?;
        let mut proof = holder.proof(&payload, "authentication", "auth", Utc::now())?;
        proof.challenge = Some(challenge.to_string());
        proof.domain = Some(domain.to_string());
        presentation.proof = Some(proof);
        Ok(presentation)
    }

    /// Checks that `signature` over `did` was made by the key currently
    /// controlling the document-store DID `did`.
    ///
    /// # Errors
    /// `ControlVerificationFailed` on any mismatch, `NotFound` for unknown records,
    /// `UnsupportedOperation` for DIDs of other chains.
    pub async fn verify_control(&self, did: &str, claimed: Option<&str>, signature: &str) -> Result<()> {
        let identifier = identifier::parse(did)?;
        if identifier.chain != ChainTag::MongoDb {
            return Err(MdipError::UnsupportedOperation(format!(
                "control of {} is proven on its ledger",
                did
            )));
        }
        let record = self
            .documents
            .get(&identifier.reference)
            .await?
            .ok_or_else(|| MdipError::NotFound(did.to_string()))?;
        check_control(&record.document, did, claimed, signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::document_store::InMemoryDocumentStore;
    use crate::wallet::key_management::KeyManager;
    use ethers_core::utils::hex;

    const ISSUER: &str = "did:mdip:mongodb-0a0b0c0d0e0f000102030405";
    const SUBJECT: &str = "did:mdip:eth-0x1111";

    fn engine() -> (CredentialEngine, Arc<InMemoryDocumentStore>) {
        let store = Arc::new(InMemoryDocumentStore::new());
        let types = DEFAULT_CREDENTIAL_TYPES.iter().map(|t| t.to_string()).collect();
        (CredentialEngine::new(store.clone(), types), store)
    }

    fn context(key: &KeyManager) -> SigningContext {
        SigningContext {
            did: ISSUER.into(),
            name: "Attestor".into(),
            private_key: hex::encode(key.secret_key().secret_bytes()),
            network: Network::Testnet,
            extra_entropy: None,
        }
    }

    #[test]
    fn test_credential_valid_for_180_days() {
        let (engine, _) = engine();
        let key = KeyManager::generate();
        let credential = engine.issue_credential(&context(&key), SUBJECT, "ageOver18", true).unwrap();

        let issued = DateTime::parse_from_rfc3339(&credential.issuance_date).unwrap();
        let expires = DateTime::parse_from_rfc3339(&credential.expiration_date).unwrap();
        assert_eq!(expires - issued, Duration::days(180));
        assert!(credential.issuance_date.ends_with('Z'));
        assert_eq!(credential.claim_type(), Some("ageOver18"));
        assert_eq!(credential.credential_subject.claims["ageOver18"], Value::Bool(true));
    }

    #[test]
    fn test_credential_proof_signs_canonical_form() {
        let (engine, _) = engine();
        let key = KeyManager::generate();
        let credential = engine.issue_credential(&context(&key), SUBJECT, "ageOver21", false).unwrap();
        let proof = credential.proof.as_ref().unwrap();

        assert_eq!(proof.proof_purpose, "assertionMethod");
        assert_eq!(proof.verification_method, format!("{}#vc-pubkey", ISSUER));
        let payload = canonical_json(&credential.unsigned()).unwrap();
        let address = key.p2pkh_address(Network::Mainnet).to_string();
        assert!(verify_bitcoin_message(&payload, &proof.jws, &address, Network::Mainnet).unwrap());
    }

    #[test]
    fn test_claim_type_allow_list() {
        let (engine, _) = engine();
        let key = KeyManager::generate();
        assert!(matches!(
            engine.issue_credential(&context(&key), SUBJECT, "isAdmin", true),
            Err(MdipError::UnsupportedClaimType(_))
        ));
        assert!(matches!(
            engine.issue_credential(&context(&key), "did:example:123", "ageOver18", true),
            Err(MdipError::MalformedIdentifier(_))
        ));
    }

    #[test]
    fn test_presentation_carries_challenge_and_domain() {
        let (engine, _) = engine();
        let key = KeyManager::generate();
        let credential = engine.issue_credential(&context(&key), SUBJECT, "ageOver18", true).unwrap();

        let presentation = engine
            .create_presentation(vec![credential.clone()], &context(&key), "nonce-42", "verifier.example")
            .unwrap();
        let proof = presentation.proof.as_ref().unwrap();
        assert_eq!(proof.proof_purpose, "authentication");
        assert_eq!(proof.challenge.as_deref(), Some("nonce-42"));
        assert_eq!(proof.domain.as_deref(), Some("verifier.example"));
        assert_eq!(presentation.verifiable_credential, vec![credential]);
    }

    #[test]
    fn test_extra_entropy_still_verifies() {
        let (engine, _) = engine();
        let key = KeyManager::generate();
        let mut ctx = context(&key);
        ctx.extra_entropy = Some([7u8; 32]);

        let credential = engine.issue_credential(&ctx, SUBJECT, "isPlatformXUser", true).unwrap();
        let payload = canonical_json(&credential.unsigned()).unwrap();
        let address = key.p2pkh_address(Network::Mainnet).to_string();
        assert!(verify_bitcoin_message(&payload, &credential.proof.unwrap().jws, &address, Network::Mainnet).unwrap());
    }

    #[tokio::test]
    async fn test_verify_control_against_stored_key() {
        let (engine, store) = engine();
        let key = KeyManager::generate();
        let did = "did:mdip:mongodb-aabbccddeeff001122334455";
        store
            .insert("aabbccddeeff001122334455", DIDDocument::initial_record(did, &key.public_key_hex()))
            .await
            .unwrap();
        let signature = key.sign_bitcoin_message(did, None);
        let address = key.p2pkh_address(Network::Mainnet).to_string();

        engine.verify_control(did, None, &signature).await.unwrap();
        engine.verify_control(did, Some(&address), &signature).await.unwrap();

        let testnet = key.p2pkh_address(Network::Testnet).to_string();
        assert!(matches!(
            engine.verify_control(did, Some(&testnet), &signature).await,
            Err(MdipError::ControlVerificationFailed(_))
        ));
        let forged = KeyManager::generate().sign_bitcoin_message(did, None);
        assert!(matches!(
            engine.verify_control(did, None, &forged).await,
            Err(MdipError::ControlVerificationFailed(_))
        ));
        assert!(matches!(
            engine.verify_control(did, None, "not base64!").await,
            Err(MdipError::ControlVerificationFailed(_))
        ));
    }

    #[test]
    fn test_check_control_with_address_document() {
        let key = KeyManager::generate();
        let did = "did:mdip:btc-xyz";
        let address = key.p2pkh_address(Network::Testnet).to_string();
        let document = DIDDocument::default_capability(did, &address);

        assert!(check_control(&document, did, None, &key.sign_bitcoin_message(did, None)).is_ok());
        assert!(check_control(&document, did, None, &key.sign_bitcoin_message("other", None)).is_err());
    }
}
