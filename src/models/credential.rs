// src/models/credential.rs
//! Verifiable Credential data model implementation.
//!
//! Defines W3C-style Verifiable Credentials and Presentations with support for
//! JSON serialization and detached secp256k1 proofs.

use crate::utils::serialization::canonical_json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// JSON-LD context of credentials and presentations.
pub const CREDENTIALS_CONTEXT: &str = "https://www.w3.org/2018/credentials/v1";

/// Proof type attached to every credential and presentation.
pub const PROOF_TYPE: &str = "EcdsaSecp256k1VerificationKey2019";

/// Detached signature over the canonical form of the enclosing object.
///
/// # Fields
/// - `proof_type`: signature suite
/// - `created`: RFC 3339 creation time
/// - `proof_purpose`: `assertionMethod` for credentials, `authentication` for presentations
/// - `verification_method`: reference to the signing key
/// - `challenge` / `domain`: replay binding, presentations only
/// - `jws`: the signature (bitcoin signed-message base64 or EIP-191 hex)
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Proof {
    #[serde(rename = "type")]
    pub proof_type: String,
    pub created: String,
    pub proof_purpose: String,
    pub verification_method: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub challenge: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub domain: Option<String>,
    pub jws: String,
}

/// Issuer of a credential.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CredentialIssuerInfo {
    pub id: String,
    pub name: String,
}

/// Subject of a credential and the claims made about it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CredentialSubject {
    pub id: String,
    #[serde(flatten)]
    pub claims: BTreeMap<String, Value>,
}

/// A Verifiable Credential according to W3C standards.
///
/// Implements the structure of the
/// [W3C Verifiable Credentials Data Model](https://www.w3.org/TR/vc-data-model/)
/// used by mdip attestations: a single boolean claim about the subject, valid for a
/// fixed window after issuance.
///
/// # Serialization
/// The proof is computed over the canonical JSON of the credential with `proof`
/// absent, so `proof` is skipped when `None`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VerifiableCredential {
    #[serde(rename = "@context")]
    pub context: Vec<String>,

    /// DID of the attestor
    pub id: String,

    /// `["VerifiableCredential", <claimType>]`
    #[serde(rename = "type")]
    pub types: Vec<String>,

    pub issuer: CredentialIssuerInfo,

    pub issuance_date: String,

    pub expiration_date: String,

    pub credential_subject: CredentialSubject,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub proof: Option<Proof>,
}

impl VerifiableCredential {
    /// The credential as it was signed, without its proof.
    pub fn unsigned(&self) -> Self {
        VerifiableCredential {
            proof: None,
            ..self.clone()
        }
    }

    /// The claim type, i.e. the second entry of `type`.
    pub fn claim_type(&self) -> Option<&str> {
        self.types.get(1).map(String::as_str)
    }
}

/// A Verifiable Presentation bundling credentials for a verifier.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VerifiablePresentation {
    #[serde(rename = "@context")]
    pub context: Vec<String>,

    #[serde(rename = "type")]
    pub presentation_type: String,

    pub verifiable_credential: Vec<VerifiableCredential>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub proof: Option<Proof>,
}

impl VerifiablePresentation {
    pub fn unsigned(&self) -> Self {
        VerifiablePresentation {
            proof: None,
            ..self.clone()
        }
    }

    /// Canonical string a presentation proof signs: the presentation without its
    /// proof, together with the verifier's `challenge` and `domain`.
    pub fn signing_payload(&self, challenge: &str, domain: &str) -> Result<String, serde_json::Error> {
        canonical_json(&json!({
            "challenge": challenge,
            "domain": domain,
            "presentation": self.unsigned(),
        }))
    }
}
