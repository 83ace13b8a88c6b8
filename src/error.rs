// src/error.rs
//! Error type shared by every layer of the mdip DID system.
//!
//! Ledger and storage faults are surfaced verbatim as [`MdipError::UpstreamUnavailable`];
//! everything else is a validation or integrity failure raised by this crate.

use thiserror::Error;

/// Errors produced by identifier parsing, resolution, preparation, signing and
/// credential issuance.
#[derive(Error, Debug)]
pub enum MdipError {
    /// The DID string does not follow `did:mdip:<chain>-<reference>`
    #[error("Malformed identifier: {0}")]
    MalformedIdentifier(String),

    /// The compact chain reference failed to decode (bad checksum, magic or network)
    #[error("Invalid chain reference: {0}")]
    InvalidReference(String),

    /// Encoded metadata does not fit in the chain's data-carrier output
    #[error("Metadata payload of {len} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("Invalid DID document URL: {0}")]
    InvalidDocumentURL(String),

    /// The fetched DID document does not have the expected shape
    #[error("DID document schema validation failed: {0}")]
    SchemaViolation(String),

    #[error("Insufficient funds: {available} sats available, {required} sats required")]
    InsufficientFunds { available: u64, required: u64 },

    #[error("Signature validation failed: {0}")]
    SignatureValidationFailed(String),

    /// A spent output whose spender could not be located on the ledger
    #[error("Broken document chain: {0}")]
    BrokenDocumentChain(String),

    /// A continuation transaction that carries no document pointer
    #[error("Continuation transaction {txid} carries no metadata output")]
    MissingContinuationMetadata { txid: String },

    #[error("Unsupported claim type: {0}")]
    UnsupportedClaimType(String),

    #[error("Control verification failed: {0}")]
    ControlVerificationFailed(String),

    /// Remote ledger, registry or storage failure
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Operation not supported: {0}")]
    UnsupportedOperation(String),

    /// Optimistic update lost against a concurrent writer
    #[error("Record {0} was modified concurrently")]
    ConcurrentModification(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MdipError {
    /// Stable machine-readable name of the error kind, used in API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            MdipError::MalformedIdentifier(_) => "MalformedIdentifier",
            MdipError::InvalidReference(_) => "InvalidReference",
            MdipError::PayloadTooLarge { .. } => "PayloadTooLarge",
            MdipError::InvalidDocumentURL(_) => "InvalidDocumentURL",
            MdipError::SchemaViolation(_) => "SchemaViolation",
            MdipError::InsufficientFunds { .. } => "InsufficientFunds",
            MdipError::SignatureValidationFailed(_) => "SignatureValidationFailed",
            MdipError::BrokenDocumentChain(_) => "BrokenDocumentChain",
            MdipError::MissingContinuationMetadata { .. } => "MissingContinuationMetadata",
            MdipError::UnsupportedClaimType(_) => "UnsupportedClaimType",
            MdipError::ControlVerificationFailed(_) => "ControlVerificationFailed",
            MdipError::UpstreamUnavailable(_) => "UpstreamUnavailable",
            MdipError::NotFound(_) => "NotFound",
            MdipError::InvalidKey(_) => "InvalidKey",
            MdipError::InvalidAddress(_) => "InvalidAddress",
            MdipError::UnsupportedOperation(_) => "UnsupportedOperation",
            MdipError::ConcurrentModification(_) => "ConcurrentModification",
            MdipError::Serialization(_) => "Serialization",
        }
    }

    /// Whether the failure happened before any remote side effect could occur.
    pub fn is_validation(&self) -> bool {
        !matches!(
            self,
            MdipError::UpstreamUnavailable(_)
                | MdipError::BrokenDocumentChain(_)
                | MdipError::MissingContinuationMetadata { .. }
                | MdipError::ConcurrentModification(_)
        )
    }
}

impl From<reqwest::Error> for MdipError {
    fn from(e: reqwest::Error) -> Self {
        MdipError::UpstreamUnavailable(e.to_string())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MdipError>;
