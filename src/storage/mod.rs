// src/storage/mod.rs
//! Off-ledger storage collaborators.
//!
//! - [`DocumentStore`]: keyed DID records of the `mongodb` chain
//! - [`ContentStore`]: content-addressed or URL-addressed DID documents

pub mod document_store;
pub mod ipfs_client;

use crate::error::Result;
use crate::models::did::DIDDocument;
use async_trait::async_trait;

/// A document-store record together with its optimistic-concurrency version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub id: String,
    pub document: DIDDocument,
    /// Incremented on every successful replace
    pub version: u64,
}

/// Keyed store of DID documents.
///
/// Writes are conditional on the version the caller read, so two updates prepared
/// from the same state cannot both be applied.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<StoredRecord>>;

    /// Inserts a new record at version 0.
    ///
    /// # Errors
    /// `ConcurrentModification` if `id` is already taken.
    async fn insert(&self, id: &str, document: DIDDocument) -> Result<StoredRecord>;

    /// Replaces the record if it is still at `expected_version`.
    async fn replace(&self, id: &str, expected_version: u64, document: DIDDocument) -> Result<StoredRecord>;

    /// Removes the record if it is still at `expected_version`.
    async fn delete(&self, id: &str, expected_version: u64) -> Result<()>;
}

/// Retrieval and publication of DID documents by URL or content id.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Downloads the bytes behind an `http(s)` URL, an `ipfs://` URL or a bare CID.
    async fn fetch(&self, location: &str) -> Result<Vec<u8>>;

    /// Publishes `data` and returns its content id.
    async fn store(&self, data: &[u8]) -> Result<String>;
}
