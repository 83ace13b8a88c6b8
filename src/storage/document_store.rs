// src/storage/document_store.rs
//! In-memory document store.
//!
//! Backs the `mongodb` chain when no external database is configured, and the
//! tests. Records live in a hashmap guarded by a Tokio `RwLock`; the lock is only
//! held for the map access itself.

use crate::error::{MdipError, Result};
use crate::models::did::DIDDocument;
use crate::storage::{DocumentStore, StoredRecord};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Versioned in-memory storage for DID records.
///
/// # Behavior
/// - `insert` never overwrites
/// - `replace` and `delete` fail with `ConcurrentModification` when the stored
///   version differs from the one the caller read
#[derive(Default)]
pub struct InMemoryDocumentStore {
    records: RwLock<HashMap<String, StoredRecord>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn count_records(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, id: &str) -> Result<Option<StoredRecord>> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn insert(&self, id: &str, document: DIDDocument) -> Result<StoredRecord> {
        let mut records = self.records.write().await;
        if records.contains_key(id) {
            return Err(MdipError::ConcurrentModification(id.to_string()));
        }
        let record = StoredRecord {
            id: id.to_string(),
            document,
            version: 0,
        };
        records.insert(id.to_string(), record.clone());
        Ok(record)
    }

    async fn replace(&self, id: &str, expected_version: u64, document: DIDDocument) -> Result<StoredRecord> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| MdipError::NotFound(format!("record {}", id)))?;
        if record.version != expected_version {
            return Err(MdipError::ConcurrentModification(id.to_string()));
        }
        record.document = document;
        record.version += 1;
        Ok(record.clone())
    }

    async fn delete(&self, id: &str, expected_version: u64) -> Result<()> {
        let mut records = self.records.write().await;
        match records.get(id) {
            None => Err(MdipError::NotFound(format!("record {}", id))),
            Some(record) if record.version != expected_version => {
                Err(MdipError::ConcurrentModification(id.to_string()))
            }
            Some(_) => {
                records.remove(id);
                Ok(())
            }
        }
    }
}
