// src/adapters/document_store.rs
//! Document-store adapter for `did:mdip:mongodb` identifiers.
//!
//! There is no ledger: creating allocates a record, updating and deleting act on
//! the record directly once the caller proves control with a bitcoin signed
//! message over the DID string. A failed proof leaves the record untouched.

use crate::adapters::{ChainAdapter, ChangeRequest, CreateRequest};
use crate::error::{MdipError, Result};
use crate::identifier;
use crate::models::did::{ChainTag, DIDDocument};
use crate::models::transaction::UnsignedTransaction;
use crate::services::credential_issuer::check_control;
use crate::storage::{ContentStore, DocumentStore, StoredRecord};
use async_trait::async_trait;
use ethers_core::utils::hex;
use log::info;
use std::sync::Arc;

pub struct DocumentStoreAdapter {
    store: Arc<dyn DocumentStore>,
    content: Arc<dyn ContentStore>,
}

/// Fresh 24 hex character record id.
pub fn new_record_id() -> String {
    hex::encode(rand::random::<[u8; 12]>())
}

impl DocumentStoreAdapter {
    pub fn new(store: Arc<dyn DocumentStore>, content: Arc<dyn ContentStore>) -> Self {
        DocumentStoreAdapter { store, content }
    }

    /// Loads the record of `request.did` and checks the caller controls it.
    async fn controlled_record(&self, request: &ChangeRequest) -> Result<StoredRecord> {
        let id = identifier::parse(&request.did)?;
        if id.chain != ChainTag::MongoDb {
            return Err(MdipError::UnsupportedOperation(format!("{} is not a document-store DID", request.did)));
        }
        let record = self
            .store
            .get(&id.reference)
            .await?
            .ok_or_else(|| MdipError::NotFound(request.did.clone()))?;
        let signature = request
            .control_signature
            .as_deref()
            .ok_or_else(|| MdipError::ControlVerificationFailed("no control signature supplied".into()))?;
        check_control(&record.document, &request.did, request.controller.as_deref(), signature)?;
        Ok(record)
    }
}

#[async_trait]
impl ChainAdapter for DocumentStoreAdapter {
    fn chain(&self) -> ChainTag {
        ChainTag::MongoDb
    }

    fn max_metadata_bytes(&self) -> Option<usize> {
        None
    }

    fn encode_metadata(&self, _payload: &[u8]) -> Result<Vec<u8>> {
        Err(MdipError::UnsupportedOperation("document-store DIDs carry no ledger metadata".into()))
    }

    fn decode_metadata(&self, _data: &[u8]) -> Result<Vec<u8>> {
        Err(MdipError::UnsupportedOperation("document-store DIDs carry no ledger metadata".into()))
    }

    async fn prepare_create(&self, request: &CreateRequest) -> Result<UnsignedTransaction> {
        let public_key = request
            .public_key
            .as_deref()
            .ok_or_else(|| MdipError::InvalidKey("a document-store DID is keyed on a public key".into()))?;
        let record_id = new_record_id();
        let did = identifier::mint_record_did(&record_id).to_string();
        self.store
            .insert(&record_id, DIDDocument::initial_record(&did, public_key))
            .await?;
        info!("allocated {}", did);
        Ok(UnsignedTransaction::Record { record_id })
    }

    async fn prepare_update(&self, request: &ChangeRequest) -> Result<UnsignedTransaction> {
        let record = self.controlled_record(request).await?;
        let document = match (request.document_url.as_deref(), request.new_controller_key.as_deref()) {
            (Some(url), _) => DIDDocument::from_slice(&self.content.fetch(url).await?)?,
            (None, Some(public_key)) => {
                let mut document = record.document.clone();
                document.rotate_controller(public_key);
                document
            }
            (None, None) => {
                return Err(MdipError::SchemaViolation(
                    "an update needs a new document or a new controller key".into(),
                ))
            }
        };
        if document.id != request.did {
            return Err(MdipError::SchemaViolation(format!(
                "document describes {}, not {}",
                document.id, request.did
            )));
        }
        self.store.replace(&record.id, record.version, document).await?;
        info!("updated {}", request.did);
        Ok(UnsignedTransaction::Applied { record_id: record.id })
    }

    async fn prepare_delete(&self, request: &ChangeRequest) -> Result<UnsignedTransaction> {
        let record = self.controlled_record(request).await?;
        self.store.delete(&record.id, record.version).await?;
        info!("deleted {}", request.did);
        Ok(UnsignedTransaction::Applied { record_id: record.id })
    }
}
