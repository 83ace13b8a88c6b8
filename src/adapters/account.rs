// src/adapters/account.rs
//! Ethereum registry adapter.
//!
//! The registry contract lives behind a remote service that encodes the calls;
//! this adapter publishes documents to the content store and forwards the
//! service's unsigned contract calls unchanged.

use crate::adapters::{ChainAdapter, ChangeRequest, CreateRequest};
use crate::blockchain::AccountRegistry;
use crate::error::{MdipError, Result};
use crate::identifier;
use crate::models::did::ChainTag;
use crate::models::transaction::UnsignedTransaction;
use crate::storage::ContentStore;
use async_trait::async_trait;
use log::debug;
use std::sync::Arc;

pub struct AccountAdapter {
    registry: Arc<dyn AccountRegistry>,
    content: Arc<dyn ContentStore>,
}

impl AccountAdapter {
    pub fn new(registry: Arc<dyn AccountRegistry>, content: Arc<dyn ContentStore>) -> Self {
        AccountAdapter { registry, content }
    }

    /// Content id under which the document at `document_url` is published.
    ///
    /// `ipfs://` pointers are already published; anything else is downloaded and
    /// pinned.
    async fn publish(&self, document_url: &str) -> Result<String> {
        if let Some(cid) = document_url.strip_prefix("ipfs://") {
            return Ok(cid.to_string());
        }
        let document = self.content.fetch(document_url).await?;
        let cid = self.content.store(&document).await?;
        debug!("published {} as {}", document_url, cid);
        Ok(cid)
    }

    fn public_key(public_key: Option<&str>) -> Result<&str> {
        public_key.ok_or_else(|| MdipError::InvalidKey("the registry requires the caller's public key".into()))
    }

    fn registry_id(did: &str) -> Result<String> {
        let id = identifier::parse(did)?;
        if id.chain != ChainTag::Eth {
            return Err(MdipError::UnsupportedOperation(format!("{} is not a registry DID", did)));
        }
        Ok(id.reference)
    }
}

#[async_trait]
impl ChainAdapter for AccountAdapter {
    fn chain(&self) -> ChainTag {
        ChainTag::Eth
    }

    fn max_metadata_bytes(&self) -> Option<usize> {
        None
    }

    fn encode_metadata(&self, _payload: &[u8]) -> Result<Vec<u8>> {
        Err(MdipError::UnsupportedOperation(
            "registry metadata is a content id set by contract call".into(),
        ))
    }

    fn decode_metadata(&self, _data: &[u8]) -> Result<Vec<u8>> {
        Err(MdipError::UnsupportedOperation(
            "registry metadata is read through the registry".into(),
        ))
    }

    async fn prepare_create(&self, request: &CreateRequest) -> Result<UnsignedTransaction> {
        let public_key = Self::public_key(request.public_key.as_deref())?;
        let cid = match request.document_url.as_deref() {
            Some(url) => self.publish(url).await?,
            None => String::new(),
        };
        let call = self.registry.create(&cid, public_key).await?;
        Ok(UnsignedTransaction::ContractCall(call))
    }

    async fn prepare_update(&self, request: &ChangeRequest) -> Result<UnsignedTransaction> {
        let public_key = Self::public_key(request.public_key.as_deref())?;
        let did_id = Self::registry_id(&request.did)?;
        let call = match (request.document_url.as_deref(), request.new_receiver.as_deref()) {
            (Some(url), _) => {
                let cid = self.publish(url).await?;
                self.registry.set_metadata(public_key, &did_id, &cid).await?
            }
            (None, Some(new_owner)) => self.registry.set_controller(public_key, new_owner, &did_id).await?,
            (None, None) => {
                return Err(MdipError::SchemaViolation(
                    "an update needs a new document or a new owner".into(),
                ))
            }
        };
        Ok(UnsignedTransaction::ContractCall(call))
    }

    async fn prepare_delete(&self, request: &ChangeRequest) -> Result<UnsignedTransaction> {
        let public_key = Self::public_key(request.public_key.as_deref())?;
        let did_id = Self::registry_id(&request.did)?;
        let call = self.registry.delete(public_key, &did_id).await?;
        Ok(UnsignedTransaction::ContractCall(call))
    }
}
