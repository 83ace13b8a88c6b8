// src/blockchain/registry_client.rs
//! HTTP client for the account-chain DID registry service.
//!
//! The registry service owns the contract ABI and the provider connection. It
//! prepares unsigned contract calls, reads registry state and relays signed raw
//! transactions; this client only speaks its JSON envelope.

use crate::blockchain::{AccountRegistry, RegistryRecord};
use crate::error::{MdipError, Result};
use crate::models::did::ChainTag;
use crate::models::transaction::UnsignedContractCall;
use async_trait::async_trait;
use log::debug;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

/// Client for a remote registry service.
#[derive(Clone)]
pub struct RegistryClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct Envelope<T> {
    result: Option<T>,
    error: Option<Value>,
}

impl RegistryClient {
    /// # Arguments
    /// * `base_url` - Root URL of the registry service, without a trailing slash
    pub fn new(base_url: &str) -> Self {
        RegistryClient {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn unwrap_envelope<T>(endpoint: &str, envelope: Envelope<T>) -> Result<T> {
        if let Some(error) = envelope.error {
            return Err(MdipError::UpstreamUnavailable(format!("{}: {}", endpoint, error)));
        }
        envelope
            .result
            .ok_or_else(|| MdipError::UpstreamUnavailable(format!("{} returned no result", endpoint)))
    }

    async fn post<T: DeserializeOwned>(&self, endpoint: &str, body: Value) -> Result<T> {
        debug!("registry {} {}", endpoint, body);
        let envelope: Envelope<T> = self
            .client
            .post(format!("{}/{}", self.base_url, endpoint))
            .json(&body)
            .send()
            .await?
            .json()
            .await?;
        Self::unwrap_envelope(endpoint, envelope)
    }

    async fn prepare(&self, operation: &str, params: Value) -> Result<UnsignedContractCall> {
        let mut body = json!({ "blockchain": ChainTag::Eth, "type": operation });
        if let (Some(body), Value::Object(params)) = (body.as_object_mut(), params) {
            body.extend(params);
        }
        self.post("prepareTransaction", body).await
    }
}

#[async_trait]
impl AccountRegistry for RegistryClient {
    async fn create(&self, document_cid: &str, public_key: &str) -> Result<UnsignedContractCall> {
        self.prepare("create", json!({ "didDoc": document_cid, "publicKey": public_key }))
            .await
    }

    async fn set_metadata(&self, public_key: &str, did_id: &str, document_cid: &str) -> Result<UnsignedContractCall> {
        self.prepare(
            "setMetadata",
            json!({ "publicKey": public_key, "didId": did_id, "didDoc": document_cid }),
        )
        .await
    }

    async fn set_controller(&self, public_key: &str, new_owner: &str, did_id: &str) -> Result<UnsignedContractCall> {
        self.prepare(
            "setController",
            json!({ "publicKey": public_key, "newOwner": new_owner, "didId": did_id }),
        )
        .await
    }

    async fn delete(&self, public_key: &str, did_id: &str) -> Result<UnsignedContractCall> {
        self.prepare("delete", json!({ "publicKey": public_key, "didId": did_id }))
            .await
    }

    async fn lookup(&self, did_id: &str) -> Result<RegistryRecord> {
        let envelope: Envelope<RegistryRecord> = self
            .client
            .get(format!("{}/readDid", self.base_url))
            .query(&[("id", did_id)])
            .send()
            .await?
            .json()
            .await?;
        Self::unwrap_envelope("readDid", envelope)
    }

    async fn send_raw_transaction(&self, raw: &str) -> Result<String> {
        self.post("broadcast", json!({ "blockchain": ChainTag::Eth, "signedTx": raw }))
            .await
    }
}
