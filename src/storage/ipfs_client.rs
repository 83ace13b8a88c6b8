// src/storage/ipfs_client.rs
//! IPFS content store for DID documents.
//!
//! Documents referenced from the ledger are either plain `http(s)` URLs or IPFS
//! content ids. Account-chain DIDs always publish their documents here and record
//! the returned CID in the registry contract.
//!
//! # Security Considerations
//! - All stored data is public (IPFS is a public network)
//! - Hashes are content-addressable and permanent

use crate::error::{MdipError, Result};
use crate::storage::ContentStore;
use async_trait::async_trait;
use bytes::BytesMut;
use futures::TryStreamExt;
use ipfs_api_backend_hyper::{IpfsApi, IpfsClient, TryFromUri};
use log::debug;
use std::io::Cursor;
use std::sync::Arc;
use tokio::task;

/// Thread-safe IPFS client with an HTTP fallback for URL pointers.
#[derive(Clone)]
pub struct IpfsStorage {
    /// Shared IPFS client instance (thread-safe via Arc)
    client: Arc<IpfsClient>,
    http: reqwest::Client,
}

fn upstream<E: std::fmt::Display>(e: E) -> MdipError {
    MdipError::UpstreamUnavailable(e.to_string())
}

impl IpfsStorage {
    /// Creates a client for the IPFS API at `api_url`, e.g. `http://localhost:5001`.
    ///
    /// # Errors
    /// `UpstreamUnavailable` if the URL is not a valid URI. Connection errors only
    /// occur on the first operation.
    pub fn new(api_url: &str) -> Result<Self> {
        let client = IpfsClient::from_str(api_url).map_err(upstream)?;
        Ok(IpfsStorage {
            client: Arc::new(client),
            http: reqwest::Client::new(),
        })
    }

    /// Stores raw bytes in IPFS and returns the CID.
    ///
    /// The hyper backend is not `Send`, so the request runs on a dedicated runtime
    /// inside a blocking task.
    pub async fn store_data(&self, data: &[u8]) -> Result<String> {
        let client = self.client.clone();
        let data_owned = data.to_vec();

        task::spawn_blocking(move || -> Result<String> {
            let rt = tokio::runtime::Runtime::new().map_err(upstream)?;
            rt.block_on(async {
                let added = client.add(Cursor::new(data_owned)).await.map_err(upstream)?;
                Ok(added.hash)
            })
        })
        .await
        .map_err(upstream)?
    }

    /// Retrieves the bytes of a CID.
    pub async fn retrieve_data(&self, hash: &str) -> Result<Vec<u8>> {
        let client = self.client.clone();
        let hash = hash.to_string();

        task::spawn_blocking(move || -> Result<Vec<u8>> {
            let rt = tokio::runtime::Runtime::new().map_err(upstream)?;
            rt.block_on(async {
                let data = client
                    .cat(&hash)
                    .try_fold(BytesMut::new(), |mut acc, chunk| async move {
                        acc.extend_from_slice(&chunk);
                        Ok(acc)
                    })
                    .await
                    .map_err(upstream)?;
                Ok(data.to_vec())
            })
        })
        .await
        .map_err(upstream)?
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.http.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl ContentStore for IpfsStorage {
    async fn fetch(&self, location: &str) -> Result<Vec<u8>> {
        debug!("fetching document {}", location);
        if location.starts_with("http://") || location.starts_with("https://") {
            return self.download(location).await;
        }
        let cid = location.strip_prefix("ipfs://").unwrap_or(location);
        if cid.is_empty() {
            return Err(MdipError::NotFound("empty content id".into()));
        }
        self.retrieve_data(cid).await
    }

    async fn store(&self, data: &[u8]) -> Result<String> {
        self.store_data(data).await
    }
}
