// src/main.rs

//! # mdip DID service - Main Entry Point
//!
//! Initializes all collaborators from the layered configuration and starts the API
//! server.
//!
//! ## Architecture Overview
//! 1. **Ledger Layer**: `BitcoinRpc` nodes for the btc and omni chains, the
//!    `RegistryClient` for the eth registry contract
//! 2. **Storage Layer**: IPFS for DID documents, the in-memory document store for
//!    `mongodb` DIDs
//! 3. **Services Layer**: resolution, preparation, signing, credentials and the API
//!
//! ## Configuration
//! See [`mdip_did::config::Settings`]; every key can be set through an `MDIP__*`
//! environment variable, also read from `.env`.

use anyhow::Context;
use dotenv::dotenv;
use log::info;
use mdip_did::blockchain::bitcoin_rpc::BitcoinRpc;
use mdip_did::blockchain::registry_client::RegistryClient;
use mdip_did::blockchain::ChainBackends;
use mdip_did::config::{NodeSettings, Settings};
use mdip_did::services::api_server::ApiServer;
use mdip_did::storage::document_store::InMemoryDocumentStore;
use mdip_did::storage::ipfs_client::IpfsStorage;
use std::net::SocketAddr;
use std::sync::Arc;

fn node(settings: &NodeSettings) -> BitcoinRpc {
    let credential = |value: &str| (!value.is_empty()).then(|| value.to_string());
    BitcoinRpc::new(&settings.url, credential(&settings.user), credential(&settings.password))
}

/// Main application entry point
///
/// # Initialization Sequence
/// 1. Load environment and configuration
/// 2. Connect collaborators
/// 3. Start API server
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = Settings::load().context("failed to load configuration")?;
    let content = IpfsStorage::new(&settings.ipfs_url).context("invalid IPFS API URL")?;

    let backends = ChainBackends {
        bitcoin: Arc::new(node(&settings.bitcoin)),
        omni: Arc::new(node(&settings.omni)),
        registry: Arc::new(RegistryClient::new(&settings.registry_url)),
        documents: Arc::new(InMemoryDocumentStore::new()),
        content: Arc::new(content),
    };
    let api_server = ApiServer::new(
        backends,
        settings.network,
        settings.fee_rate_sat_per_byte,
        settings.credential_types.clone(),
    );

    let addr: SocketAddr = settings
        .listen_addr
        .parse()
        .with_context(|| format!("invalid listen address {}", settings.listen_addr))?;
    info!("resolving {:?} identifiers", settings.network);
    api_server.run(addr).await.context("API server stopped")?;
    Ok(())
}
