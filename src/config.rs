// src/config.rs
//! Service configuration.
//!
//! Values are layered: built-in defaults, then the optional `config/default.toml`,
//! then `MDIP__*` environment variables (`MDIP__BITCOIN__URL` sets `bitcoin.url`,
//! `MDIP__CREDENTIAL_TYPES` takes a comma separated list).

use crate::models::did::Network;
use crate::services::credential_issuer::DEFAULT_CREDENTIAL_TYPES;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;

/// Connection to a bitcoind-compatible JSON-RPC node.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct NodeSettings {
    pub url: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Settings {
    /// Network UTXO identifiers and keys belong to
    pub network: Network,
    pub listen_addr: String,
    pub bitcoin: NodeSettings,
    /// Node of the omni overlay, which shares the bitcoin ledger
    pub omni: NodeSettings,
    /// Base URL of the registry service that encodes `eth` contract calls
    pub registry_url: String,
    pub ipfs_url: String,
    pub fee_rate_sat_per_byte: u64,
    /// Claim types the credential engine may issue
    pub credential_types: Vec<String>,
}

fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("network", "testnet")?
        .set_default("listen_addr", "127.0.0.1:3000")?
        .set_default("bitcoin.url", "http://127.0.0.1:18332")?
        .set_default("omni.url", "http://127.0.0.1:18332")?
        .set_default("registry_url", "http://127.0.0.1:4000")?
        .set_default("ipfs_url", "http://127.0.0.1:5001")?
        .set_default("fee_rate_sat_per_byte", 2)?
        .set_default("credential_types", DEFAULT_CREDENTIAL_TYPES.to_vec())
}

impl Settings {
    /// Loads the layered configuration.
    ///
    /// # Errors
    /// Returns `ConfigError` when a source cannot be parsed or a value has the
    /// wrong type.
    pub fn load() -> Result<Self, ConfigError> {
        defaults()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(
                Environment::with_prefix("MDIP")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("credential_types"),
            )
            .build()?
            .try_deserialize()
    }
}
