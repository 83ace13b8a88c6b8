// src/services/mod.rs
//! Business logic and the HTTP API.

pub mod api_server;
pub mod credential_issuer;
pub mod ledger_info;
pub mod preparer;
pub mod resolver;
pub mod signer;
pub mod verifier;
