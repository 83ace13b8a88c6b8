// src/lib.rs
//! # mdip DID method
//!
//! Resolution, transaction preparation and signing, and credential issuance for
//! `did:mdip` identifiers anchored on Bitcoin, the Omni overlay, an Ethereum
//! registry contract or a private document store.
//!
//! ## Layers
//! 1. **Identifier codec** ([`identifier`]): DID strings and BIP-136 txrefs
//! 2. **Collaborators** ([`blockchain`], [`storage`]): ledger nodes, the registry
//!    service, the document store and the content store
//! 3. **Chain adapters** ([`adapters`]): per-chain transaction construction
//! 4. **Services** ([`services`]): resolver, preparer, signer, credential engine
//!    and the HTTP API

pub mod adapters;
pub mod blockchain;
pub mod config;
pub mod error;
pub mod identifier;
pub mod models;
pub mod services;
pub mod storage;
pub mod utils;
pub mod wallet;

pub use error::{MdipError, Result};
