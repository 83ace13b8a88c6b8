// src/models/mod.rs
//! Data structures shared across the system.

pub mod credential;
pub mod did;
pub mod response;
pub mod transaction;
