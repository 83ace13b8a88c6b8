// src/models/response.rs
//! Result envelope returned to the calling layer.
//!
//! Every operation surfaced over HTTP answers with the same
//! `{success, result, error}` shape regardless of the chain involved.

use crate::error::{MdipError, Result};
use serde::{Deserialize, Serialize};

/// Error part of the envelope.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub kind: String,
    pub message: String,
}

impl From<&MdipError> for ApiError {
    fn from(e: &MdipError) -> Self {
        ApiError {
            kind: e.kind().to_string(),
            message: e.to_string(),
        }
    }
}

/// Discriminated success/error result.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

impl<T> ApiResponse<T> {
    pub fn ok(result: T) -> Self {
        ApiResponse {
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(error: &MdipError) -> Self {
        ApiResponse {
            success: false,
            result: None,
            error: Some(ApiError::from(error)),
        }
    }
}

impl<T> From<Result<T>> for ApiResponse<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(value) => ApiResponse::ok(value),
            Err(e) => ApiResponse::err(&e),
        }
    }
}
