//! Device client errors

use thiserror::Error;

/// Errors that can occur when posting to a device
#[derive(Debug, Error)]
pub enum DeviceError {
    /// HTTP request/response error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Device returned an error without per-tenant results
    #[error("AS3 API error: {0}")]
    Api(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Credentials rejected by the device
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Invalid request (e.g., empty tenant list)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}
