//! Error types for the Domo API client.
//!
//! # Design
//! Only one operation, `query_dataset`, checks the response status itself and
//! reports a mismatch as `ApiError::Http`. Every other operation treats a
//! non-2xx response the way an HTTP library that raises on error statuses
//! would: it surfaces as `ApiError::Transport(TransportError::Status { .. })`,
//! next to connection failures. Callers that only care about "which status
//! came back" can use `ApiError::status()` for both paths.

use thiserror::Error;

/// Failure of the HTTP exchange itself, or a non-2xx status on an operation
/// that does not inspect statuses.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The server answered with a status outside 2xx.
    #[error("HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    /// The request never produced a response. The source is the underlying
    /// transport's error, unmodified.
    #[error("transport failure: {0}")]
    Connection(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Errors returned by `DomoClient` and the `DomoProtocol` parse methods.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Required configuration (credentials) is missing. Raised before any
    /// network call.
    #[error("configuration error: {0}")]
    Config(String),

    /// `query_dataset` got a status other than 200.
    #[error("API Request Failed. HTTP {status} -> {message}")]
    Http { status: u16, message: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),

    /// The response body could not be deserialized into the expected type.
    #[error("deserialization failed: {0}")]
    Deserialization(#[source] serde_json::Error),
}

impl ApiError {
    /// HTTP status carried by this error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            ApiError::Transport(TransportError::Status { status, .. }) => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}
