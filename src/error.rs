//! Error types for the gateway
//!
//! This module defines all error types used throughout the gateway,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for gateway operations
///
/// Covers signing, upstream protocol failures, draw validation, storage and
/// configuration. The HTTP layer inspects the variant to choose a status code.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Signing credentials are missing or unusable
    #[error("Spark credentials are not configured")]
    AuthUnavailable,

    /// The model service reported a non-zero status code
    #[error("{message}")]
    Upstream {
        /// Status code from the frame header
        code: i64,
        /// Message from the frame header
        message: String,
    },

    /// Connection, send, receive or timeout failure talking to the model service
    #[error("Transport error: {0}")]
    Transport(String),

    /// The model's draw output could not be parsed as a JSON object
    #[error("invalid draw response")]
    MalformedDrawResponse,

    /// The model's draw output parsed but lacks a required field
    #[error("draw response missing fields: {0}")]
    IncompleteDrawResponse(String),

    /// The caller sent an invalid request
    #[error("{0}")]
    BadRequest(String),

    /// A requested record does not exist
    #[error("{0}")]
    NotFound(String),

    /// Storage collaborator errors (database operations)
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for gateway operations
///
/// Uses `anyhow::Error` so context can be attached while the typed
/// [`GatewayError`] stays recoverable via `downcast_ref`.
pub type Result<T> = anyhow::Result<T>;

/// Returns the [`GatewayError`] at the root of an `anyhow` chain, if any.
pub fn gateway_error(err: &anyhow::Error) -> Option<&GatewayError> {
    err.chain().find_map(|cause| cause.downcast_ref::<GatewayError>())
}
