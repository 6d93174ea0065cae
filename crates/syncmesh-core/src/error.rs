//! Error types for syncmesh

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Syncmesh protocol error types
#[derive(Debug, Error)]
pub enum Error {
    /// Envelope failed to encode or decode
    #[error("envelope codec error: {0}")]
    Envelope(#[from] serde_json::Error),

    /// Missing required field
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}
