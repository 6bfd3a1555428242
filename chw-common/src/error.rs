//! Common error types for CHW transitions

use thiserror::Error;

/// Common result type for CHW operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across CHW crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON document could not be parsed or serialized
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML configuration could not be parsed
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Failure reported by the document store collaborators (facility index, lineage hydration)
///
/// Transitions never translate these; they are handed back to the caller unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Store could not be reached or refused the request
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// No document exists with the requested id
    #[error("document not found: {0}")]
    NotFound(String),

    /// Parent chain exceeded the traversal cap (likely a cycle)
    #[error("lineage of {id} exceeds {max_depth} levels")]
    LineageTooDeep { id: String, max_depth: usize },

    /// Stored document does not have the expected shape
    #[error("malformed document {id}: {reason}")]
    Malformed { id: String, reason: String },
}
