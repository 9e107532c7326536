//! Error types for sketch-agent

use thiserror::Error;

/// Result type alias using sketch-agent Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during a turn
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the model provider layer
    #[error(transparent)]
    Ai(#[from] sketch_ai::Error),

    /// HTTP request failed (vector store boundary)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O failure (catalog files, output directory)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The vector store rejected a request
    #[error("Vector store error: {0}")]
    VectorStore(String),

    /// A generic agent error
    #[error("{0}")]
    Other(String),
}
