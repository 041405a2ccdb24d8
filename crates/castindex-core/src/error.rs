//! Error types for castindex.

use thiserror::Error;

/// Core error type for castindex domain operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Incomplete metadata, missing: {}", .0.join(", "))]
    IncompleteMetadata(Vec<&'static str>),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias using castindex's Error.
pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
