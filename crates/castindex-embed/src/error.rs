//! Error types for embedding operations.

use thiserror::Error;

/// Errors that can occur while generating embeddings.
#[derive(Error, Debug)]
pub enum EmbedError {
    /// Connection error - unable to reach the embedding server.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Request timeout.
    #[error("Request timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// The requested model is not available.
    #[error("Model not found: {model}. Run 'ollama pull {model}' to download it.")]
    ModelNotFound { model: String },

    /// Ollama server is not running.
    #[error("Ollama server is not running at {host}. Start it with 'ollama serve'.")]
    ServerNotRunning { host: String },

    /// API returned an error response.
    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Embedding dimension mismatch.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The server returned a different number of vectors than inputs.
    #[error("Expected {expected} embeddings, got {actual}")]
    CountMismatch { expected: usize, actual: usize },

    /// Failed to start the async runtime.
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EmbedError {
    /// Whether the failure is transient and worth retrying.
    pub fn is_connection(&self) -> bool {
        match self {
            EmbedError::Connection(_)
            | EmbedError::Timeout { .. }
            | EmbedError::ServerNotRunning { .. } => true,
            EmbedError::Http(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }
}

/// Result type for embedding operations.
pub type EmbedResult<T> = Result<T, EmbedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_classification() {
        assert!(EmbedError::Timeout { seconds: 5 }.is_connection());
        assert!(EmbedError::ServerNotRunning {
            host: "http://localhost:11434".into()
        }
        .is_connection());
        assert!(!EmbedError::DimensionMismatch {
            expected: 3,
            actual: 2
        }
        .is_connection());
    }
}
