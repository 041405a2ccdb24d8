//! Error types for the ingestion pipeline.

use crate::metadata::Rejection;
use castindex_core::ErrorKind;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for ingestion operations.
pub type IngestResult<T> = Result<T, IngestError>;

/// Errors that can occur during ingestion.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] castindex_db::DbError),

    #[error("Config error: {0}")]
    Config(#[from] castindex_config::ConfigError),

    #[error("Embedding error: {0}")]
    Embed(#[from] castindex_embed::EmbedError),

    #[error("Index error: {0}")]
    Index(#[from] castindex_index::IndexError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Group not found: {0}")]
    GroupNotFound(String),

    #[error("Document not found: {0}")]
    DocumentNotFound(PathBuf),

    #[error("Invalid record {key}: {message}")]
    InvalidRecord { key: String, message: String },

    #[error("Metadata rejected for '{filename}': {reason}")]
    MetadataRejected { filename: String, reason: Rejection },

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Normalizer error: {0}")]
    Normalizer(String),

    #[error("Progress store error: {0}")]
    Progress(String),

    #[error("Processing error: {0}")]
    ProcessingError(String),
}

impl IngestError {
    /// Classify the error for the error log.
    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::Database(e) if e.is_connection() => ErrorKind::Connection,
            IngestError::Embed(e) if e.is_connection() => ErrorKind::Connection,
            IngestError::Index(castindex_index::IndexError::Write { .. }) => ErrorKind::Write,
            IngestError::Index(e) if e.is_connection() => ErrorKind::Connection,
            IngestError::Index(_) => ErrorKind::Write,
            IngestError::Json(_)
            | IngestError::InvalidRecord { .. }
            | IngestError::MetadataRejected { .. }
            | IngestError::Config(_) => ErrorKind::Validation,
            _ => ErrorKind::Processing,
        }
    }
}
