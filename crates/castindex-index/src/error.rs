//! Vector index error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Request timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Index API error (code {code}): {message}")]
    Api { code: i64, message: String },

    #[error("Collection not found: {0}")]
    MissingCollection(String),

    #[error("Invalid collection name: {0}")]
    InvalidCollectionName(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Vector dimension mismatch in field {field}: expected {expected}, got {actual}")]
    DimensionMismatch {
        field: String,
        expected: usize,
        actual: usize,
    },

    #[error("Unknown index backend: {0}")]
    UnknownBackend(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    /// A batch could not be written after retries.
    #[error("Failed to write batch of {} rows (after {retries} retries): {source}", .chunk_ids.len())]
    Write {
        chunk_ids: Vec<String>,
        retries: u32,
        #[source]
        source: Box<IndexError>,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl IndexError {
    /// Whether the backend connection was lost.
    pub fn is_connection(&self) -> bool {
        match self {
            IndexError::Connection(_) | IndexError::Timeout { .. } => true,
            IndexError::Http(e) => e.is_connect() || e.is_timeout(),
            IndexError::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::CannotOpen
                    | rusqlite::ErrorCode::DatabaseBusy
                    | rusqlite::ErrorCode::DatabaseLocked
                    | rusqlite::ErrorCode::SystemIoFailure
            ),
            _ => false,
        }
    }

    /// Chunk ids of the batch that failed, if this is a write error.
    pub fn failed_chunk_ids(&self) -> &[String] {
        match self {
            IndexError::Write { chunk_ids, .. } => chunk_ids,
            _ => &[],
        }
    }
}

pub type IndexResult<T> = Result<T, IndexError>;
