//! Backend abstraction over the vector store.

use crate::batch::ColumnBatch;
use crate::error::{IndexError, IndexResult};
use crate::milvus::MilvusIndex;
use crate::schema::CollectionSchema;
use crate::sqlite::SqliteIndex;
use castindex_config::IndexConfig;
use serde::Serialize;
use std::path::Path;

/// Row count and identity of a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub backend: String,
    pub collection: String,
    pub exists: bool,
    pub row_count: u64,
}

/// One named collection in a vector store.
pub trait VectorIndex {
    /// Short backend name (`milvus`, `sqlite`).
    fn backend(&self) -> &'static str;

    fn collection(&self) -> &str;

    fn has_collection(&self) -> IndexResult<bool>;

    fn create_collection(&mut self, schema: &CollectionSchema) -> IndexResult<()>;

    fn drop_collection(&mut self) -> IndexResult<()>;

    /// Delete every row, keeping the collection.
    fn clear(&mut self) -> IndexResult<()>;

    /// Make the collection searchable.
    fn load(&mut self) -> IndexResult<()>;

    fn row_count(&self) -> IndexResult<u64>;

    /// Insert or replace rows keyed on the primary field. Returns rows written.
    fn upsert(&mut self, batch: &ColumnBatch) -> IndexResult<usize>;

    /// Re-establish the connection after a connection error.
    fn reconnect(&mut self) -> IndexResult<()>;

    fn stats(&self) -> IndexResult<IndexStats> {
        let exists = self.has_collection()?;
        let row_count = if exists { self.row_count()? } else { 0 };
        Ok(IndexStats {
            backend: self.backend().to_string(),
            collection: self.collection().to_string(),
            exists,
            row_count,
        })
    }
}

/// Open the backend named in `config.backend`.
///
/// `sqlite_path` is used by the `sqlite` backend.
pub fn open_index(config: &IndexConfig, sqlite_path: &Path) -> IndexResult<Box<dyn VectorIndex>> {
    match config.backend.as_str() {
        "milvus" => Ok(Box::new(MilvusIndex::from_config(config)?)),
        "sqlite" => Ok(Box::new(SqliteIndex::open(sqlite_path, &config.collection)?)),
        other => Err(IndexError::UnknownBackend(other.to_string())),
    }
}
