//! Castindex Index - Vector index lifecycle and batched writes.
//!
//! A [`VectorIndex`] backend owns one named collection. [`IndexWriter`] sits on
//! top of it: it creates the collection from a [`CollectionSchema`], packs
//! records into column-oriented [`ColumnBatch`]es and retries batches after a
//! reconnect when the backend connection drops.

mod backend;
mod batch;
mod error;
mod milvus;
pub mod schema;
mod sqlite;
mod writer;

pub use backend::{open_index, IndexStats, VectorIndex};
pub use batch::{Column, ColumnBatch};
pub use error::{IndexError, IndexResult};
pub use milvus::MilvusIndex;
pub use schema::{CollectionSchema, FieldSpec, FieldType, IndexParams};
pub use sqlite::{SearchHit, SqliteIndex};
pub use writer::{IndexWriter, WriteReport};
