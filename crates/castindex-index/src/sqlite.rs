//! Local collection stored in SQLite.
//!
//! Vectors are little-endian `f32` BLOBs. Search is a brute-force cosine scan,
//! which is adequate for local runs and tests.

use crate::backend::VectorIndex;
use crate::batch::{Column, ColumnBatch};
use crate::error::{IndexError, IndexResult};
use crate::schema::{validate_collection_name, CollectionSchema, FieldType, CHUNK_ID, CHUNK_TEXT};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A nearest-neighbour result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub chunk_id: String,
    pub chunk_text: String,
    pub score: f32,
}

pub struct SqliteIndex {
    conn: Connection,
    path: Option<PathBuf>,
    collection: String,
    loaded: bool,
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let denominator = a.iter().map(|x| x * x).sum::<f32>().sqrt()
        * b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if denominator == 0.0 {
        0.0
    } else {
        dot / denominator
    }
}

const META_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS castindex_collections (
        name TEXT PRIMARY KEY,
        dimension INTEGER NOT NULL,
        metric_type TEXT NOT NULL,
        index_type TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );
"#;

impl SqliteIndex {
    /// Open (or create) the index file at `path`.
    pub fn open(path: &Path, collection: &str) -> IndexResult<Self> {
        validate_collection_name(collection)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| IndexError::Connection(format!("{}: {}", parent.display(), e)))?;
        }
        info!("Opening local vector index at: {}", path.display());
        let conn = Connection::open(path)?;
        conn.execute_batch(META_TABLE)?;
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
            collection: collection.to_string(),
            loaded: false,
        })
    }

    /// Open an in-memory index (for testing).
    pub fn open_in_memory(collection: &str) -> IndexResult<Self> {
        validate_collection_name(collection)?;
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(META_TABLE)?;
        Ok(Self {
            conn,
            path: None,
            collection: collection.to_string(),
            loaded: false,
        })
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    fn require_collection(&self) -> IndexResult<()> {
        if self.has_collection()? {
            Ok(())
        } else {
            Err(IndexError::MissingCollection(self.collection.clone()))
        }
    }

    /// All primary keys, sorted.
    pub fn chunk_ids(&self) -> IndexResult<Vec<String>> {
        self.require_collection()?;
        let sql = format!(
            "SELECT {} FROM \"{}\" ORDER BY {}",
            CHUNK_ID, self.collection, CHUNK_ID
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    /// Stored vector of `field` for one chunk.
    pub fn vector(&self, chunk_id: &str, field: &str) -> IndexResult<Option<Vec<f32>>> {
        self.require_collection()?;
        let sql = format!(
            "SELECT \"{}\" FROM \"{}\" WHERE {} = ?1",
            field, self.collection, CHUNK_ID
        );
        let bytes: Option<Vec<u8>> = self
            .conn
            .query_row(&sql, params![chunk_id], |row| row.get(0))
            .optional()?;
        Ok(bytes.map(|b| decode_vector(&b)))
    }

    /// Brute-force cosine search over one vector field.
    pub fn search(&self, field: &str, query: &[f32], limit: usize) -> IndexResult<Vec<SearchHit>> {
        self.require_collection()?;
        let sql = format!(
            "SELECT {}, {}, \"{}\" FROM \"{}\"",
            CHUNK_ID, CHUNK_TEXT, field, self.collection
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            let chunk_id: String = row.get(0)?;
            let chunk_text: String = row.get(1)?;
            let bytes: Vec<u8> = row.get(2)?;
            Ok((chunk_id, chunk_text, bytes))
        })?;

        let mut hits = Vec::new();
        for row in rows {
            let (chunk_id, chunk_text, bytes) = row?;
            let score = cosine(query, &decode_vector(&bytes));
            hits.push(SearchHit {
                chunk_id,
                chunk_text,
                score,
            });
        }
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }
}

impl VectorIndex for SqliteIndex {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    fn collection(&self) -> &str {
        &self.collection
    }

    fn has_collection(&self) -> IndexResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![self.collection],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn create_collection(&mut self, schema: &CollectionSchema) -> IndexResult<()> {
        if schema.name != self.collection {
            return Err(IndexError::Schema(format!(
                "schema is for collection {}, index is bound to {}",
                schema.name, self.collection
            )));
        }

        let columns: Vec<String> = schema
            .fields
            .iter()
            .map(|f| {
                let sql_type = match f.field_type {
                    FieldType::VarChar { .. } => "TEXT NOT NULL",
                    FieldType::Int64 => "INTEGER NOT NULL",
                    FieldType::FloatVector => "BLOB NOT NULL",
                };
                let key = if f.primary { " PRIMARY KEY" } else { "" };
                format!("\"{}\" {}{}", f.name, sql_type, key)
            })
            .collect();

        let tx = self.conn.transaction()?;
        tx.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" ({})",
            schema.name,
            columns.join(", ")
        ))?;
        tx.execute(
            r#"
            INSERT OR REPLACE INTO castindex_collections (name, dimension, metric_type, index_type)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                schema.name,
                schema.dimension as i64,
                schema.index.metric_type,
                schema.index.index_type
            ],
        )?;
        tx.commit()?;
        info!("Created local collection {}", schema.name);
        Ok(())
    }

    fn drop_collection(&mut self) -> IndexResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute_batch(&format!("DROP TABLE IF EXISTS \"{}\"", self.collection))?;
        tx.execute(
            "DELETE FROM castindex_collections WHERE name = ?1",
            params![self.collection],
        )?;
        tx.commit()?;
        self.loaded = false;
        info!("Dropped local collection {}", self.collection);
        Ok(())
    }

    fn clear(&mut self) -> IndexResult<()> {
        self.require_collection()?;
        self.conn
            .execute_batch(&format!("DELETE FROM \"{}\"", self.collection))?;
        Ok(())
    }

    fn load(&mut self) -> IndexResult<()> {
        self.require_collection()?;
        self.loaded = true;
        Ok(())
    }

    fn row_count(&self) -> IndexResult<u64> {
        self.require_collection()?;
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM \"{}\"", self.collection),
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn upsert(&mut self, batch: &ColumnBatch) -> IndexResult<usize> {
        if batch.is_empty() {
            return Ok(0);
        }
        self.require_collection()?;

        let names: Vec<String> = batch
            .columns()
            .iter()
            .map(|(name, _)| format!("\"{}\"", name))
            .collect();
        let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT OR REPLACE INTO \"{}\" ({}) VALUES ({})",
            self.collection,
            names.join(", "),
            placeholders.join(", ")
        );

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(&sql)?;
            for row in 0..batch.len() {
                let values: Vec<SqlValue> = batch
                    .columns()
                    .iter()
                    .map(|(_, column)| match column {
                        Column::Str(v) => SqlValue::Text(v[row].clone()),
                        Column::Int(v) => SqlValue::Integer(v[row]),
                        Column::Vector(v) => SqlValue::Blob(encode_vector(&v[row])),
                    })
                    .collect();
                stmt.execute(params_from_iter(values))?;
            }
        }
        tx.commit()?;
        debug!("Upserted {} rows into {}", batch.len(), self.collection);
        Ok(batch.len())
    }

    fn reconnect(&mut self) -> IndexResult<()> {
        if let Some(path) = &self.path {
            self.conn = Connection::open(path)?;
        }
        Ok(())
    }
}
