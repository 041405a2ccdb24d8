//! Collection schema of the chunk index.
//!
//! One row per chunk: scalar metadata copied from the episode record, the
//! primary embedding and three tag vector slots.

use crate::error::{IndexError, IndexResult};
use castindex_config::IndexConfig;
use serde_json::{json, Value};

pub const CHUNK_ID: &str = "chunk_id";
pub const CHUNK_INDEX: &str = "chunk_index";
pub const SHOW_ID: &str = "show_id";
pub const EPISODE_ID: &str = "episode_id";
pub const EPISODE_TITLE: &str = "episode_title";
pub const CHUNK_TEXT: &str = "chunk_text";
pub const EMBEDDING: &str = "embedding";
pub const TAG_VECTORS: [&str; 3] = ["tag_vector_1", "tag_vector_2", "tag_vector_3"];
pub const LANGUAGE: &str = "language";
pub const CREATED_AT: &str = "created_at";
pub const MODEL: &str = "model";
pub const SHOW_NAME: &str = "show_name";
pub const AUTHOR: &str = "author";
pub const CATEGORY: &str = "category";
pub const TAGS: &str = "tags";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// UTF-8 string; `max_length` is in bytes.
    VarChar { max_length: usize },
    Int64,
    FloatVector,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub field_type: FieldType,
    pub primary: bool,
}

impl FieldSpec {
    fn varchar(name: &'static str, max_length: usize) -> Self {
        Self {
            name,
            field_type: FieldType::VarChar { max_length },
            primary: false,
        }
    }

    fn int64(name: &'static str) -> Self {
        Self {
            name,
            field_type: FieldType::Int64,
            primary: false,
        }
    }

    fn vector(name: &'static str) -> Self {
        Self {
            name,
            field_type: FieldType::FloatVector,
            primary: false,
        }
    }

    pub fn is_vector(&self) -> bool {
        self.field_type == FieldType::FloatVector
    }
}

/// ANN index parameters applied to every vector field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexParams {
    pub index_type: String,
    pub metric_type: String,
    pub m: u32,
    pub ef_construction: u32,
}

impl Default for IndexParams {
    fn default() -> Self {
        Self {
            index_type: "HNSW".to_string(),
            metric_type: "COSINE".to_string(),
            m: 16,
            ef_construction: 200,
        }
    }
}

impl IndexParams {
    pub fn from_config(config: &IndexConfig) -> Self {
        Self {
            index_type: config.index_type.clone(),
            metric_type: config.metric_type.clone(),
            m: config.hnsw_m,
            ef_construction: config.ef_construction,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSchema {
    pub name: String,
    pub dimension: usize,
    pub fields: Vec<FieldSpec>,
    pub index: IndexParams,
}

/// Collection names must be identifiers: `[A-Za-z_][A-Za-z0-9_]*`.
pub fn validate_collection_name(name: &str) -> IndexResult<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(IndexError::InvalidCollectionName(name.to_string()))
    }
}

impl CollectionSchema {
    /// The chunk collection with vectors of `dimension` floats.
    pub fn chunks(name: impl Into<String>, dimension: usize) -> IndexResult<Self> {
        let name = name.into();
        validate_collection_name(&name)?;
        if dimension == 0 {
            return Err(IndexError::Schema("vector dimension must be positive".into()));
        }

        let mut fields = vec![
            FieldSpec {
                name: CHUNK_ID,
                field_type: FieldType::VarChar { max_length: 256 },
                primary: true,
            },
            FieldSpec::int64(CHUNK_INDEX),
            FieldSpec::int64(SHOW_ID),
            FieldSpec::int64(EPISODE_ID),
            FieldSpec::varchar(EPISODE_TITLE, 1024),
            FieldSpec::varchar(CHUNK_TEXT, 16384),
            FieldSpec::vector(EMBEDDING),
        ];
        fields.extend(TAG_VECTORS.iter().map(|&name| FieldSpec::vector(name)));
        fields.extend([
            FieldSpec::varchar(LANGUAGE, 32),
            FieldSpec::varchar(CREATED_AT, 64),
            FieldSpec::varchar(MODEL, 128),
            FieldSpec::varchar(SHOW_NAME, 512),
            FieldSpec::varchar(AUTHOR, 512),
            FieldSpec::varchar(CATEGORY, 256),
            FieldSpec::varchar(TAGS, 512),
        ]);

        Ok(Self {
            name,
            dimension,
            fields,
            index: IndexParams::default(),
        })
    }

    pub fn from_config(config: &IndexConfig, dimension: usize) -> IndexResult<Self> {
        Ok(Self::chunks(config.collection.clone(), dimension)?
            .with_index(IndexParams::from_config(config)))
    }

    pub fn with_index(mut self, index: IndexParams) -> Self {
        self.index = index;
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn primary_field(&self) -> &'static str {
        self.fields
            .iter()
            .find(|f| f.primary)
            .map(|f| f.name)
            .unwrap_or(CHUNK_ID)
    }

    pub fn vector_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.is_vector())
    }

    /// Milvus REST `collections/create` request body.
    pub fn to_milvus_request(&self) -> Value {
        let fields: Vec<Value> = self
            .fields
            .iter()
            .map(|f| match f.field_type {
                FieldType::VarChar { max_length } => json!({
                    "fieldName": f.name,
                    "dataType": "VarChar",
                    "isPrimary": f.primary,
                    "elementTypeParams": { "max_length": max_length },
                }),
                FieldType::Int64 => json!({
                    "fieldName": f.name,
                    "dataType": "Int64",
                    "isPrimary": f.primary,
                }),
                FieldType::FloatVector => json!({
                    "fieldName": f.name,
                    "dataType": "FloatVector",
                    "elementTypeParams": { "dim": self.dimension },
                }),
            })
            .collect();

        let index_params: Vec<Value> = self
            .vector_fields()
            .map(|f| {
                json!({
                    "fieldName": f.name,
                    "indexName": format!("{}_idx", f.name),
                    "metricType": self.index.metric_type,
                    "params": {
                        "index_type": self.index.index_type,
                        "M": self.index.m,
                        "efConstruction": self.index.ef_construction,
                    },
                })
            })
            .collect();

        json!({
            "collectionName": self.name,
            "schema": {
                "autoId": false,
                "enableDynamicField": false,
                "fields": fields,
            },
            "indexParams": index_params,
        })
    }
}
