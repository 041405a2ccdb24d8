//! Column-oriented insert payloads.

use crate::error::{IndexError, IndexResult};
use crate::schema::{self, CollectionSchema, FieldType};
use castindex_core::EmbeddingRecord;
use serde_json::{Map, Value};
use tracing::warn;

/// Values of one field across a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Str(Vec<String>),
    Int(Vec<i64>),
    Vector(Vec<Vec<f32>>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Str(v) => v.len(),
            Column::Int(v) => v.len(),
            Column::Vector(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn value_at(&self, row: usize) -> Value {
        match self {
            Column::Str(v) => Value::from(v[row].as_str()),
            Column::Int(v) => Value::from(v[row]),
            Column::Vector(v) => Value::from(v[row].clone()),
        }
    }
}

/// One insert payload: a column per schema field, all of equal length.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnBatch {
    columns: Vec<(&'static str, Column)>,
    rows: usize,
}

impl ColumnBatch {
    /// Pack records into columns, checking vector dimensions against `schema`.
    ///
    /// String values longer than their field's byte limit are cut at a char
    /// boundary, except the primary key, which is rejected.
    pub fn from_records(schema: &CollectionSchema, records: &[EmbeddingRecord]) -> IndexResult<Self> {
        for record in records {
            check_dimension(schema::EMBEDDING, schema.dimension, &record.embedding)?;
            for (name, vector) in schema::TAG_VECTORS.iter().zip(&record.tag_vectors) {
                check_dimension(name, schema.dimension, vector)?;
            }
        }

        let strings = |f: fn(&EmbeddingRecord) -> String| {
            Column::Str(records.iter().map(f).collect())
        };
        let ints = |f: fn(&EmbeddingRecord) -> i64| Column::Int(records.iter().map(f).collect());

        let mut columns = vec![
            (schema::CHUNK_ID, strings(|r| r.chunk_id.clone())),
            (schema::CHUNK_INDEX, ints(|r| i64::from(r.chunk_index))),
            (schema::SHOW_ID, ints(|r| r.show_id)),
            (schema::EPISODE_ID, ints(|r| r.episode_id)),
            (schema::EPISODE_TITLE, strings(|r| r.episode_title.clone())),
            (schema::CHUNK_TEXT, strings(|r| r.chunk_text.clone())),
            (
                schema::EMBEDDING,
                Column::Vector(records.iter().map(|r| r.embedding.clone()).collect()),
            ),
        ];
        for (slot, name) in schema::TAG_VECTORS.iter().enumerate() {
            columns.push((
                *name,
                Column::Vector(records.iter().map(|r| r.tag_vectors[slot].clone()).collect()),
            ));
        }
        columns.extend([
            (schema::LANGUAGE, strings(|r| r.language.clone())),
            (schema::CREATED_AT, strings(|r| r.created_at.clone())),
            (schema::MODEL, strings(|r| r.model.clone())),
            (schema::SHOW_NAME, strings(|r| r.show_name.clone())),
            (schema::AUTHOR, strings(|r| r.author.clone())),
            (schema::CATEGORY, strings(|r| r.category.clone())),
            (schema::TAGS, strings(|r| r.tags.join(","))),
        ]);

        fit_varchars(schema, records, &mut columns)?;

        Ok(Self {
            columns,
            rows: records.len(),
        })
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn columns(&self) -> &[(&'static str, Column)] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, column)| column)
    }

    pub fn strings(&self, name: &str) -> IndexResult<&[String]> {
        match self.column(name) {
            Some(Column::Str(values)) => Ok(values),
            _ => Err(IndexError::Schema(format!("no string column {}", name))),
        }
    }

    pub fn ints(&self, name: &str) -> IndexResult<&[i64]> {
        match self.column(name) {
            Some(Column::Int(values)) => Ok(values),
            _ => Err(IndexError::Schema(format!("no integer column {}", name))),
        }
    }

    pub fn vectors(&self, name: &str) -> IndexResult<&[Vec<f32>]> {
        match self.column(name) {
            Some(Column::Vector(values)) => Ok(values),
            _ => Err(IndexError::Schema(format!("no vector column {}", name))),
        }
    }

    /// Primary keys of the batch, in row order.
    pub fn chunk_ids(&self) -> Vec<String> {
        self.strings(schema::CHUNK_ID)
            .map(<[String]>::to_vec)
            .unwrap_or_default()
    }

    /// Row objects in the shape of Milvus REST `entities/*` payloads.
    pub fn to_rows(&self) -> Vec<Value> {
        (0..self.rows)
            .map(|row| {
                let mut object = Map::with_capacity(self.columns.len());
                for (name, column) in &self.columns {
                    object.insert((*name).to_string(), column.value_at(row));
                }
                Value::Object(object)
            })
            .collect()
    }
}

fn fit_varchars(
    schema: &CollectionSchema,
    records: &[EmbeddingRecord],
    columns: &mut [(&'static str, Column)],
) -> IndexResult<()> {
    let primary = schema.primary_field();
    for (name, column) in columns.iter_mut() {
        let name: &'static str = *name;
        let Column::Str(values) = column else {
            continue;
        };
        let Some(FieldType::VarChar { max_length }) = schema.field(name).map(|f| f.field_type)
        else {
            continue;
        };
        for (value, record) in values.iter_mut().zip(records) {
            if value.len() <= max_length {
                continue;
            }
            if name == primary {
                return Err(IndexError::Schema(format!(
                    "{} {} is {} bytes, limit is {}",
                    name,
                    record.chunk_id,
                    value.len(),
                    max_length
                )));
            }
            warn!(
                "{}: {} is {} bytes, truncating to {}",
                record.chunk_id,
                name,
                value.len(),
                max_length
            );
            truncate_bytes(value, max_length);
        }
    }
    Ok(())
}

/// Shorten `s` to at most `max` bytes without splitting a char.
fn truncate_bytes(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
}

fn check_dimension(field: &str, expected: usize, vector: &[f32]) -> IndexResult<()> {
    if vector.len() == expected {
        Ok(())
    } else {
        Err(IndexError::DimensionMismatch {
            field: field.to_string(),
            expected,
            actual: vector.len(),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use castindex_core::{EpisodeMetadata, TextChunk};

    pub(crate) fn record(index: u32, dimension: usize) -> EmbeddingRecord {
        let chunk = TextChunk::new("doc", index, format!("chunk text {}", index), 0);
        let metadata = EpisodeMetadata {
            episode_id: 3,
            show_id: 67,
            episode_title: "標題".into(),
            show_name: "Money Talk".into(),
            author: "Host".into(),
            category: "Business".into(),
            created_at: "2024-01-01T00:00:00Z".into(),
            language: "zh-TW".into(),
        };
        let embedding = vec![index as f32 + 1.0; dimension];
        let slots = [embedding.clone(), embedding.clone(), embedding.clone()];
        EmbeddingRecord::assemble(
            &chunk,
            &metadata,
            embedding,
            slots,
            vec!["投資".into(), "Other".into()],
            "hash",
        )
    }

    #[test]
    fn test_columns_follow_schema() {
        let schema = CollectionSchema::chunks("c", 4).unwrap();
        let batch = ColumnBatch::from_records(&schema, &[record(0, 4), record(1, 4)]).unwrap();
        assert_eq!(batch.len(), 2);
        let names: Vec<&str> = batch.columns().iter().map(|(n, _)| *n).collect();
        let expected: Vec<&str> = schema.fields.iter().map(|f| f.name).collect();
        assert_eq!(names, expected);
        assert!(batch.columns().iter().all(|(_, c)| c.len() == 2));
        assert_eq!(batch.chunk_ids(), vec!["doc_0", "doc_1"]);
        assert_eq!(batch.strings(schema::TAGS).unwrap()[0], "投資,Other");
    }

    #[test]
    fn test_dimension_checked() {
        let schema = CollectionSchema::chunks("c", 4).unwrap();
        let err = ColumnBatch::from_records(&schema, &[record(0, 3)]).unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { expected: 4, actual: 3, .. }));
    }

    #[test]
    fn test_long_text_truncated_to_field_limit() {
        let schema = CollectionSchema::chunks("c", 4).unwrap();
        let mut long = record(0, 4);
        long.chunk_text = "字".repeat(6000);
        let batch = ColumnBatch::from_records(&schema, &[long, record(1, 4)]).unwrap();

        let texts = batch.strings(schema::CHUNK_TEXT).unwrap();
        assert_eq!(texts[0].len(), 16383);
        assert_eq!(texts[0].chars().count(), 5461);
        assert!(texts[0].chars().all(|c| c == '字'));
        assert_eq!(texts[1], "chunk text 1");
    }

    #[test]
    fn test_oversized_primary_key_rejected() {
        let schema = CollectionSchema::chunks("c", 4).unwrap();
        let mut bad = record(0, 4);
        bad.chunk_id = "x".repeat(300);
        let err = ColumnBatch::from_records(&schema, &[bad]).unwrap_err();
        match err {
            IndexError::Schema(message) => assert!(message.contains(&"x".repeat(300))),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_truncate_bytes_keeps_char_boundary() {
        let mut s = "ab字".to_string();
        truncate_bytes(&mut s, 4);
        assert_eq!(s, "ab");
        let mut short = "ok".to_string();
        truncate_bytes(&mut short, 10);
        assert_eq!(short, "ok");
    }

    #[test]
    fn test_rows_shape() {
        let schema = CollectionSchema::chunks("c", 2).unwrap();
        let batch = ColumnBatch::from_records(&schema, &[record(5, 2)]).unwrap();
        let rows = batch.to_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["chunk_id"], "doc_5");
        assert_eq!(rows[0]["chunk_index"], 5);
        assert_eq!(rows[0]["embedding"].as_array().unwrap().len(), 2);
    }
}
