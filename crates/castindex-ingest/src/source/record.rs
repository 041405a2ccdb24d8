//! Field extraction from schema-less JSON records.

use crate::error::{IngestError, IngestResult};
use castindex_core::RawDocument;
use serde_json::Value;
use std::path::Path;

const ID_FIELDS: &[&str] = &["_id", "id", "episode_id"];
const TITLE_FIELDS: &[&str] = &["title", "name"];
const BODY_FIELDS: &[&str] = &["text", "content", "transcript", "body"];
const FILENAME_FIELDS: &[&str] = &["filename", "file_name"];
const FILE_REF_FIELDS: &[&str] = &["file", "file_path", "path", "source"];

/// Scalar field as a string. Accepts Mongo-style `{"$oid": "..."}` ids.
fn scalar(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Object(map) => return map.get("$oid").and_then(scalar),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn first_field(record: &Value, names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|name| record.get(name).and_then(scalar))
}

/// Last path component with its extension removed.
fn strip_file_ref(reference: &str) -> Option<String> {
    Path::new(reference)
        .file_stem()
        .and_then(|s| s.to_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Build a document from a decoded record stored under `group`/`key`.
///
/// The filename token falls back from an explicit filename, to a file
/// reference without its extension, to the document id.
pub fn extract_document(record: &Value, group: &str, key: &str) -> IngestResult<RawDocument> {
    if !record.is_object() {
        return Err(IngestError::InvalidRecord {
            key: key.to_string(),
            message: "record is not a JSON object".to_string(),
        });
    }

    let id = first_field(record, ID_FIELDS).unwrap_or_else(|| key.to_string());

    let text = BODY_FIELDS
        .iter()
        .find_map(|name| record.get(name).and_then(Value::as_str))
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| IngestError::InvalidRecord {
            key: key.to_string(),
            message: "no body text".to_string(),
        })?
        .to_string();

    let filename = first_field(record, FILENAME_FIELDS)
        .or_else(|| {
            FILE_REF_FIELDS
                .iter()
                .filter_map(|name| record.get(name).and_then(Value::as_str))
                .find_map(strip_file_ref)
        })
        .unwrap_or_else(|| id.clone());

    let title = first_field(record, TITLE_FIELDS).unwrap_or_else(|| filename.clone());

    Ok(RawDocument {
        id,
        title,
        text,
        filename,
        group: group.to_string(),
        source_key: key.to_string(),
    })
}
