//! Core domain types for castindex.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Identifier of a transcript document.
pub type DocumentId = String;

/// Identifier of a chunk (`{document_id}_{chunk_index}`).
pub type ChunkId = String;

/// Maximum number of tags (and tag vector slots) per chunk.
pub const MAX_TAGS: usize = 3;

/// Tag emitted when no strategy produces a confident result.
pub const OTHER_TAG: &str = "Other";

/// Build the progress identifier of a document within a group.
pub fn source_id(group: &str, key: &str) -> String {
    format!("{}/{}", group, key)
}

/// A cleaned transcript document read from the document store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDocument {
    pub id: DocumentId,
    pub title: String,
    pub text: String,
    /// Filename-like token used for metadata lookup.
    pub filename: String,
    pub group: String,
    /// Store-level key of the document within its group.
    pub source_key: String,
}

impl RawDocument {
    /// Identifier recorded in the progress store.
    pub fn source_id(&self) -> String {
        source_id(&self.group, &self.source_key)
    }
}

/// A bounded slice of a document's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChunk {
    pub id: ChunkId,
    pub document_id: DocumentId,
    pub chunk_index: u32,
    pub text: String,
    /// Length of `text` in characters.
    pub length: usize,
    /// Leading characters copied from the previous chunk.
    pub overlap_len: usize,
}

impl TextChunk {
    pub fn new(
        document_id: impl Into<DocumentId>,
        chunk_index: u32,
        text: impl Into<String>,
        overlap_len: usize,
    ) -> Self {
        let document_id = document_id.into();
        let text = text.into();
        Self {
            id: chunk_id(&document_id, chunk_index),
            length: text.chars().count(),
            document_id,
            chunk_index,
            text,
            overlap_len,
        }
    }

    /// The chunk text without the overlap prefix.
    pub fn body(&self) -> &str {
        match self.text.char_indices().nth(self.overlap_len) {
            Some((idx, _)) => &self.text[idx..],
            None if self.overlap_len == 0 => &self.text,
            None => "",
        }
    }

    /// Length of [`TextChunk::body`] in characters.
    pub fn body_len(&self) -> usize {
        self.length.saturating_sub(self.overlap_len)
    }
}

/// Deterministic chunk identifier.
pub fn chunk_id(document_id: &str, chunk_index: u32) -> ChunkId {
    format!("{}_{}", document_id, chunk_index)
}

/// Outcome of the layered tag extractor for one chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagExtractionResult {
    /// 1 to 3 distinct tags.
    pub tags: Vec<String>,
    pub confidence: f32,
    /// Name of the strategy that produced the tags.
    pub strategy: String,
    pub elapsed_ms: f64,
}

impl TagExtractionResult {
    /// Confidence attached to the `Other` floor.
    pub const OTHER_CONFIDENCE: f32 = 0.1;

    /// The guaranteed fallback result.
    pub fn other(elapsed_ms: f64) -> Self {
        Self {
            tags: vec![OTHER_TAG.to_string()],
            confidence: Self::OTHER_CONFIDENCE,
            strategy: "fallback_other".to_string(),
            elapsed_ms,
        }
    }

    pub fn is_other(&self) -> bool {
        self.tags.len() == 1 && self.tags[0] == OTHER_TAG
    }
}

/// Authoritative episode/show record resolved from the relational store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeMetadata {
    pub episode_id: i64,
    pub show_id: i64,
    pub episode_title: String,
    pub show_name: String,
    pub author: String,
    pub category: String,
    pub created_at: String,
    pub language: String,
}

impl EpisodeMetadata {
    /// Names of required fields that are zero or blank.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.episode_id == 0 {
            missing.push("episode_id");
        }
        if self.show_id == 0 {
            missing.push("show_id");
        }
        let strings = [
            ("episode_title", &self.episode_title),
            ("show_name", &self.show_name),
            ("author", &self.author),
            ("category", &self.category),
            ("created_at", &self.created_at),
            ("language", &self.language),
        ];
        for (name, value) in strings {
            if value.trim().is_empty() {
                missing.push(name);
            }
        }
        missing
    }

    /// Reject records with zero identifiers or empty required strings.
    pub fn validate(&self) -> Result<()> {
        let missing = self.missing_fields();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::IncompleteMetadata(missing))
        }
    }
}

/// A podcast show row from the relational store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Show {
    pub show_id: i64,
    pub name: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    /// RSS feed link; carries the show reference used in filenames.
    #[serde(default)]
    pub rss_link: Option<String>,
    /// Comma-separated language codes, primary first.
    #[serde(default)]
    pub languages: Option<String>,
}

impl Show {
    pub fn new(show_id: i64, name: impl Into<String>) -> Self {
        Self {
            show_id,
            name: name.into(),
            author: None,
            category: None,
            rss_link: None,
            languages: None,
        }
    }

    /// First language listed for the show.
    pub fn primary_language(&self) -> Option<&str> {
        primary_language(self.languages.as_deref())
    }
}

/// Pick the first non-blank entry of a comma-separated language list.
pub fn primary_language(languages: Option<&str>) -> Option<&str> {
    languages?
        .split(|c: char| c == ',' || c == ';')
        .map(str::trim)
        .find(|lang| !lang.is_empty())
}

/// An episode row from the relational store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    pub episode_id: i64,
    pub show_id: i64,
    pub title: String,
    #[serde(default)]
    pub published_date: Option<String>,
    /// Duration in seconds.
    #[serde(default)]
    pub duration: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Episode {
    pub fn new(episode_id: i64, show_id: i64, title: impl Into<String>) -> Self {
        Self {
            episode_id,
            show_id,
            title: title.into(),
            published_date: None,
            duration: None,
            description: None,
            created_at: None,
        }
    }
}

/// One row of the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub chunk_id: ChunkId,
    pub chunk_index: u32,
    pub document_id: DocumentId,
    pub show_id: i64,
    pub episode_id: i64,
    pub episode_title: String,
    pub show_name: String,
    pub author: String,
    pub category: String,
    pub language: String,
    pub created_at: String,
    pub chunk_text: String,
    pub embedding: Vec<f32>,
    /// Always three slots; unused slots repeat `embedding`.
    pub tag_vectors: [Vec<f32>; MAX_TAGS],
    pub tags: Vec<String>,
    pub model: String,
}

impl EmbeddingRecord {
    /// Join a chunk with its metadata and vectors.
    pub fn assemble(
        chunk: &TextChunk,
        metadata: &EpisodeMetadata,
        embedding: Vec<f32>,
        tag_vectors: [Vec<f32>; MAX_TAGS],
        tags: Vec<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            chunk_id: chunk.id.clone(),
            chunk_index: chunk.chunk_index,
            document_id: chunk.document_id.clone(),
            show_id: metadata.show_id,
            episode_id: metadata.episode_id,
            episode_title: metadata.episode_title.clone(),
            show_name: metadata.show_name.clone(),
            author: metadata.author.clone(),
            category: metadata.category.clone(),
            language: metadata.language.clone(),
            created_at: metadata.created_at.clone(),
            chunk_text: chunk.text.clone(),
            embedding,
            tag_vectors,
            tags,
            model: model.into(),
        }
    }
}

/// Durable record of processed source documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingProgress {
    pub processed_ids: BTreeSet<String>,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub total_processed: usize,
}

impl Default for ProcessingProgress {
    fn default() -> Self {
        Self {
            processed_ids: BTreeSet::new(),
            last_updated: Utc::now(),
            total_processed: 0,
        }
    }
}

impl ProcessingProgress {
    pub fn is_processed(&self, source_id: &str) -> bool {
        self.processed_ids.contains(source_id)
    }

    /// Record a processed id. Returns false if it was already present.
    pub fn mark(&mut self, source_id: impl Into<String>) -> bool {
        let inserted = self.processed_ids.insert(source_id.into());
        self.total_processed = self.processed_ids.len();
        self.last_updated = Utc::now();
        inserted
    }

    /// Forget every id that belongs to `group`. Returns how many were removed.
    pub fn reset_group(&mut self, group: &str) -> usize {
        let prefix = format!("{}/", group);
        let before = self.processed_ids.len();
        self.processed_ids.retain(|id| !id.starts_with(&prefix));
        self.total_processed = self.processed_ids.len();
        self.last_updated = Utc::now();
        before - self.processed_ids.len()
    }

    pub fn count_in_group(&self, group: &str) -> usize {
        let prefix = format!("{}/", group);
        self.processed_ids
            .iter()
            .filter(|id| id.starts_with(&prefix))
            .count()
    }
}

/// Failure classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// A store or service was unreachable.
    Connection,
    /// Metadata incomplete or filename unparsable; not retried.
    Validation,
    /// Chunking, tagging or embedding failed.
    Processing,
    /// Vector index write failed after retrying.
    Write,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Connection => "connection",
            ErrorKind::Validation => "validation",
            ErrorKind::Processing => "processing",
            ErrorKind::Write => "write",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "connection" => Some(ErrorKind::Connection),
            "validation" => Some(ErrorKind::Validation),
            "processing" => Some(ErrorKind::Processing),
            "write" => Some(ErrorKind::Write),
            _ => None,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Pipeline stage at which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Read,
    Chunk,
    Metadata,
    Tag,
    Embed,
    Write,
    Progress,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Read => "read",
            Stage::Chunk => "chunk",
            Stage::Metadata => "metadata",
            Stage::Tag => "tag",
            Stage::Embed => "embed",
            Stage::Write => "write",
            Stage::Progress => "progress",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A replayable failure entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub group: String,
    pub document_id: String,
    pub title: String,
    pub kind: ErrorKind,
    pub message: String,
    pub stage: Stage,
    pub timestamp: DateTime<Utc>,
    pub retry_count: u32,
}

impl ErrorRecord {
    pub fn new(
        group: impl Into<String>,
        document_id: impl Into<String>,
        kind: ErrorKind,
        stage: Stage,
        message: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            document_id: document_id.into(),
            title: String::new(),
            kind,
            message: message.into(),
            stage,
            timestamp: Utc::now(),
            retry_count: 0,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_metadata() -> EpisodeMetadata {
        EpisodeMetadata {
            episode_id: 11,
            show_id: 67,
            episode_title: "標題".to_string(),
            show_name: "Money Talk".to_string(),
            author: "Host".to_string(),
            category: "Business".to_string(),
            created_at: "2024-01-01T00:00:00Z".to_string(),
            language: "zh-TW".to_string(),
        }
    }

    #[test]
    fn test_chunk_id_is_deterministic() {
        let chunk = TextChunk::new("doc-1", 4, "hello", 0);
        assert_eq!(chunk.id, "doc-1_4");
        assert_eq!(chunk.length, 5);
    }

    #[test]
    fn test_chunk_body_skips_overlap_chars() {
        let chunk = TextChunk::new("doc", 1, "股票投資 rest", 2);
        assert_eq!(chunk.body(), "投資 rest");
        assert_eq!(chunk.body_len(), 7);
    }

    #[test]
    fn test_metadata_validation_accepts_complete_record() {
        assert!(complete_metadata().validate().is_ok());
    }

    #[test]
    fn test_metadata_validation_rejects_zero_ids_and_blank_strings() {
        let mut meta = complete_metadata();
        meta.episode_id = 0;
        meta.author = "  ".to_string();
        let missing = meta.missing_fields();
        assert_eq!(missing, vec!["episode_id", "author"]);
        assert!(meta.validate().is_err());

        let mut meta = complete_metadata();
        meta.show_id = 0;
        assert!(meta.validate().is_err());

        let mut meta = complete_metadata();
        meta.language.clear();
        assert!(meta.validate().is_err());
    }

    #[test]
    fn test_progress_mark_and_reset() {
        let mut progress = ProcessingProgress::default();
        assert!(progress.mark(source_id("show-a", "1")));
        assert!(!progress.mark(source_id("show-a", "1")));
        progress.mark(source_id("show-b", "2"));
        assert_eq!(progress.total_processed, 2);
        assert!(progress.is_processed("show-a/1"));

        assert_eq!(progress.reset_group("show-a"), 1);
        assert!(!progress.is_processed("show-a/1"));
        assert_eq!(progress.count_in_group("show-b"), 1);
    }

    #[test]
    fn test_error_kind_roundtrip_names() {
        for kind in [
            ErrorKind::Connection,
            ErrorKind::Validation,
            ErrorKind::Processing,
            ErrorKind::Write,
        ] {
            assert_eq!(ErrorKind::from_str(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn test_primary_language() {
        assert_eq!(primary_language(Some(" zh-TW, en")), Some("zh-TW"));
        assert_eq!(primary_language(Some(" , en")), Some("en"));
        assert_eq!(primary_language(Some("")), None);
        assert_eq!(primary_language(None), None);
    }

    #[test]
    fn test_other_result_is_floor() {
        let result = TagExtractionResult::other(0.0);
        assert!(result.is_other());
        assert_eq!(result.tags.len(), 1);
    }
}
