//! Document sources.
//!
//! A [`DocumentStore`] exposes groups of raw records; [`SourceReader`] pairs a
//! store with a [`TextNormalizer`] and yields cleaned [`RawDocument`]s.

mod json_dir;
mod record;

pub use json_dir::JsonDirStore;
pub use record::extract_document;

use crate::error::IngestResult;
use crate::normalize::TextNormalizer;
use castindex_core::RawDocument;
use tracing::debug;

/// Storage of raw transcript records, organized in named groups.
pub trait DocumentStore {
    /// All group names, sorted.
    fn groups(&self) -> IngestResult<Vec<String>>;

    /// Keys of the documents in `group`, sorted.
    fn list(&self, group: &str) -> IngestResult<Vec<String>>;

    /// Read and decode one document. The text is not normalized yet.
    fn read(&self, group: &str, key: &str) -> IngestResult<RawDocument>;
}

/// Reads documents from a store and normalizes them.
pub struct SourceReader {
    store: Box<dyn DocumentStore>,
    normalizer: Box<dyn TextNormalizer>,
}

impl SourceReader {
    pub fn new(store: Box<dyn DocumentStore>, normalizer: Box<dyn TextNormalizer>) -> Self {
        Self { store, normalizer }
    }

    pub fn groups(&self) -> IngestResult<Vec<String>> {
        self.store.groups()
    }

    pub fn keys(&self, group: &str) -> IngestResult<Vec<String>> {
        self.store.list(group)
    }

    /// Read one document and clean its text and filename token.
    pub fn read(&self, group: &str, key: &str) -> IngestResult<RawDocument> {
        let mut doc = self.store.read(group, key)?;
        doc.text = self.normalizer.normalize_text(&doc.text)?;
        doc.filename = self.normalizer.normalize_filename(&doc.filename)?;
        debug!(
            "Read {} ({} chars, filename '{}')",
            doc.source_id(),
            doc.text.chars().count(),
            doc.filename
        );
        Ok(doc)
    }

    /// Lazily read the documents `keys` of `group`.
    ///
    /// Each item pairs the store key with the read result, so one bad record
    /// does not end the sequence.
    pub fn documents<'a, I>(
        &'a self,
        group: &'a str,
        keys: I,
    ) -> impl Iterator<Item = (String, IngestResult<RawDocument>)> + 'a
    where
        I: IntoIterator<Item = String> + 'a,
        I::IntoIter: 'a,
    {
        keys.into_iter().map(move |key| {
            let result = self.read(group, &key);
            (key, result)
        })
    }
}
