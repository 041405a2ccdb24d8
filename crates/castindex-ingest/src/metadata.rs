//! Resolution of documents to episode/show metadata.
//!
//! The filename token of a transcript encodes the show reference, show id,
//! episode number and title, e.g. `RSS_12345_podcast_67_EP3 標題`. The mapper
//! parses it, looks up candidate episodes in the metadata store and picks the
//! one whose title matches best.

use crate::error::{IngestError, IngestResult};
use castindex_db::Database;
use castindex_core::EpisodeMetadata;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use thiserror::Error;
use tracing::debug;

/// Candidate rows fetched per lookup strategy.
const CANDIDATE_LIMIT: usize = 200;

/// `PREFIX_{ref}_podcast_{id}_EP{n} title`
static RE_STRICT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<prefix>[A-Za-z]+)_(?P<ref>[A-Za-z0-9]+)_podcast_(?P<show>\d+)_EP(?P<ep>\d+)[ _-]+(?P<title>.+)$",
    )
    .expect("valid regex")
});

/// Any of `_`, `-` or space as separators, case-insensitive, episode optional.
static RE_RELAXED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?P<prefix>[a-z]+)[ _-]+(?P<ref>[a-z0-9]+)[ _-]+podcast[ _-]*(?P<show>\d+)(?:[ _-]*EP\.?[ ]?(?P<ep>\d+))?[ _-]+(?P<title>.+)$",
    )
    .expect("valid regex")
});

/// No show id: `PREFIX_{ref}_EP{n} title`
static RE_NO_SHOW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?P<prefix>[a-z]+)[ _-]+(?P<ref>[a-z0-9]+)[ _-]+EP\.?[ ]?(?P<ep>\d+)[ _-]+(?P<title>.+)$")
        .expect("valid regex")
});

/// A title that is only an episode marker, e.g. `EP3`.
static RE_EP_ONLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^EP\.?[ ]?\d+$").expect("valid regex"));

/// Fields recovered from a filename token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFilename {
    pub prefix: String,
    pub show_ref: String,
    pub show_id: Option<i64>,
    pub episode_number: Option<u32>,
    pub episode_title: String,
}

impl ParsedFilename {
    /// Try each pattern, strictest first.
    pub fn parse(filename: &str) -> Option<Self> {
        let filename = filename.trim();
        [&*RE_STRICT, &*RE_RELAXED, &*RE_NO_SHOW]
            .into_iter()
            .find_map(|re| re.captures(filename))
            .and_then(|caps| {
                let title = caps.name("title")?.as_str().trim().to_string();
                if title.is_empty() || RE_EP_ONLY.is_match(&title) {
                    return None;
                }
                Some(Self {
                    prefix: caps.name("prefix")?.as_str().to_string(),
                    show_ref: caps.name("ref")?.as_str().to_string(),
                    show_id: caps.name("show").and_then(|m| m.as_str().parse().ok()),
                    episode_number: caps.name("ep").and_then(|m| m.as_str().parse().ok()),
                    episode_title: title,
                })
            })
    }
}

/// Why a document could not be mapped to metadata.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("filename does not match any known pattern")]
    UnparsableFilename,

    #[error("no matching episode in the metadata store")]
    NotFound,

    #[error("metadata is missing required fields: {}", .0.join(", "))]
    Incomplete(Vec<&'static str>),
}

/// Lowercase and keep only letters and digits.
fn normalize_title(title: &str) -> String {
    title
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Similarity of two titles in [0, 1]; containment either way scores 1.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    let a = normalize_title(a);
    let b = normalize_title(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a.contains(&b) || b.contains(&a) {
        return 1.0;
    }
    strsim::jaro_winkler(&a, &b)
}

/// Resolves filename tokens to validated episode metadata.
pub struct MetadataMapper {
    db: Database,
    threshold: f64,
    cache: HashMap<(String, Option<String>), Result<EpisodeMetadata, Rejection>>,
}

impl MetadataMapper {
    pub fn new(db: Database, threshold: f64) -> Self {
        Self {
            db,
            threshold,
            cache: HashMap::new(),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// Resolve `filename` to complete metadata.
    ///
    /// `show_hint` (the document group) is used by the last lookup strategy
    /// to narrow title matches by show name. Rejections are returned as
    /// [`IngestError::MetadataRejected`]; store failures pass through.
    pub fn resolve(&mut self, filename: &str, show_hint: Option<&str>) -> IngestResult<EpisodeMetadata> {
        let key = (filename.to_string(), show_hint.map(str::to_string));
        let outcome = match self.cache.get(&key) {
            Some(outcome) => outcome.clone(),
            None => {
                let outcome = self.lookup(filename, show_hint)?;
                self.cache.insert(key, outcome.clone());
                outcome
            }
        };
        outcome.map_err(|reason| IngestError::MetadataRejected {
            filename: filename.to_string(),
            reason,
        })
    }

    fn lookup(
        &self,
        filename: &str,
        show_hint: Option<&str>,
    ) -> IngestResult<Result<EpisodeMetadata, Rejection>> {
        let Some(parsed) = ParsedFilename::parse(filename) else {
            return Ok(Err(Rejection::UnparsableFilename));
        };
        let title = parsed.episode_title.as_str();

        let mut found = self
            .best_match(title, self.db.candidates_by_show_ref(&parsed.show_ref, CANDIDATE_LIMIT)?)
            .map(|meta| (meta, "show_ref"));
        if found.is_none() {
            if let Some(show_id) = parsed.show_id {
                found = self
                    .best_match(title, self.db.candidates_by_show_id(show_id, CANDIDATE_LIMIT)?)
                    .map(|meta| (meta, "show_id"));
            }
        }
        if found.is_none() {
            found = self
                .best_match(title, self.title_candidates(title, show_hint)?)
                .map(|meta| (meta, "title"));
        }

        let Some((metadata, strategy)) = found else {
            debug!("No metadata for '{}'", filename);
            return Ok(Err(Rejection::NotFound));
        };
        debug!(
            "Resolved '{}' to episode {} via {}",
            filename, metadata.episode_id, strategy
        );

        let missing = metadata.missing_fields();
        if !missing.is_empty() {
            return Ok(Err(Rejection::Incomplete(missing)));
        }
        Ok(Ok(metadata))
    }

    /// Title candidates, restricted to shows resembling `show_hint` when given.
    fn title_candidates(&self, title: &str, show_hint: Option<&str>) -> IngestResult<Vec<EpisodeMetadata>> {
        let mut candidates = self.db.candidates_by_title(title, CANDIDATE_LIMIT)?;
        if let Some(hint) = show_hint.filter(|h| !h.trim().is_empty()) {
            for candidate in self.db.candidates_by_show_name(hint, CANDIDATE_LIMIT)? {
                if !candidates.iter().any(|c| c.episode_id == candidate.episode_id) {
                    candidates.push(candidate);
                }
            }
            candidates.retain(|c| title_similarity(&c.show_name, hint) >= self.threshold);
        }
        Ok(candidates)
    }

    /// Highest-scoring candidate at or above the threshold. Ties keep the first.
    fn best_match(&self, title: &str, candidates: Vec<EpisodeMetadata>) -> Option<EpisodeMetadata> {
        let mut best: Option<(f64, EpisodeMetadata)> = None;
        for candidate in candidates {
            let score = title_similarity(title, &candidate.episode_title);
            if score < self.threshold {
                continue;
            }
            if best.as_ref().map_or(true, |(top, _)| score > *top) {
                best = Some((score, candidate));
            }
        }
        best.map(|(_, meta)| meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use castindex_core::{Episode, Show};

    fn db() -> Database {
        let db = Database::open_in_memory().unwrap();
        let mut show = Show::new(67, "Money Talk");
        show.author = Some("Host".into());
        show.category = Some("Business".into());
        show.rss_link = Some("https://feeds.example.com/rss/12345".into());
        show.languages = Some("zh-TW".into());
        db.upsert_show(&show).unwrap();

        let mut sparse = Show::new(70, "Sparse Show");
        sparse.rss_link = Some("https://feeds.example.com/rss/999".into());
        db.upsert_show(&sparse).unwrap();

        let mut episode = Episode::new(3, 67, "標題");
        episode.created_at = Some("2024-01-01T00:00:00Z".into());
        db.upsert_episode(&episode).unwrap();
        let mut other = Episode::new(4, 67, "完全不同的一集");
        other.created_at = Some("2024-01-08T00:00:00Z".into());
        db.upsert_episode(&other).unwrap();
        db.upsert_episode(&Episode::new(9, 70, "Sparse Episode")).unwrap();
        db
    }

    #[test]
    fn test_parse_strict() {
        let parsed = ParsedFilename::parse("RSS_12345_podcast_67_EP3 標題").unwrap();
        assert_eq!(parsed.prefix, "RSS");
        assert_eq!(parsed.show_ref, "12345");
        assert_eq!(parsed.show_id, Some(67));
        assert_eq!(parsed.episode_number, Some(3));
        assert_eq!(parsed.episode_title, "標題");
    }

    #[test]
    fn test_parse_relaxed_variants() {
        let parsed = ParsedFilename::parse("RSS_12345_podcast_67 標題").unwrap();
        assert_eq!(parsed.show_id, Some(67));
        assert_eq!(parsed.episode_number, None);

        let parsed = ParsedFilename::parse("rss-12345-Podcast-67-ep.3 - 標題 上集").unwrap();
        assert_eq!(parsed.show_ref, "12345");
        assert_eq!(parsed.episode_number, Some(3));
        assert_eq!(parsed.episode_title, "標題 上集");

        let parsed = ParsedFilename::parse("RSS_12345_EP7 標題").unwrap();
        assert_eq!(parsed.show_id, None);
        assert_eq!(parsed.episode_number, Some(7));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(ParsedFilename::parse("just a title").is_none());
        assert!(ParsedFilename::parse("RSS_12345_podcast_67_EP3 ").is_none());
        assert!(ParsedFilename::parse("").is_none());
    }

    #[test]
    fn test_title_similarity() {
        assert_eq!(title_similarity("標題", "【EP3】標題！"), 1.0);
        assert!(title_similarity("Money talk weekly", "Money talks weekly") > 0.85);
        assert!(title_similarity("abc", "xyz") < 0.5);
        assert_eq!(title_similarity("", "x"), 0.0);
    }

    #[test]
    fn test_resolve_by_show_ref() {
        let mut mapper = MetadataMapper::new(db(), 0.85);
        let meta = mapper.resolve("RSS_12345_podcast_67_EP3 標題", None).unwrap();
        assert_eq!(meta.episode_id, 3);
        assert_eq!(meta.show_name, "Money Talk");
        assert_eq!(meta.language, "zh-TW");
    }

    #[test]
    fn test_resolve_by_show_id_when_ref_unknown() {
        let mut mapper = MetadataMapper::new(db(), 0.85);
        let meta = mapper.resolve("RSS_55555_podcast_67_EP4 完全不同的一集", None).unwrap();
        assert_eq!(meta.episode_id, 4);
    }

    #[test]
    fn test_resolve_by_title_with_group_hint() {
        let mut mapper = MetadataMapper::new(db(), 0.85);
        let meta = mapper
            .resolve("RSS_1_podcast_1_EP1 完全不同的一集", Some("Money Talk"))
            .unwrap();
        assert_eq!(meta.episode_id, 4);

        let err = mapper
            .resolve("RSS_1_podcast_1_EP1 完全不同的一集", Some("Unrelated"))
            .unwrap_err();
        assert!(matches!(
            err,
            IngestError::MetadataRejected { reason: Rejection::NotFound, .. }
        ));
    }

    #[test]
    fn test_rejections() {
        let mut mapper = MetadataMapper::new(db(), 0.85);
        let err = mapper.resolve("not a match", None).unwrap_err();
        assert!(matches!(
            err,
            IngestError::MetadataRejected { reason: Rejection::UnparsableFilename, .. }
        ));

        let err = mapper.resolve("RSS_999_podcast_70_EP1 Sparse Episode", None).unwrap_err();
        match err {
            IngestError::MetadataRejected { reason: Rejection::Incomplete(fields), .. } => {
                assert!(fields.contains(&"author"));
                assert!(fields.contains(&"created_at"));
            }
            other => panic!("unexpected: {:?}", other),
        }

        let err = mapper.resolve("RSS_12345_podcast_67_EP3 沒有這一集", None).unwrap_err();
        assert!(matches!(
            err,
            IngestError::MetadataRejected { reason: Rejection::NotFound, .. }
        ));
    }

    #[test]
    fn test_results_cached() {
        let db = db();
        let mut mapper = MetadataMapper::new(db.clone(), 0.85);
        mapper.resolve("RSS_12345_podcast_67_EP3 標題", None).unwrap();
        assert_eq!(mapper.cached(), 1);

        db.delete_show(67).unwrap();
        // Served from cache
        assert!(mapper.resolve("RSS_12345_podcast_67_EP3 標題", None).is_ok());
        assert_eq!(mapper.cached(), 1);
    }
}
