//! Layered tag extraction.
//!
//! Strategies are tried in order; the first whose confidence exceeds the
//! threshold wins. When none does, or the text is empty, the chunk is tagged
//! `Other`.

pub mod keywords;
pub mod mapping;
pub mod terms;

pub use mapping::{MappingTable, TagMapping};
pub use terms::TermList;

use crate::error::IngestResult;
use castindex_config::TaggingConfig;
use castindex_core::{TagExtractionResult, MAX_TAGS};
use std::time::Instant;
use tracing::{debug, info};

/// One tag extraction strategy.
#[derive(Debug, Clone)]
pub enum TagStrategy {
    /// Tag/category table matched by substring containment.
    CuratedMapping(MappingTable),
    /// Proper nouns and jargon, every hit is a tag.
    CuratedTerms(TermList),
    /// Broad topic categories by keyword.
    KeywordCategories,
}

impl TagStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            TagStrategy::CuratedMapping(_) => "curated_mapping",
            TagStrategy::CuratedTerms(_) => "curated_terms",
            TagStrategy::KeywordCategories => "keyword_categories",
        }
    }

    /// Tags and confidence for lowercased text, if anything matched.
    pub fn apply(&self, lowered: &str, max_tags: usize) -> Option<(Vec<String>, f32)> {
        match self {
            TagStrategy::CuratedMapping(table) => table.match_text(lowered, max_tags),
            TagStrategy::CuratedTerms(list) => list.match_text(lowered, max_tags),
            TagStrategy::KeywordCategories => keywords::match_text(lowered, max_tags),
        }
    }
}

/// Runs strategies in order until one is confident enough.
#[derive(Debug, Clone)]
pub struct TagExtractor {
    strategies: Vec<TagStrategy>,
    threshold: f32,
    max_tags: usize,
}

impl Default for TagExtractor {
    fn default() -> Self {
        Self::new(Self::default_strategies(), 0.3, MAX_TAGS)
    }
}

impl TagExtractor {
    pub fn new(strategies: Vec<TagStrategy>, threshold: f32, max_tags: usize) -> Self {
        Self {
            strategies,
            threshold,
            max_tags: max_tags.clamp(1, MAX_TAGS),
        }
    }

    /// Mapping, then terms, then keyword categories, with built-in tables.
    pub fn default_strategies() -> Vec<TagStrategy> {
        vec![
            TagStrategy::CuratedMapping(MappingTable::builtin()),
            TagStrategy::CuratedTerms(TermList::builtin()),
            TagStrategy::KeywordCategories,
        ]
    }

    /// Build from config, loading replacement tables from files when set.
    pub fn from_config(config: &TaggingConfig) -> IngestResult<Self> {
        let mapping = match config.mapping_path() {
            Some(path) => {
                let table = MappingTable::from_csv_path(&path)?;
                info!("Loaded {} tag mappings from {}", table.entries().len(), path.display());
                table
            }
            None => MappingTable::builtin(),
        };
        let terms = match config.terms_path() {
            Some(path) => {
                let list = TermList::from_file(&path)?;
                info!("Loaded {} curated terms from {}", list.len(), path.display());
                list
            }
            None => TermList::builtin(),
        };

        Ok(Self::new(
            vec![
                TagStrategy::CuratedMapping(mapping),
                TagStrategy::CuratedTerms(terms),
                TagStrategy::KeywordCategories,
            ],
            config.confidence_threshold,
            config.max_tags,
        ))
    }

    pub fn strategies(&self) -> &[TagStrategy] {
        &self.strategies
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Tag one chunk of text. Always returns 1 to 3 tags.
    pub fn extract(&self, text: &str) -> TagExtractionResult {
        let start = Instant::now();
        let elapsed = |start: Instant| start.elapsed().as_secs_f64() * 1000.0;

        if text.trim().is_empty() {
            return TagExtractionResult::other(elapsed(start));
        }

        let lowered = text.to_lowercase();
        for strategy in &self.strategies {
            let Some((mut tags, confidence)) = strategy.apply(&lowered, self.max_tags) else {
                continue;
            };
            if confidence <= self.threshold {
                debug!(
                    "{} below threshold ({:.2} <= {:.2})",
                    strategy.name(),
                    confidence,
                    self.threshold
                );
                continue;
            }

            let mut seen = Vec::with_capacity(tags.len());
            tags.retain(|t| {
                let fresh = !seen.contains(t);
                if fresh {
                    seen.push(t.clone());
                }
                fresh
            });
            tags.truncate(self.max_tags);
            if tags.is_empty() {
                continue;
            }

            return TagExtractionResult {
                tags,
                confidence: confidence.clamp(0.0, 1.0),
                strategy: strategy.name().to_string(),
                elapsed_ms: elapsed(start),
            };
        }

        TagExtractionResult::other(elapsed(start))
    }
}
