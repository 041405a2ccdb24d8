//! Batch orchestrator.
//!
//! For every requested group the [`Pipeline`] lists pending documents, reads
//! them lazily and runs each one through chunk, metadata, tag, embed and
//! write. The chunks of a document are embedded in one batch request. A
//! document is marked processed only after its records are written, and the
//! progress store persists that mark before the next document starts.
//! Failures are recorded with the stage they happened in and never stop the
//! run.

use crate::chunker::{ChunkConfig, Chunker};
use crate::error::{IngestError, IngestResult};
use crate::error_log::{ErrorExport, ErrorLogger, ErrorSummary};
use crate::metadata::MetadataMapper;
use crate::normalize::FallbackNormalizer;
use crate::progress::{open_progress_store, ProgressStore};
use crate::source::{JsonDirStore, SourceReader};
use crate::tagging::TagExtractor;
use castindex_config::{AppPaths, Config};
use castindex_core::{source_id, EmbeddingRecord, ErrorRecord, RawDocument, Stage, TextChunk};
use castindex_db::Database;
use castindex_embed::EmbeddingProcessor;
use castindex_index::{open_index, CollectionSchema, IndexError, IndexWriter};
use serde::Serialize;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Counters for one group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GroupStats {
    /// Pending documents the run tried to process.
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Documents already marked processed before the run.
    pub skipped: usize,
    pub chunks_written: usize,
    pub tags_assigned: usize,
}

impl GroupStats {
    fn absorb(&mut self, other: &GroupStats) {
        self.attempted += other.attempted;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.chunks_written += other.chunks_written;
        self.tags_assigned += other.tags_assigned;
    }
}

/// Result of [`Pipeline::run`].
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub groups: Vec<(String, GroupStats)>,
    pub totals: GroupStats,
    pub elapsed: Duration,
    pub errors: ErrorSummary,
    pub export: Option<ErrorExport>,
}

/// Hooks for progress display.
pub trait PipelineObserver {
    fn group_started(&mut self, _group: &str, _pending: usize) {}

    fn document_finished(&mut self, _group: &str, _source_id: &str, _succeeded: bool) {}

    fn group_finished(&mut self, _group: &str, _stats: &GroupStats) {}
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

/// Everything a run needs, assembled once.
pub struct PipelineComponents {
    pub reader: SourceReader,
    pub chunker: Chunker,
    pub tagger: TagExtractor,
    pub mapper: MetadataMapper,
    pub embedder: EmbeddingProcessor,
    pub writer: IndexWriter,
    pub progress: Box<dyn ProgressStore>,
    pub errors: ErrorLogger,
    /// Where error exports are written.
    pub error_dir: PathBuf,
}

impl PipelineComponents {
    /// Build the production components described by `config`.
    pub fn from_config(config: &Config, paths: &AppPaths) -> IngestResult<Self> {
        let store = JsonDirStore::new(config.source_root(), &config.source.file_pattern)?;
        let normalizer = FallbackNormalizer::new(config.source.normalizer_command.as_deref());
        let reader = SourceReader::new(Box::new(store), Box::new(normalizer));

        let chunker = Chunker::new(ChunkConfig::from_chunking_config(&config.chunking));
        let tagger = TagExtractor::from_config(&config.tagging)?;

        let db = Database::open(config.metadata_database(paths))?;
        let mapper = MetadataMapper::new(db, config.metadata.title_similarity);

        let retry = config.retry.policy();
        let embedder = EmbeddingProcessor::from_config(&config.embedding, retry)?;

        let index = open_index(&config.index, &config.index_file(paths))?;
        let schema = CollectionSchema::from_config(&config.index, config.embedding.dimension)?;
        let writer = IndexWriter::new(index, schema, config.index.batch_size).with_retry(retry);

        let progress = open_progress_store(
            &config.progress_file(paths),
            &config.output.progress_format,
        )?;

        Ok(Self {
            reader,
            chunker,
            tagger,
            mapper,
            embedder,
            writer,
            progress,
            errors: ErrorLogger::new(),
            error_dir: config.error_dir(paths),
        })
    }
}

/// Outcome of one successfully processed document.
struct DocumentResult {
    chunks_written: usize,
    tags_assigned: usize,
}

/// Failure records for one document, not yet logged.
struct DocumentFailure(Vec<ErrorRecord>);

impl DocumentFailure {
    fn single(group: &str, id: &str, title: &str, stage: Stage, err: &IngestError) -> Self {
        let retries = match err {
            IngestError::Index(IndexError::Write { retries, .. }) => *retries,
            _ => 0,
        };
        Self(vec![ErrorRecord::new(group, id, err.kind(), stage, err.to_string())
            .with_title(title)
            .with_retry_count(retries)])
    }
}

/// The batch orchestrator.
pub struct Pipeline {
    components: PipelineComponents,
    row_limit: Option<usize>,
    observer: Box<dyn PipelineObserver>,
}

impl Pipeline {
    /// `row_limit` caps the pending documents taken from each group.
    pub fn new(components: PipelineComponents, row_limit: Option<usize>) -> Self {
        Self {
            components,
            row_limit,
            observer: Box::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: Box<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn components(&self) -> &PipelineComponents {
        &self.components
    }

    pub fn errors(&self) -> &ErrorLogger {
        &self.components.errors
    }

    pub fn into_components(self) -> PipelineComponents {
        self.components
    }

    /// Process every group in order and export errors if any were recorded.
    /// An empty `groups` list means every group in the document store.
    ///
    /// Fails only when the index collection cannot be prepared or the store's
    /// groups cannot be listed; per-document failures end up in the error log.
    pub fn run(&mut self, groups: &[String]) -> IngestResult<RunSummary> {
        let start = Instant::now();
        if self.components.writer.ensure_collection()? {
            info!("Created collection {}", self.components.writer.schema().name);
        }

        let groups = if groups.is_empty() {
            let all = self.components.reader.groups()?;
            info!("No groups given, processing all {} in the store", all.len());
            all
        } else {
            groups.to_vec()
        };

        let mut summary_groups = Vec::with_capacity(groups.len());
        let mut totals = GroupStats::default();
        for group in &groups {
            let stats = self.run_group(group);
            totals.absorb(&stats);
            summary_groups.push((group.clone(), stats));
        }

        let errors = self.components.errors.summary();
        let export = if self.components.errors.is_empty() {
            None
        } else {
            match self.components.errors.export(&self.components.error_dir) {
                Ok(export) => Some(export),
                Err(e) => {
                    warn!("Failed to export error log: {}", e);
                    None
                }
            }
        };

        let elapsed = start.elapsed();
        info!(
            "Run finished in {:.1}s: {} succeeded, {} failed, {} skipped, {} chunks written",
            elapsed.as_secs_f64(),
            totals.succeeded,
            totals.failed,
            totals.skipped,
            totals.chunks_written
        );
        Ok(RunSummary {
            groups: summary_groups,
            totals,
            elapsed,
            errors,
            export,
        })
    }

    /// Process the pending documents of one group.
    pub fn run_group(&mut self, group: &str) -> GroupStats {
        let mut stats = GroupStats::default();
        let c = &mut self.components;

        let keys = match c.reader.keys(group) {
            Ok(keys) => keys,
            Err(e) => {
                c.errors.record(ErrorRecord::new(
                    group,
                    group,
                    e.kind(),
                    Stage::Read,
                    e.to_string(),
                ));
                return stats;
            }
        };

        let mut pending = Vec::new();
        for key in keys {
            if c.progress.is_processed(&source_id(group, &key)) {
                stats.skipped += 1;
            } else {
                pending.push(key);
            }
        }
        if let Some(limit) = self.row_limit {
            pending.truncate(limit);
        }

        info!(
            "[{}] {} pending, {} already processed",
            group,
            pending.len(),
            stats.skipped
        );
        self.observer.group_started(group, pending.len());

        let mut stages = Stages {
            chunker: &c.chunker,
            tagger: &c.tagger,
            mapper: &mut c.mapper,
            embedder: &c.embedder,
            writer: &mut c.writer,
            progress: &mut c.progress,
        };
        for (key, read) in c.reader.documents(group, pending) {
            let id = source_id(group, &key);
            stats.attempted += 1;
            let succeeded = match stages.process(group, &id, read) {
                Ok(result) => {
                    stats.succeeded += 1;
                    stats.chunks_written += result.chunks_written;
                    stats.tags_assigned += result.tags_assigned;
                    true
                }
                Err(DocumentFailure(records)) => {
                    stats.failed += 1;
                    for record in records {
                        c.errors.record(record);
                    }
                    false
                }
            };
            self.observer.document_finished(group, &id, succeeded);
        }

        self.observer.group_finished(group, &stats);
        stats
    }
}

/// The stages after reading, borrowed from [`PipelineComponents`].
struct Stages<'a> {
    chunker: &'a Chunker,
    tagger: &'a TagExtractor,
    mapper: &'a mut MetadataMapper,
    embedder: &'a EmbeddingProcessor,
    writer: &'a mut IndexWriter,
    progress: &'a mut Box<dyn ProgressStore>,
}

impl Stages<'_> {
    fn process(
        &mut self,
        group: &str,
        id: &str,
        read: IngestResult<RawDocument>,
    ) -> Result<DocumentResult, DocumentFailure> {
        let doc = read.map_err(|e| DocumentFailure::single(group, id, "", Stage::Read, &e))?;
        let fail = |stage: Stage, e: IngestError| {
            DocumentFailure::single(group, id, &doc.title, stage, &e)
        };

        let chunks = self.chunker.chunk_text(&doc.id, &doc.text);
        if chunks.is_empty() {
            debug!("{} has no content, marking processed", id);
            self.progress
                .mark_processed(id)
                .map_err(|e| fail(Stage::Progress, e))?;
            return Ok(DocumentResult {
                chunks_written: 0,
                tags_assigned: 0,
            });
        }

        let mut resolved = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            let metadata = self
                .mapper
                .resolve(&doc.filename, Some(group))
                .map_err(|e| fail(Stage::Metadata, e))?;

            let tagged = self.tagger.extract(&chunk.text);
            debug!(
                "{} tagged {:?} by {} ({:.2})",
                chunk.id, tagged.tags, tagged.strategy, tagged.confidence
            );
            resolved.push((metadata, tagged.tags));
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = match self.embedder.encode_batch(&texts) {
            Ok(embeddings) => embeddings,
            Err(e) => {
                debug!("{} batch encode failed ({}), locating failing chunks", id, e);
                let failures = chunk_failures(self.embedder, &chunks, group, id, &doc.title);
                return Err(if failures.is_empty() {
                    fail(Stage::Embed, e.into())
                } else {
                    DocumentFailure(failures)
                });
            }
        };
        let tags: Vec<Vec<String>> = resolved.iter().map(|(_, tags)| tags.clone()).collect();
        let tag_vectors = self
            .embedder
            .tag_vectors_batch(&embeddings, &tags)
            .map_err(|e| fail(Stage::Embed, e.into()))?;

        let mut tags_assigned = 0;
        let mut records = Vec::with_capacity(chunks.len());
        for (((chunk, (metadata, tags)), embedding), slots) in
            chunks.iter().zip(resolved).zip(embeddings).zip(tag_vectors)
        {
            tags_assigned += tags.len();
            records.push(EmbeddingRecord::assemble(
                chunk,
                &metadata,
                embedding,
                slots,
                tags,
                self.embedder.model_name(),
            ));
        }

        let report = self
            .writer
            .write(&records)
            .map_err(|e| fail(Stage::Write, e.into()))?;
        self.progress
            .mark_processed(id)
            .map_err(|e| fail(Stage::Progress, e))?;

        debug!("{} ({}) wrote {} chunks", id, doc.title, report.rows);
        Ok(DocumentResult {
            chunks_written: report.rows,
            tags_assigned,
        })
    }
}

/// Encode chunks one at a time to find the ones the model rejects.
fn chunk_failures(
    embedder: &EmbeddingProcessor,
    chunks: &[TextChunk],
    group: &str,
    id: &str,
    title: &str,
) -> Vec<ErrorRecord> {
    chunks
        .iter()
        .filter_map(|chunk| {
            let e = embedder.encode(&chunk.text).err()?;
            let e = IngestError::from(e);
            Some(
                ErrorRecord::new(
                    group,
                    id,
                    e.kind(),
                    Stage::Embed,
                    format!("chunk {}: {}", chunk.chunk_index, e),
                )
                .with_title(title),
            )
        })
        .collect()
}
