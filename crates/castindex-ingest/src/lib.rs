//! Castindex Ingest - Transcript ingestion and indexing pipeline.
//!
//! This crate provides:
//! - Document source reading and text normalization
//! - Chunking of transcripts into bounded, overlapping segments
//! - Layered topical tagging
//! - Resolution of documents to episode/show metadata
//! - Resumable progress tracking and structured error logging
//! - The batch orchestrator tying it all together

mod chunker;
mod error;
pub mod error_log;
pub mod metadata;
mod normalize;
pub mod pipeline;
pub mod progress;
pub mod source;
pub mod tagging;

pub use chunker::{ChunkConfig, ChunkUnit, Chunker};
pub use error::{IngestError, IngestResult};
pub use error_log::{ErrorExport, ErrorLogger, ErrorSummary};
pub use metadata::{MetadataMapper, ParsedFilename, Rejection};
pub use normalize::{BasicNormalizer, CommandNormalizer, FallbackNormalizer, TextNormalizer};
pub use pipeline::{
    GroupStats, NoopObserver, Pipeline, PipelineComponents, PipelineObserver, RunSummary,
};
pub use progress::{open_progress_store, JsonProgressFile, ProgressLog, ProgressStore};
pub use source::{DocumentStore, JsonDirStore, SourceReader};
pub use tagging::{TagExtractor, TagStrategy};
