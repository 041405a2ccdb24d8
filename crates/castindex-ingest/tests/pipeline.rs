//! End-to-end runs of the orchestrator over a directory of JSON transcripts.

use castindex_core::{Episode, ErrorKind, RawDocument, RetryPolicy, Show, Stage};
use castindex_db::Database;
use castindex_embed::{EmbedError, EmbedResult, Embedder, EmbeddingProcessor};
use castindex_index::schema::TAGS;
use castindex_index::{
    CollectionSchema, ColumnBatch, IndexError, IndexResult, IndexWriter, SqliteIndex, VectorIndex,
};
use castindex_ingest::{
    BasicNormalizer, ChunkConfig, ChunkUnit, Chunker, DocumentStore, ErrorLogger, IngestResult,
    JsonDirStore, JsonProgressFile, MetadataMapper, Pipeline, PipelineComponents, ProgressStore,
    SourceReader, TagExtractor,
};
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tempfile::TempDir;

const DIM: usize = 4;
const FINANCE_FILE: &str = "RSS_12345_podcast_67_EP3 股票投資入門";

/// Deterministic embedder; texts containing `壞掉` fail.
struct StubEmbedder {
    counters: Shared,
}

impl Embedder for StubEmbedder {
    fn model_name(&self) -> &str {
        "stub-embed"
    }

    fn embed_batch(&self, texts: &[String]) -> EmbedResult<Vec<Vec<f32>>> {
        self.counters.borrow_mut().embed_calls += 1;
        texts
            .iter()
            .map(|text| {
                if text.contains("壞掉") {
                    return Err(EmbedError::ApiError {
                        status: 500,
                        message: "model crashed".to_string(),
                    });
                }
                let sum: u32 = text.chars().map(u32::from).sum();
                Ok(vec![
                    text.chars().count() as f32 + 1.0,
                    (sum % 97) as f32 + 1.0,
                    1.0,
                    2.0,
                ])
            })
            .collect()
    }
}

#[derive(Default)]
struct Counters {
    reads: usize,
    upserts: usize,
    embed_calls: usize,
    tags: Vec<String>,
    fail_writes: bool,
}

type Shared = Rc<RefCell<Counters>>;

struct CountingStore {
    inner: JsonDirStore,
    counters: Shared,
}

impl DocumentStore for CountingStore {
    fn groups(&self) -> IngestResult<Vec<String>> {
        self.inner.groups()
    }

    fn list(&self, group: &str) -> IngestResult<Vec<String>> {
        self.inner.list(group)
    }

    fn read(&self, group: &str, key: &str) -> IngestResult<RawDocument> {
        self.counters.borrow_mut().reads += 1;
        self.inner.read(group, key)
    }
}

/// SQLite index that records upserts and can be told to reject them.
struct RecordingIndex {
    inner: SqliteIndex,
    counters: Shared,
}

impl VectorIndex for RecordingIndex {
    fn backend(&self) -> &'static str {
        "recording"
    }

    fn collection(&self) -> &str {
        self.inner.collection()
    }

    fn has_collection(&self) -> IndexResult<bool> {
        self.inner.has_collection()
    }

    fn create_collection(&mut self, schema: &CollectionSchema) -> IndexResult<()> {
        self.inner.create_collection(schema)
    }

    fn drop_collection(&mut self) -> IndexResult<()> {
        self.inner.drop_collection()
    }

    fn clear(&mut self) -> IndexResult<()> {
        self.inner.clear()
    }

    fn load(&mut self) -> IndexResult<()> {
        self.inner.load()
    }

    fn row_count(&self) -> IndexResult<u64> {
        self.inner.row_count()
    }

    fn upsert(&mut self, batch: &ColumnBatch) -> IndexResult<usize> {
        let mut counters = self.counters.borrow_mut();
        counters.upserts += 1;
        if counters.fail_writes {
            return Err(IndexError::Api {
                code: 1100,
                message: "collection is read-only".to_string(),
            });
        }
        counters.tags.extend(batch.strings(TAGS)?.iter().cloned());
        drop(counters);
        self.inner.upsert(batch)
    }

    fn reconnect(&mut self) -> IndexResult<()> {
        self.inner.reconnect()
    }
}

struct Fixture {
    dir: TempDir,
    db: Database,
    counters: Shared,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("docs")).unwrap();

        let db = Database::open_in_memory().unwrap();
        let mut show = Show::new(67, "Money Talk");
        show.author = Some("主持人".to_string());
        show.category = Some("Business".to_string());
        show.rss_link = Some("https://feeds.example.com/rss/12345".to_string());
        show.languages = Some("zh-TW,en".to_string());
        db.upsert_show(&show).unwrap();
        let mut episode = Episode::new(11, 67, "股票投資入門");
        episode.created_at = Some("2024-01-01T00:00:00Z".to_string());
        db.upsert_episode(&episode).unwrap();

        Self {
            dir,
            db,
            counters: Shared::default(),
        }
    }

    fn root(&self) -> PathBuf {
        self.dir.path().join("docs")
    }

    fn state(&self) -> PathBuf {
        self.dir.path().join("state")
    }

    fn add_doc(&self, group: &str, key: &str, filename: &str, text: &str) {
        let group_dir = self.root().join(group);
        fs::create_dir_all(&group_dir).unwrap();
        let record = serde_json::json!({
            "_id": key,
            "title": format!("title of {}", key),
            "text": text,
            "filename": filename,
        });
        fs::write(group_dir.join(format!("{}.json", key)), record.to_string()).unwrap();
    }

    fn components(&self, chunk: ChunkConfig) -> PipelineComponents {
        let store = CountingStore {
            inner: JsonDirStore::new(self.root(), "*.json").unwrap(),
            counters: self.counters.clone(),
        };
        let index = RecordingIndex {
            inner: SqliteIndex::open(&self.state().join("index.db"), "transcripts").unwrap(),
            counters: self.counters.clone(),
        };
        let schema = CollectionSchema::chunks("transcripts", DIM).unwrap();

        PipelineComponents {
            reader: SourceReader::new(Box::new(store), Box::new(BasicNormalizer)),
            chunker: Chunker::new(chunk),
            tagger: TagExtractor::default(),
            mapper: MetadataMapper::new(self.db.clone(), 0.85),
            embedder: EmbeddingProcessor::new(
                Box::new(StubEmbedder {
                    counters: self.counters.clone(),
                }),
                DIM,
                8,
            )
            .with_retry(RetryPolicy::none()),
            writer: IndexWriter::new(Box::new(index), schema, 2)
                .with_retry(RetryPolicy::immediate(1)),
            progress: Box::new(JsonProgressFile::open(self.progress_path()).unwrap()),
            errors: ErrorLogger::new(),
            error_dir: self.state().join("errors"),
        }
    }

    fn pipeline(&self) -> Pipeline {
        Pipeline::new(self.components(ChunkConfig::default()), None)
    }

    fn progress_path(&self) -> PathBuf {
        self.state().join("progress.json")
    }

    fn row_count(&self) -> u64 {
        SqliteIndex::open(&self.state().join("index.db"), "transcripts")
            .unwrap()
            .row_count()
            .unwrap()
    }
}

fn groups(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn count_files(dir: &Path, extension: &str) -> usize {
    fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().extension().is_some_and(|ext| ext == extension))
                .count()
        })
        .unwrap_or(0)
}

#[test]
fn test_finance_document_is_indexed_with_mapping_tag() {
    let fx = Fixture::new();
    fx.add_doc("money", "ep3", FINANCE_FILE, "今天來聊股票，也談談長期投資。");

    let mut pipeline = fx.pipeline();
    let summary = pipeline.run(&groups(&["money"])).unwrap();

    assert_eq!(summary.totals.attempted, 1);
    assert_eq!(summary.totals.succeeded, 1);
    assert_eq!(summary.totals.failed, 0);
    assert_eq!(summary.totals.chunks_written, 1);
    assert!(summary.totals.tags_assigned >= 1);
    assert!(summary.export.is_none());
    assert_eq!(summary.errors.total, 0);

    let tags = fx.counters.borrow().tags.clone();
    assert_eq!(tags.len(), 1);
    assert!(tags[0].starts_with("投資理財"), "{:?}", tags);
    assert_eq!(fx.row_count(), 1);

    let progress = JsonProgressFile::open(fx.progress_path()).unwrap();
    assert!(progress.is_processed("money/ep3"));
}

#[test]
fn test_records_written_equal_valid_chunks() {
    let fx = Fixture::new();
    let text = "第一行講股票\n第二行講基金\n第三行講債券\n第四行講存股\n第五行講投資";
    fx.add_doc("money", "ep3", FINANCE_FILE, text);

    let chunk = ChunkConfig {
        max_chunk_size: 14,
        overlap: 3,
        unit: ChunkUnit::Line,
    };
    let expected = Chunker::new(chunk.clone())
        .chunk_text(&"ep3".to_string(), text)
        .len();
    assert!(expected > 1);

    let mut pipeline = Pipeline::new(fx.components(chunk), None);
    let summary = pipeline.run(&groups(&["money"])).unwrap();

    assert_eq!(summary.totals.chunks_written, expected);
    assert_eq!(fx.row_count(), expected as u64);
    // Batches of two rows.
    assert_eq!(fx.counters.borrow().upserts, expected.div_ceil(2));
    // One request for the chunk texts, one for their tags.
    assert_eq!(fx.counters.borrow().embed_calls, 2);
}

#[test]
fn test_rerun_performs_no_reads_and_no_writes() {
    let fx = Fixture::new();
    fx.add_doc("money", "ep3", FINANCE_FILE, "今天來聊股票，也談談長期投資。");
    fx.add_doc("money", "ep4", FINANCE_FILE, "理財要從存股開始。");

    let first = fx.pipeline().run(&groups(&["money"])).unwrap();
    assert_eq!(first.totals.succeeded, 2);
    let rows_after_first = fx.row_count();
    let (reads, upserts) = {
        let c = fx.counters.borrow();
        (c.reads, c.upserts)
    };

    let second = fx.pipeline().run(&groups(&["money"])).unwrap();
    assert_eq!(second.totals.attempted, 0);
    assert_eq!(second.totals.skipped, 2);
    assert_eq!(fx.counters.borrow().reads, reads);
    assert_eq!(fx.counters.borrow().upserts, upserts);
    assert_eq!(fx.row_count(), rows_after_first);
}

#[test]
fn test_unresolvable_filenames_write_nothing() {
    let fx = Fixture::new();
    fx.add_doc("money", "a", "RSS_12345_podcast_67_EP3 標題", "股票投資");
    fx.add_doc("money", "b", "completely-unstructured-name", "股票投資");

    let mut pipeline = fx.pipeline();
    let summary = pipeline.run(&groups(&["money"])).unwrap();

    assert_eq!(summary.totals.attempted, 2);
    assert_eq!(summary.totals.failed, 2);
    assert_eq!(summary.totals.chunks_written, 0);
    assert_eq!(fx.counters.borrow().upserts, 0);
    assert_eq!(fx.row_count(), 0);

    let errors = pipeline.errors();
    assert_eq!(errors.len(), 2);
    assert!(errors
        .records()
        .iter()
        .all(|r| r.kind == ErrorKind::Validation && r.stage == Stage::Metadata));
    assert_eq!(errors.records()[0].title, "title of a");

    let progress = JsonProgressFile::open(fx.progress_path()).unwrap();
    assert!(!progress.is_processed("money/a"));
    assert!(!progress.is_processed("money/b"));
}

#[test]
fn test_failures_are_logged_and_exported_without_stopping_the_run() {
    let fx = Fixture::new();
    fx.add_doc("money", "bad", "no-metadata", "股票投資");
    fx.add_doc("money", "good", FINANCE_FILE, "股票投資");
    fs::write(fx.root().join("money").join("broken.json"), "{ not json").unwrap();

    let mut pipeline = fx.pipeline();
    let summary = pipeline.run(&groups(&["money", "missing"])).unwrap();

    assert_eq!(summary.totals.succeeded, 1);
    assert_eq!(summary.totals.failed, 2);
    // Two failed documents plus the missing group.
    assert_eq!(summary.errors.total, 3);
    assert_eq!(summary.errors.by_kind.values().sum::<usize>(), 3);
    assert_eq!(summary.errors.by_group["money"], 2);
    assert_eq!(summary.errors.by_stage[&Stage::Read], 2);

    let export = summary.export.expect("errors were exported");
    assert!(export.json_path.exists());
    assert!(export.csv_path.exists());
    assert_eq!(count_files(&fx.state().join("errors"), "json"), 1);
}

#[test]
fn test_write_failure_leaves_document_pending() {
    let fx = Fixture::new();
    fx.add_doc("money", "ep3", FINANCE_FILE, "股票投資");
    fx.counters.borrow_mut().fail_writes = true;

    let mut pipeline = fx.pipeline();
    let summary = pipeline.run(&groups(&["money"])).unwrap();
    assert_eq!(summary.totals.failed, 1);

    let record = &pipeline.errors().records()[0];
    assert_eq!(record.kind, ErrorKind::Write);
    assert_eq!(record.stage, Stage::Write);
    // Non-connection errors are not retried.
    assert_eq!(record.retry_count, 0);
    assert_eq!(fx.counters.borrow().upserts, 1);

    fx.counters.borrow_mut().fail_writes = false;
    let retry = fx.pipeline().run(&groups(&["money"])).unwrap();
    assert_eq!(retry.totals.succeeded, 1);
    assert_eq!(fx.row_count(), 1);
}

#[test]
fn test_embedding_failure_fails_document_before_writing() {
    let fx = Fixture::new();
    let text = "股票投資第一段\n這一段壞掉了\n這一段也壞掉了";
    fx.add_doc("money", "ep3", FINANCE_FILE, text);

    let chunk = ChunkConfig {
        max_chunk_size: 8,
        overlap: 0,
        unit: ChunkUnit::Line,
    };
    let mut pipeline = Pipeline::new(fx.components(chunk), None);
    let summary = pipeline.run(&groups(&["money"])).unwrap();

    assert_eq!(summary.totals.failed, 1);
    assert_eq!(fx.counters.borrow().upserts, 0);
    let records = pipeline.errors().records();
    assert_eq!(records.len(), 2);
    assert!(records
        .iter()
        .all(|r| r.stage == Stage::Embed && r.kind == ErrorKind::Processing));
    assert!(records[0].message.starts_with("chunk 1:"));
}

#[test]
fn test_empty_document_is_marked_without_lookup_or_write() {
    let fx = Fixture::new();
    // Only emoji: survives the raw body check, normalizes to nothing.
    fx.add_doc("money", "silent", "not-a-parsable-name", "🎙️🎙️");

    let mut pipeline = fx.pipeline();
    let summary = pipeline.run(&groups(&["money"])).unwrap();

    assert_eq!(summary.totals.succeeded, 1);
    assert_eq!(summary.totals.chunks_written, 0);
    assert_eq!(summary.errors.total, 0);
    assert_eq!(fx.counters.borrow().upserts, 0);
    assert!(JsonProgressFile::open(fx.progress_path())
        .unwrap()
        .is_processed("money/silent"));
}

#[test]
fn test_row_limit_applies_to_pending_documents() {
    let fx = Fixture::new();
    for key in ["a", "b", "c"] {
        fx.add_doc("money", key, FINANCE_FILE, "股票投資");
    }

    let first = Pipeline::new(fx.components(ChunkConfig::default()), Some(2))
        .run(&groups(&["money"]))
        .unwrap();
    assert_eq!(first.totals.attempted, 2);

    let second = Pipeline::new(fx.components(ChunkConfig::default()), Some(2))
        .run(&groups(&["money"]))
        .unwrap();
    assert_eq!(second.totals.skipped, 2);
    assert_eq!(second.totals.attempted, 1);
    assert_eq!(second.totals.succeeded, 1);
}

#[test]
fn test_no_groups_processes_every_group_in_store() {
    let fx = Fixture::new();
    fx.add_doc("money", "ep3", FINANCE_FILE, "今天來聊股票。");
    fx.add_doc("tech", "ep4", FINANCE_FILE, "今天來聊基金。");

    let summary = fx.pipeline().run(&[]).unwrap();

    let names: Vec<&str> = summary.groups.iter().map(|(g, _)| g.as_str()).collect();
    assert_eq!(names, vec!["money", "tech"]);
    assert_eq!(summary.totals.attempted, 2);
    assert_eq!(summary.totals.succeeded, 2);
    assert_eq!(fx.row_count(), 2);
}
