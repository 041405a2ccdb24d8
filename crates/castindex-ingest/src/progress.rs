//! Resumable progress tracking.
//!
//! Two on-disk formats are supported:
//! - [`JsonProgressFile`]: one JSON document rewritten atomically after every
//!   processed document. Not safe for concurrent writers.
//! - [`ProgressLog`]: an append-only JSON-lines log replayed on open, which
//!   tolerates several appending processes.

use crate::error::{IngestError, IngestResult};
use castindex_core::ProcessingProgress;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Durable set of processed source ids.
pub trait ProgressStore {
    fn progress(&self) -> &ProcessingProgress;

    fn is_processed(&self, source_id: &str) -> bool {
        self.progress().is_processed(source_id)
    }

    /// Record `source_id` and persist before returning.
    fn mark_processed(&mut self, source_id: &str) -> IngestResult<()>;

    /// Forget a group's ids. Returns how many were removed.
    fn reset_group(&mut self, group: &str) -> IngestResult<usize>;

    fn reset_all(&mut self) -> IngestResult<()>;

    fn path(&self) -> &Path;
}

fn ensure_parent(path: &Path) -> IngestResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Progress kept in a single JSON file:
/// `{"processed_ids": [...], "last_updated": ..., "total_processed": n}`.
pub struct JsonProgressFile {
    path: PathBuf,
    progress: ProcessingProgress,
}

impl JsonProgressFile {
    /// Load progress from `path`; a missing file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> IngestResult<Self> {
        let path = path.into();
        let progress = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            let progress: ProcessingProgress = serde_json::from_str(&contents)
                .map_err(|e| IngestError::Progress(format!("{}: {}", path.display(), e)))?;
            info!(
                "Loaded progress: {} documents processed (updated {})",
                progress.processed_ids.len(),
                progress.last_updated
            );
            progress
        } else {
            ProcessingProgress::default()
        };
        Ok(Self { path, progress })
    }

    /// Write to a temp file beside the target, then rename over it.
    fn save(&self) -> IngestResult<()> {
        ensure_parent(&self.path)?;
        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(&self.progress)?;
        {
            let mut file = File::create(&tmp)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl ProgressStore for JsonProgressFile {
    fn progress(&self) -> &ProcessingProgress {
        &self.progress
    }

    fn mark_processed(&mut self, source_id: &str) -> IngestResult<()> {
        if self.progress.mark(source_id) {
            self.save()?;
        }
        Ok(())
    }

    fn reset_group(&mut self, group: &str) -> IngestResult<usize> {
        let removed = self.progress.reset_group(group);
        self.save()?;
        Ok(removed)
    }

    fn reset_all(&mut self) -> IngestResult<()> {
        self.progress = ProcessingProgress::default();
        self.save()
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum LogEntry {
    Processed { id: String, at: DateTime<Utc> },
    ResetGroup { group: String, at: DateTime<Utc> },
}

/// Append-only JSON-lines progress log.
pub struct ProgressLog {
    path: PathBuf,
    progress: ProcessingProgress,
}

impl ProgressLog {
    /// Replay the log at `path`. Unreadable lines are skipped with a warning.
    pub fn open(path: impl Into<PathBuf>) -> IngestResult<Self> {
        let path = path.into();
        let mut progress = ProcessingProgress::default();

        if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            for (number, line) in reader.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<LogEntry>(&line) {
                    Ok(LogEntry::Processed { id, at }) => {
                        progress.mark(id);
                        progress.last_updated = at;
                    }
                    Ok(LogEntry::ResetGroup { group, at }) => {
                        progress.reset_group(&group);
                        progress.last_updated = at;
                    }
                    Err(e) => warn!("Skipping progress log line {}: {}", number + 1, e),
                }
            }
            debug!("Replayed progress log: {} ids", progress.processed_ids.len());
        }

        Ok(Self { path, progress })
    }

    fn append(&self, entry: &LogEntry) -> IngestResult<()> {
        ensure_parent(&self.path)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        file.write_all(line.as_bytes())?;
        file.sync_data()?;
        Ok(())
    }
}

impl ProgressStore for ProgressLog {
    fn progress(&self) -> &ProcessingProgress {
        &self.progress
    }

    fn mark_processed(&mut self, source_id: &str) -> IngestResult<()> {
        if self.progress.mark(source_id) {
            self.append(&LogEntry::Processed {
                id: source_id.to_string(),
                at: self.progress.last_updated,
            })?;
        }
        Ok(())
    }

    fn reset_group(&mut self, group: &str) -> IngestResult<usize> {
        let removed = self.progress.reset_group(group);
        self.append(&LogEntry::ResetGroup {
            group: group.to_string(),
            at: self.progress.last_updated,
        })?;
        Ok(removed)
    }

    fn reset_all(&mut self) -> IngestResult<()> {
        self.progress = ProcessingProgress::default();
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

/// Open the store for `format` (`json` or `log`).
pub fn open_progress_store(path: &Path, format: &str) -> IngestResult<Box<dyn ProgressStore>> {
    match format {
        "json" => Ok(Box::new(JsonProgressFile::open(path)?)),
        "log" => Ok(Box::new(ProgressLog::open(path)?)),
        other => Err(IngestError::Progress(format!(
            "unknown progress format: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_file_persists_each_mark() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state/progress.json");

        let mut store = JsonProgressFile::open(&path).unwrap();
        store.mark_processed("money/ep1").unwrap();
        store.mark_processed("money/ep2").unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());

        let reopened = JsonProgressFile::open(&path).unwrap();
        assert!(reopened.is_processed("money/ep1"));
        assert_eq!(reopened.progress().total_processed, 2);

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["processed_ids"].as_array().unwrap().len(), 2);
        assert!(raw.get("last_updated").is_some());
    }

    #[test]
    fn test_json_file_reset_group() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        let mut store = JsonProgressFile::open(&path).unwrap();
        store.mark_processed("a/1").unwrap();
        store.mark_processed("b/1").unwrap();
        assert_eq!(store.reset_group("a").unwrap(), 1);

        let reopened = JsonProgressFile::open(&path).unwrap();
        assert!(!reopened.is_processed("a/1"));
        assert!(reopened.is_processed("b/1"));
    }

    #[test]
    fn test_corrupt_json_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            JsonProgressFile::open(&path),
            Err(IngestError::Progress(_))
        ));
    }

    #[test]
    fn test_log_replays_marks_and_resets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.jsonl");

        let mut log = ProgressLog::open(&path).unwrap();
        log.mark_processed("a/1").unwrap();
        log.mark_processed("a/2").unwrap();
        log.mark_processed("b/1").unwrap();
        log.mark_processed("b/1").unwrap();
        log.reset_group("a").unwrap();
        log.mark_processed("a/2").unwrap();

        let lines = fs::read_to_string(&path).unwrap().lines().count();
        assert_eq!(lines, 5);

        let replayed = ProgressLog::open(&path).unwrap();
        assert!(!replayed.is_processed("a/1"));
        assert!(replayed.is_processed("a/2"));
        assert!(replayed.is_processed("b/1"));

        let mut replayed = replayed;
        replayed.reset_all().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_log_skips_garbage_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.jsonl");
        fs::write(
            &path,
            "garbage\n{\"op\":\"processed\",\"id\":\"g/1\",\"at\":\"2024-01-01T00:00:00Z\"}\n",
        )
        .unwrap();
        let log = ProgressLog::open(&path).unwrap();
        assert!(log.is_processed("g/1"));
    }

    #[test]
    fn test_open_by_format() {
        let dir = tempfile::tempdir().unwrap();
        assert!(open_progress_store(&dir.path().join("p.json"), "json").is_ok());
        assert!(open_progress_store(&dir.path().join("p.log"), "log").is_ok());
        assert!(open_progress_store(&dir.path().join("p"), "xml").is_err());
    }
}
