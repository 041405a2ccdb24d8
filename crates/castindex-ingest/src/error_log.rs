//! Structured failure log with summary aggregation and file export.

use crate::error::IngestResult;
use castindex_core::{ErrorKind, ErrorRecord, Stage};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Counts of recorded failures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorSummary {
    pub total: usize,
    pub by_kind: BTreeMap<ErrorKind, usize>,
    pub by_stage: BTreeMap<Stage, usize>,
    pub by_group: BTreeMap<String, usize>,
}

/// Paths written by [`ErrorLogger::export`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorExport {
    pub json_path: PathBuf,
    pub csv_path: PathBuf,
}

#[derive(Serialize)]
struct ExportDocument<'a> {
    summary: &'a ErrorSummary,
    errors: &'a [ErrorRecord],
}

/// One flat row of the tabular export.
#[derive(Serialize)]
struct CsvRow<'a> {
    timestamp: String,
    group: &'a str,
    document_id: &'a str,
    title: &'a str,
    kind: &'static str,
    stage: &'static str,
    retry_count: u32,
    message: &'a str,
}

impl<'a> From<&'a ErrorRecord> for CsvRow<'a> {
    fn from(record: &'a ErrorRecord) -> Self {
        Self {
            timestamp: record.timestamp.to_rfc3339(),
            group: &record.group,
            document_id: &record.document_id,
            title: &record.title,
            kind: record.kind.as_str(),
            stage: record.stage.as_str(),
            retry_count: record.retry_count,
            message: &record.message,
        }
    }
}

/// Append-only list of [`ErrorRecord`]s for one run.
#[derive(Debug, Default)]
pub struct ErrorLogger {
    records: Vec<ErrorRecord>,
}

impl ErrorLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, record: ErrorRecord) {
        warn!(
            "[{}] {} failed at {} ({}): {}",
            record.group, record.document_id, record.stage, record.kind, record.message
        );
        self.records.push(record);
    }

    pub fn records(&self) -> &[ErrorRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn by_group<'a>(&'a self, group: &'a str) -> impl Iterator<Item = &'a ErrorRecord> {
        self.records.iter().filter(move |r| r.group == group)
    }

    pub fn by_kind(&self, kind: ErrorKind) -> impl Iterator<Item = &ErrorRecord> {
        self.records.iter().filter(move |r| r.kind == kind)
    }

    pub fn summary(&self) -> ErrorSummary {
        let mut summary = ErrorSummary {
            total: self.records.len(),
            ..Default::default()
        };
        for record in &self.records {
            *summary.by_kind.entry(record.kind).or_default() += 1;
            *summary.by_stage.entry(record.stage).or_default() += 1;
            *summary.by_group.entry(record.group.clone()).or_default() += 1;
        }
        summary
    }

    /// Write `errors_{timestamp}.json` and `errors_{timestamp}.csv` into `dir`.
    pub fn export(&self, dir: &Path) -> IngestResult<ErrorExport> {
        self.export_at(dir, Utc::now())
    }

    fn export_at(&self, dir: &Path, at: DateTime<Utc>) -> IngestResult<ErrorExport> {
        fs::create_dir_all(dir)?;
        let stem = format!("errors_{}", at.format("%Y%m%d_%H%M%S"));
        let json_path = dir.join(format!("{}.json", stem));
        let csv_path = dir.join(format!("{}.csv", stem));

        let summary = self.summary();
        let document = ExportDocument {
            summary: &summary,
            errors: &self.records,
        };
        serde_json::to_writer_pretty(File::create(&json_path)?, &document)?;

        let mut writer = csv::Writer::from_path(&csv_path)?;
        for record in &self.records {
            writer.serialize(CsvRow::from(record))?;
        }
        writer.flush()?;

        info!(
            "Exported {} error records to {}",
            self.records.len(),
            json_path.display()
        );
        Ok(ErrorExport {
            json_path,
            csv_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_log() -> ErrorLogger {
        let mut log = ErrorLogger::new();
        log.record(ErrorRecord::new(
            "money",
            "money/ep1",
            ErrorKind::Validation,
            Stage::Metadata,
            "no metadata row",
        ));
        log.record(
            ErrorRecord::new("money", "money/ep2", ErrorKind::Write, Stage::Write, "timeout")
                .with_retry_count(1),
        );
        log.record(
            ErrorRecord::new("tech", "tech/ep9", ErrorKind::Processing, Stage::Embed, "bad, \"quoted\"")
                .with_title("第九集"),
        );
        log
    }

    #[test]
    fn test_summary_counts_sum_to_total() {
        let log = sample_log();
        let summary = log.summary();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.by_kind.values().sum::<usize>(), 3);
        assert_eq!(summary.by_stage.values().sum::<usize>(), 3);
        assert_eq!(summary.by_group["money"], 2);
        assert_eq!(summary.by_kind[&ErrorKind::Write], 1);
    }

    #[test]
    fn test_lookup_by_group_and_kind() {
        let log = sample_log();
        assert_eq!(log.by_group("money").count(), 2);
        assert_eq!(log.by_group("none").count(), 0);
        let processing: Vec<_> = log.by_kind(ErrorKind::Processing).collect();
        assert_eq!(processing.len(), 1);
        assert_eq!(processing[0].title, "第九集");
    }

    #[test]
    fn test_export_writes_json_and_csv() {
        let dir = tempfile::tempdir().unwrap();
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap();
        let export = sample_log().export_at(&dir.path().join("errors"), at).unwrap();

        assert!(export.json_path.ends_with("errors_20240305_070809.json"));
        assert!(export.csv_path.ends_with("errors_20240305_070809.csv"));

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&export.json_path).unwrap()).unwrap();
        assert_eq!(json["summary"]["total"], 3);
        assert_eq!(json["summary"]["by_kind"]["validation"], 1);
        assert_eq!(json["errors"].as_array().unwrap().len(), 3);
        assert_eq!(json["errors"][1]["retry_count"], 1);

        let mut reader = csv::Reader::from_path(&export.csv_path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(&headers[0], "timestamp");
        assert_eq!(&headers[4], "kind");
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(&rows[2][7], "bad, \"quoted\"");
    }
}
