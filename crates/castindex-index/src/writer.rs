//! Batched, retrying writes into a vector index.

use crate::backend::{IndexStats, VectorIndex};
use crate::batch::ColumnBatch;
use crate::error::{IndexError, IndexResult};
use crate::schema::CollectionSchema;
use castindex_core::{EmbeddingRecord, RetryPolicy};
use serde::Serialize;
use std::thread;
use tracing::{debug, info, warn};

/// Outcome of [`IndexWriter::write`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteReport {
    pub batches: usize,
    pub rows: usize,
}

/// Owns the collection lifecycle and writes records in batches.
pub struct IndexWriter {
    index: Box<dyn VectorIndex>,
    schema: CollectionSchema,
    batch_size: usize,
    retry: RetryPolicy,
}

impl IndexWriter {
    pub fn new(index: Box<dyn VectorIndex>, schema: CollectionSchema, batch_size: usize) -> Self {
        Self {
            index,
            schema,
            batch_size: batch_size.max(1),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn schema(&self) -> &CollectionSchema {
        &self.schema
    }

    pub fn index(&self) -> &dyn VectorIndex {
        self.index.as_ref()
    }

    /// Create the collection if it does not exist. Returns whether it was created.
    pub fn ensure_collection(&mut self) -> IndexResult<bool> {
        if self.index.has_collection()? {
            debug!("Collection {} already exists", self.schema.name);
            return Ok(false);
        }
        self.index.create_collection(&self.schema)?;
        Ok(true)
    }

    pub fn drop_collection(&mut self) -> IndexResult<()> {
        if self.index.has_collection()? {
            self.index.drop_collection()?;
        }
        Ok(())
    }

    pub fn clear(&mut self) -> IndexResult<()> {
        self.index.clear()
    }

    pub fn load(&mut self) -> IndexResult<()> {
        self.index.load()
    }

    pub fn stats(&self) -> IndexResult<IndexStats> {
        self.index.stats()
    }

    /// Write `records` in batches of the configured size.
    ///
    /// Stops at the first batch that cannot be written; earlier batches stay
    /// written. Writes are upserts, so rewriting the same records is safe.
    pub fn write(&mut self, records: &[EmbeddingRecord]) -> IndexResult<WriteReport> {
        let mut report = WriteReport::default();
        for records in records.chunks(self.batch_size) {
            let batch = ColumnBatch::from_records(&self.schema, records)?;
            report.rows += self.write_batch(&batch)?;
            report.batches += 1;
        }
        if report.rows > 0 {
            debug!(
                "Wrote {} rows in {} batches to {}",
                report.rows, report.batches, self.schema.name
            );
        }
        Ok(report)
    }

    fn write_batch(&mut self, batch: &ColumnBatch) -> IndexResult<usize> {
        let mut retries = 0;
        loop {
            let err = match self.index.upsert(batch) {
                Ok(written) => return Ok(written),
                Err(err) => err,
            };

            if !err.is_connection() || !self.retry.allows(retries) {
                return Err(IndexError::Write {
                    chunk_ids: batch.chunk_ids(),
                    retries,
                    source: Box::new(err),
                });
            }

            retries += 1;
            let delay = self.retry.delay(retries);
            warn!(
                "Index connection lost ({}), reconnecting in {:?} (retry {}/{})",
                err, delay, retries, self.retry.max_retries
            );
            thread::sleep(delay);
            match self.index.reconnect() {
                Ok(()) => info!("Reconnected to {} index", self.index.backend()),
                Err(e) => warn!("Reconnect failed: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::tests::record;
    use crate::sqlite::SqliteIndex;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Calls {
        upserts: usize,
        reconnects: usize,
        rows: usize,
    }

    /// Index whose first `failures` upserts lose the connection.
    struct FlakyIndex {
        failures: usize,
        calls: Rc<RefCell<Calls>>,
    }

    impl VectorIndex for FlakyIndex {
        fn backend(&self) -> &'static str {
            "flaky"
        }
        fn collection(&self) -> &str {
            "chunks"
        }
        fn has_collection(&self) -> IndexResult<bool> {
            Ok(true)
        }
        fn create_collection(&mut self, _: &CollectionSchema) -> IndexResult<()> {
            Ok(())
        }
        fn drop_collection(&mut self) -> IndexResult<()> {
            Ok(())
        }
        fn clear(&mut self) -> IndexResult<()> {
            Ok(())
        }
        fn load(&mut self) -> IndexResult<()> {
            Ok(())
        }
        fn row_count(&self) -> IndexResult<u64> {
            Ok(self.calls.borrow().rows as u64)
        }
        fn upsert(&mut self, batch: &ColumnBatch) -> IndexResult<usize> {
            let mut calls = self.calls.borrow_mut();
            calls.upserts += 1;
            if self.failures > 0 {
                self.failures -= 1;
                return Err(IndexError::Connection("broken pipe".into()));
            }
            calls.rows += batch.len();
            Ok(batch.len())
        }
        fn reconnect(&mut self) -> IndexResult<()> {
            self.calls.borrow_mut().reconnects += 1;
            Ok(())
        }
    }

    fn flaky_writer(failures: usize, batch_size: usize) -> (IndexWriter, Rc<RefCell<Calls>>) {
        let calls = Rc::new(RefCell::new(Calls::default()));
        let index = FlakyIndex {
            failures,
            calls: Rc::clone(&calls),
        };
        let schema = CollectionSchema::chunks("chunks", 2).unwrap();
        let writer = IndexWriter::new(Box::new(index), schema, batch_size)
            .with_retry(RetryPolicy::immediate(1));
        (writer, calls)
    }

    #[test]
    fn test_batches_split_by_size() {
        let records: Vec<_> = (0..5).map(|i| record(i, 2)).collect();
        let (mut writer, calls) = flaky_writer(0, 2);
        let report = writer.write(&records).unwrap();
        assert_eq!(report, WriteReport { batches: 3, rows: 5 });
        assert_eq!(calls.borrow().upserts, 3);
    }

    #[test]
    fn test_connection_loss_reconnects_and_retries_once() {
        let records: Vec<_> = (0..2).map(|i| record(i, 2)).collect();
        let (mut writer, calls) = flaky_writer(1, 10);
        let report = writer.write(&records).unwrap();
        assert_eq!(report.rows, 2);
        assert_eq!(calls.borrow().reconnects, 1);
        assert_eq!(calls.borrow().upserts, 2);
    }

    #[test]
    fn test_persistent_failure_surfaces_batch() {
        let records: Vec<_> = (0..2).map(|i| record(i, 2)).collect();
        let (mut writer, calls) = flaky_writer(5, 10);
        let err = writer.write(&records).unwrap_err();
        assert_eq!(err.failed_chunk_ids(), ["doc_0", "doc_1"]);
        assert!(matches!(err, IndexError::Write { retries: 1, .. }));
        assert_eq!(calls.borrow().upserts, 2);
    }

    #[test]
    fn test_non_connection_errors_not_retried() {
        let mut index = SqliteIndex::open_in_memory("chunks").unwrap();
        let schema = CollectionSchema::chunks("chunks", 2).unwrap();
        index.create_collection(&schema).unwrap();
        let mut writer = IndexWriter::new(Box::new(index), schema, 10);

        // Wrong dimension is rejected before any write
        let err = writer.write(&[record(0, 3)]).unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { .. }));
        assert_eq!(writer.stats().unwrap().row_count, 0);
    }

    #[test]
    fn test_ensure_collection_is_idempotent() {
        let index = SqliteIndex::open_in_memory("chunks").unwrap();
        let schema = CollectionSchema::chunks("chunks", 2).unwrap();
        let mut writer = IndexWriter::new(Box::new(index), schema, 10);
        assert!(writer.ensure_collection().unwrap());
        assert!(!writer.ensure_collection().unwrap());

        writer.write(&[record(0, 2), record(1, 2)]).unwrap();
        writer.write(&[record(0, 2), record(1, 2)]).unwrap();
        assert_eq!(writer.stats().unwrap().row_count, 2);

        writer.drop_collection().unwrap();
        writer.drop_collection().unwrap();
        assert!(!writer.stats().unwrap().exists);
    }
}
