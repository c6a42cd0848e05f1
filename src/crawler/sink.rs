//! Batched, deduplicating result persistence
//!
//! Workers hand every unit outcome to the sink. Once `batch_size` results are
//! buffered, the worker that crossed the threshold drains the buffer and
//! flushes it: records are deduplicated against the store and within the
//! batch, saved in one transaction, and every unit in the batch is marked
//! completed with the number of records it contributed.

use crate::crawler::fetcher::NetworkError;
use crate::crawler::queue::TaskQueue;
use crate::extract::{ParseError, Record};
use crate::storage::{RecordStore, StorageError, StorageResult, UnitKey};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Record backend shared between workers
pub type SharedRecordStore = Arc<Mutex<dyn RecordStore + Send>>;

/// Why a unit produced no (or only partial) results
#[derive(Debug, Clone, Error)]
pub enum UnitError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Blocking page served for {0}")]
    Blocked(String),

    #[error("Cannot build URL: {0}")]
    Url(String),

    #[error("No extractor registered for origin '{0}'")]
    UnknownOrigin(String),
}

/// Outcome of processing one work unit
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub unit: UnitKey,
    /// First page URL, empty if it could not be built
    pub url: String,
    pub success: bool,
    pub records: Vec<Record>,
    pub error: Option<UnitError>,
    pub pages_fetched: u32,
}

impl FetchResult {
    pub fn new(unit: UnitKey) -> Self {
        Self {
            unit,
            url: String::new(),
            success: true,
            records: Vec::new(),
            error: None,
            pages_fetched: 0,
        }
    }

    /// Records the failure that ended the unit
    pub fn fail(&mut self, error: UnitError) {
        self.success = false;
        self.error = Some(error);
    }
}

/// What one flush achieved
#[derive(Debug, Clone, Default)]
pub struct FlushReport {
    /// Units marked completed by this flush, in batch order
    pub completed: Vec<UnitKey>,
    pub records_saved: usize,
    pub duplicates: usize,
    /// Results discarded after every attempt failed
    pub dropped: usize,
}

/// Records that survived deduplication, grouped by unit
#[derive(Debug, Default)]
struct PersistedBatch {
    per_unit: HashMap<UnitKey, u32>,
    inserted: usize,
    duplicates: usize,
}

/// Accumulates fetch results and persists them in batches
pub struct ResultSink {
    records: SharedRecordStore,
    queue: TaskQueue,
    batch_size: usize,
    max_attempts: u32,
    backoff: Duration,
    batch: Mutex<Vec<FetchResult>>,
    records_saved: AtomicU64,
    duplicates: AtomicU64,
    dropped: AtomicU64,
}

impl ResultSink {
    pub fn new(
        records: SharedRecordStore,
        queue: TaskQueue,
        batch_size: usize,
        max_attempts: u32,
        backoff: Duration,
    ) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            records,
            queue,
            batch_size,
            max_attempts: max_attempts.max(1),
            backoff,
            batch: Mutex::new(Vec::with_capacity(batch_size)),
            records_saved: AtomicU64::new(0),
            duplicates: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    fn buffer(&self) -> std::sync::MutexGuard<'_, Vec<FetchResult>> {
        self.batch.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Buffers a result, flushing when the batch is full
    ///
    /// Returns the flush report if this call triggered a flush.
    pub async fn accept(&self, result: FetchResult) -> Option<FlushReport> {
        let full = {
            let mut batch = self.buffer();
            batch.push(result);
            if batch.len() >= self.batch_size {
                Some(std::mem::take(&mut *batch))
            } else {
                None
            }
        };

        match full {
            Some(batch) => Some(self.flush_batch(batch).await),
            None => None,
        }
    }

    /// Flushes whatever is buffered
    pub async fn flush(&self) -> FlushReport {
        let batch = std::mem::take(&mut *self.buffer());
        self.flush_batch(batch).await
    }

    /// Number of results waiting for the next flush
    pub fn pending(&self) -> usize {
        self.buffer().len()
    }

    pub fn records_saved(&self) -> u64 {
        self.records_saved.load(Ordering::Relaxed)
    }

    pub fn duplicates_skipped(&self) -> u64 {
        self.duplicates.load(Ordering::Relaxed)
    }

    pub fn dropped_results(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    async fn flush_batch(&self, batch: Vec<FetchResult>) -> FlushReport {
        if batch.is_empty() {
            return FlushReport::default();
        }

        // Saved counts survive a failed completion step so a retry does not
        // see its own records as duplicates
        let mut persisted: Option<PersistedBatch> = None;

        for attempt in 1..=self.max_attempts {
            match self.try_flush(&batch, &mut persisted) {
                Ok(report) => {
                    self.records_saved
                        .fetch_add(report.records_saved as u64, Ordering::Relaxed);
                    self.duplicates
                        .fetch_add(report.duplicates as u64, Ordering::Relaxed);
                    info!(
                        "Flushed {} results: {} records saved, {} duplicates skipped",
                        batch.len(),
                        report.records_saved,
                        report.duplicates
                    );
                    return report;
                }
                Err(e) if attempt < self.max_attempts => {
                    let delay = self.backoff * attempt;
                    warn!(
                        "Flush attempt {}/{} failed: {}; retrying in {:?}",
                        attempt, self.max_attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    let units: Vec<String> = batch.iter().map(|r| r.unit.label()).collect();
                    error!(
                        "Dropping batch of {} results after {} failed flush attempts ({}); units left processing: {}",
                        batch.len(),
                        self.max_attempts,
                        e,
                        units.join(", ")
                    );
                    self.dropped.fetch_add(batch.len() as u64, Ordering::Relaxed);
                    return FlushReport {
                        dropped: batch.len(),
                        ..FlushReport::default()
                    };
                }
            }
        }

        FlushReport::default()
    }

    fn try_flush(
        &self,
        batch: &[FetchResult],
        persisted: &mut Option<PersistedBatch>,
    ) -> StorageResult<FlushReport> {
        let saved = match persisted.take() {
            Some(saved) => saved,
            None => self.persist_records(batch)?,
        };

        let completed = self.complete_units(batch, &saved);
        let report = completed.map(|completed| FlushReport {
            completed,
            records_saved: saved.inserted,
            duplicates: saved.duplicates,
            dropped: 0,
        });
        *persisted = Some(saved);
        report
    }

    fn complete_units(
        &self,
        batch: &[FetchResult],
        saved: &PersistedBatch,
    ) -> StorageResult<Vec<UnitKey>> {
        let mut completed = Vec::with_capacity(batch.len());
        for result in batch {
            let records = saved.per_unit.get(&result.unit).copied().unwrap_or(0);
            match self
                .queue
                .mark_completed(&result.unit, result.pages_fetched, records)
            {
                Ok(true) => completed.push(result.unit.clone()),
                Ok(false) => debug!("{} was already completed", result.unit),
                Err(StorageError::UnitNotFound(label)) => {
                    warn!("Completed unit {} is no longer queued", label)
                }
                Err(e) => return Err(e),
            }
        }
        Ok(completed)
    }

    /// Dedups and saves every record of the batch under one store lock
    fn persist_records(&self, batch: &[FetchResult]) -> StorageResult<PersistedBatch> {
        let mut store = self.records.lock().unwrap_or_else(|e| e.into_inner());

        let mut seen = HashSet::new();
        let mut fresh = Vec::new();
        let mut persisted = PersistedBatch::default();

        for result in batch {
            for record in &result.records {
                let fingerprint = record.fingerprint();
                if !seen.insert(fingerprint.to_string()) || store.record_exists(fingerprint)? {
                    persisted.duplicates += 1;
                    continue;
                }
                fresh.push(record.clone());
                *persisted.per_unit.entry(result.unit.clone()).or_insert(0) += 1;
            }
        }

        persisted.inserted = store.save_records(&fresh)?;
        Ok(persisted)
    }
}
