//! Periodic progress checkpoints
//!
//! Checkpoints are advisory. Resumption always works from the queue's own
//! unit states; the checkpoint log only records how far a run got.

use crate::crawler::queue::TaskQueue;
use crate::crawler::sink::FlushReport;
use crate::storage::{Checkpoint, CheckpointStore, StorageResult, UnitKey};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};

/// Checkpoint backend shared between workers
pub type SharedCheckpointStore = Arc<Mutex<dyn CheckpointStore + Send>>;

/// Writes a checkpoint every `interval` completed units
///
/// Workers report the units they hold through `unit_started` and
/// `unit_finished`; each checkpoint names the most recently started one.
pub struct Checkpointer {
    store: SharedCheckpointStore,
    queue: TaskQueue,
    interval: u64,
    completed: AtomicU64,
    in_flight: Mutex<Vec<UnitKey>>,
}

impl Checkpointer {
    pub fn new(store: SharedCheckpointStore, queue: TaskQueue, interval: u64) -> Self {
        Self {
            store,
            queue,
            interval: interval.max(1),
            completed: AtomicU64::new(0),
            in_flight: Mutex::new(Vec::new()),
        }
    }

    fn held(&self) -> MutexGuard<'_, Vec<UnitKey>> {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Records that a worker claimed `key`
    pub fn unit_started(&self, key: &UnitKey) {
        self.held().push(key.clone());
    }

    /// Records that a worker is done with `key`, submitted or released
    pub fn unit_finished(&self, key: &UnitKey) {
        let mut held = self.held();
        if let Some(pos) = held.iter().rposition(|k| k == key) {
            held.remove(pos);
        }
    }

    /// Most recently started unit that is still held by a worker
    pub fn in_flight(&self) -> Option<UnitKey> {
        self.held().last().cloned()
    }

    /// Counts one completed unit; writes a checkpoint on every interval
    ///
    /// Returns the checkpoint if one was written.
    pub fn tick(&self) -> StorageResult<Option<Checkpoint>> {
        let completed = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        if completed % self.interval != 0 {
            return Ok(None);
        }
        self.write().map(Some)
    }

    /// Ticks once per unit completed by a flush, logging storage failures
    pub fn record_flush(&self, report: &FlushReport) {
        for key in &report.completed {
            if let Err(e) = self.tick() {
                warn!("Checkpoint after {} failed: {}", key, e);
            }
        }
    }

    /// Writes a checkpoint regardless of the interval
    pub fn force(&self) -> StorageResult<Checkpoint> {
        self.write()
    }

    /// Units counted since this checkpointer was created
    pub fn completed_units(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    fn write(&self) -> StorageResult<Checkpoint> {
        let counts = self.queue.stats()?;
        let records_saved = self.queue.total_records()?;
        let in_flight = self.in_flight().map(|key| key.label());
        let checkpoint = Checkpoint::from_counts(&counts, in_flight, records_saved);

        {
            let mut store = self.store.lock().unwrap_or_else(|e| e.into_inner());
            store.insert_checkpoint(&checkpoint)?;
        }

        info!(
            "Checkpoint: {}/{} units completed ({:.1}%), {} pending, {} processing, {} records",
            checkpoint.completed_units,
            checkpoint.total_units,
            checkpoint.progress_percent(),
            checkpoint.pending_units,
            checkpoint.processing_units,
            checkpoint.records_saved
        );
        Ok(checkpoint)
    }
}
