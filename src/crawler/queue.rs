//! Persistent work-unit queue
//!
//! Thin shared handle over a `QueueStore`. Each operation takes the storage
//! lock for exactly one backend call, so every transition is atomic with
//! respect to other workers.

use crate::state::UnitState;
use crate::storage::{CatalogItem, QueueStore, StorageResult, UnitKey, WorkUnit};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Queue backend shared between workers
pub type SharedQueueStore = Arc<Mutex<dyn QueueStore + Send>>;

/// Handle to the crawl queue; cheap to clone
#[derive(Clone)]
pub struct TaskQueue {
    store: SharedQueueStore,
}

impl TaskQueue {
    pub fn new(store: SharedQueueStore) -> Self {
        Self { store }
    }

    fn with_store<R>(
        &self,
        op: impl FnOnce(&mut (dyn QueueStore + Send + 'static)) -> StorageResult<R>,
    ) -> StorageResult<R> {
        // A panicking holder leaves no open transaction; rusqlite rolls back on drop
        let mut store = self.store.lock().unwrap_or_else(|e| e.into_inner());
        op(&mut *store)
    }

    /// Replaces all units with a fresh pending set built from the catalog
    ///
    /// Destructive: previous progress is discarded.
    pub fn initialize(&self, catalog: &[CatalogItem]) -> StorageResult<usize> {
        self.with_store(|store| store.replace_units(catalog))
    }

    /// Claims the next pending unit, or `None` when the queue is drained
    pub fn claim_next(&self) -> StorageResult<Option<WorkUnit>> {
        self.with_store(|store| store.claim_next_unit())
    }

    /// Marks a unit completed; completing twice is a no-op
    ///
    /// # Returns
    ///
    /// `true` if this call performed the transition
    pub fn mark_completed(
        &self,
        key: &UnitKey,
        pages_processed: u32,
        records_found: u32,
    ) -> StorageResult<bool> {
        self.with_store(|store| store.complete_unit(key, pages_processed, records_found))
    }

    /// Unit counts per state
    pub fn stats(&self) -> StorageResult<HashMap<UnitState, u64>> {
        self.with_store(|store| store.count_units_by_state())
    }

    /// Hands a claimed unit back to `pending` without completing it
    ///
    /// # Returns
    ///
    /// `true` if the unit was processing
    pub fn release(&self, key: &UnitKey) -> StorageResult<bool> {
        self.with_store(|store| store.release_unit(key))
    }

    /// Returns units left in `processing` by a previous process to `pending`
    pub fn recover(&self) -> StorageResult<usize> {
        self.with_store(|store| store.requeue_processing_units())
    }

    /// Re-queues every unit as `pending`
    pub fn reset(&self) -> StorageResult<usize> {
        self.with_store(|store| store.reset_all_units())
    }

    /// Sum of records recorded on completed units
    pub fn total_records(&self) -> StorageResult<u64> {
        self.with_store(|store| store.sum_records_found())
    }

    pub fn get(&self, key: &UnitKey) -> StorageResult<Option<WorkUnit>> {
        self.with_store(|store| store.get_unit(key))
    }

    pub fn is_empty(&self) -> StorageResult<bool> {
        self.with_store(|store| store.count_units().map(|count| count == 0))
    }
}
