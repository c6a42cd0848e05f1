//! Storage traits and error types
//!
//! This module defines the trait interfaces for storage backends and
//! associated error types. The queue, record and checkpoint concerns are
//! separate traits so components can be handed only the slice they need.

use crate::extract::Record;
use crate::state::UnitState;
use crate::storage::{CatalogItem, Checkpoint, StoreStats, UnitKey, WorkUnit};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Work unit not found: {0}")]
    UnitNotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Persistent work-unit queue
///
/// Every state transition must be atomic with respect to other callers of
/// the same backend.
pub trait QueueStore {
    // ===== Initialization =====

    /// Replaces every unit with a fresh pending set
    ///
    /// # Arguments
    ///
    /// * `items` - Catalog entries to insert
    ///
    /// # Returns
    ///
    /// The number of units inserted (duplicate keys are collapsed)
    fn replace_units(&mut self, items: &[CatalogItem]) -> StorageResult<usize>;

    // ===== Transitions =====

    /// Atomically claims the highest-priority pending unit
    ///
    /// Ties on priority are broken randomly. The claimed unit is moved to
    /// `processing` and its last-claimed timestamp is stamped.
    ///
    /// # Returns
    ///
    /// The claimed unit, or `None` when no pending unit remains
    fn claim_next_unit(&mut self) -> StorageResult<Option<WorkUnit>>;

    /// Moves a unit to `completed` and records its counters
    ///
    /// # Returns
    ///
    /// `true` if the unit transitioned, `false` if it was already completed
    fn complete_unit(
        &mut self,
        key: &UnitKey,
        pages_processed: u32,
        records_found: u32,
    ) -> StorageResult<bool>;

    /// Moves one `processing` unit back to `pending`
    ///
    /// # Returns
    ///
    /// `true` if the unit was processing and has been released
    fn release_unit(&mut self, key: &UnitKey) -> StorageResult<bool>;

    /// Moves every `processing` unit back to `pending`
    ///
    /// Returns the number of units re-queued.
    fn requeue_processing_units(&mut self) -> StorageResult<usize>;

    /// Moves every unit back to `pending` and clears its counters
    fn reset_all_units(&mut self) -> StorageResult<usize>;

    // ===== Queries =====

    /// Counts units per state; states with no units are present with 0
    fn count_units_by_state(&self) -> StorageResult<HashMap<UnitState, u64>>;

    /// Gets a unit by key
    fn get_unit(&self, key: &UnitKey) -> StorageResult<Option<WorkUnit>>;

    /// Gets total unit count
    fn count_units(&self) -> StorageResult<u64>;

    /// Sums `records_found` over all units
    fn sum_records_found(&self) -> StorageResult<u64>;
}

/// Deduplicating record store
pub trait RecordStore {
    /// Checks whether a record with this fingerprint is already persisted
    fn record_exists(&self, fingerprint: &str) -> StorageResult<bool>;

    /// Persists a batch of records in one transaction
    ///
    /// Records whose fingerprint already exists are skipped.
    ///
    /// # Returns
    ///
    /// The number of records actually inserted
    fn save_records(&mut self, records: &[Record]) -> StorageResult<usize>;

    /// Gets aggregate counts over persisted records
    fn record_stats(&self) -> StorageResult<StoreStats>;
}

/// Append-only checkpoint log
pub trait CheckpointStore {
    /// Writes a checkpoint row
    fn insert_checkpoint(&mut self, checkpoint: &Checkpoint) -> StorageResult<i64>;

    /// Gets the most recent checkpoint
    fn latest_checkpoint(&self) -> StorageResult<Option<Checkpoint>>;
}
