//! Storage module for persisting harvest data
//!
//! This module handles all database operations for the harvester, including:
//! - SQLite database initialization and schema management
//! - The work-unit queue and its state transitions
//! - Deduplicated record persistence
//! - Advisory progress checkpoints

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{CheckpointStore, QueueStore, RecordStore, StorageError, StorageResult};

use crate::state::UnitState;
use crate::HarvestError;

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// Initializes or opens a storage database
///
/// Missing parent directories are created.
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(HarvestError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> Result<SqliteStorage, HarvestError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    SqliteStorage::new(path)
}

/// Identity of a work unit: one (group, subject) pair on one origin
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnitKey {
    pub origin: String,
    pub group: String,
    pub subject: String,
}

impl UnitKey {
    pub fn new(
        origin: impl Into<String>,
        group: impl Into<String>,
        subject: impl Into<String>,
    ) -> Self {
        Self {
            origin: origin.into(),
            group: group.into(),
            subject: subject.into(),
        }
    }

    /// Short human-readable label, used in logs and checkpoints
    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.group, self.subject, self.origin)
    }
}

/// Represents a work unit row in the database
#[derive(Debug, Clone)]
pub struct WorkUnit {
    pub id: i64,
    pub key: UnitKey,
    pub state: UnitState,
    pub priority: i64,
    pub last_claimed_at: Option<String>,
    pub pages_processed: u32,
    pub total_pages_estimate: u32,
    pub records_found: u32,
}

/// One entry of the static catalog the queue is initialized from
#[derive(Debug, Clone)]
pub struct CatalogItem {
    pub key: UnitKey,
    pub priority: i64,
    pub total_pages_estimate: u32,
}

/// Immutable snapshot of aggregate progress
#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub total_units: u64,
    pub completed_units: u64,
    pub pending_units: u64,
    pub processing_units: u64,
    pub in_flight: Option<String>,
    pub records_saved: u64,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Builds a checkpoint from per-state unit counts
    pub fn from_counts(
        counts: &HashMap<UnitState, u64>,
        in_flight: Option<String>,
        records_saved: u64,
    ) -> Self {
        let count = |state: UnitState| counts.get(&state).copied().unwrap_or(0);
        let pending_units = count(UnitState::Pending);
        let processing_units = count(UnitState::Processing);
        let completed_units = count(UnitState::Completed);

        Self {
            total_units: pending_units + processing_units + completed_units,
            completed_units,
            pending_units,
            processing_units,
            in_flight,
            records_saved,
            created_at: Utc::now(),
        }
    }

    /// Completed fraction in percent, 0 for an empty queue
    pub fn progress_percent(&self) -> f64 {
        if self.total_units == 0 {
            return 0.0;
        }
        (self.completed_units as f64 / self.total_units as f64) * 100.0
    }
}

/// Aggregate counts over persisted records
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub total_records: u64,
    pub by_origin: HashMap<String, u64>,
    pub by_kind: HashMap<String, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_key_label() {
        let key = UnitKey::new("drom.ru", "toyota", "camry");
        assert_eq!(key.label(), "toyota/camry@drom.ru");
    }

    #[test]
    fn test_checkpoint_from_counts() {
        let mut counts = HashMap::new();
        counts.insert(UnitState::Pending, 3);
        counts.insert(UnitState::Completed, 1);

        let checkpoint = Checkpoint::from_counts(&counts, Some("a/b@c".to_string()), 12);
        assert_eq!(checkpoint.total_units, 4);
        assert_eq!(checkpoint.processing_units, 0);
        assert_eq!(checkpoint.records_saved, 12);
        assert!((checkpoint.progress_percent() - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_open_storage_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("nested").join("harvest.db");

        open_storage(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_open_storage_rejects_file_as_parent() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();

        let result = open_storage(&blocker.join("harvest.db"));
        assert!(matches!(result, Err(HarvestError::Io(_))));
    }

    #[test]
    fn test_checkpoint_progress_empty_queue() {
        let checkpoint = Checkpoint::from_counts(&HashMap::new(), None, 0);
        assert_eq!(checkpoint.progress_percent(), 0.0);
    }
}
