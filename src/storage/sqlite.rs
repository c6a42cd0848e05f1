//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the queue, record
//! and checkpoint storage traits.

use crate::extract::Record;
use crate::state::UnitState;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{
    CheckpointStore, QueueStore, RecordStore, StorageError, StorageResult,
};
use crate::storage::{CatalogItem, Checkpoint, StoreStats, UnitKey, WorkUnit};
use crate::HarvestError;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::collections::HashMap;
use std::path::Path;

const UNIT_COLUMNS: &str = "id, origin, group_id, subject, state, priority, last_claimed_at,
     pages_processed, total_pages_estimate, records_found";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(HarvestError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, HarvestError> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
            PRAGMA mmap_size = 268435456;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing and dry runs)
    pub fn new_in_memory() -> Result<Self, HarvestError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn row_to_unit(row: &Row<'_>) -> rusqlite::Result<WorkUnit> {
    let raw_state: String = row.get(4)?;
    let state = UnitState::from_db_string(&raw_state).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            Type::Text,
            format!("unknown unit state '{}'", raw_state).into(),
        )
    })?;

    Ok(WorkUnit {
        id: row.get(0)?,
        key: UnitKey {
            origin: row.get(1)?,
            group: row.get(2)?,
            subject: row.get(3)?,
        },
        state,
        priority: row.get(5)?,
        last_claimed_at: row.get(6)?,
        pages_processed: row.get(7)?,
        total_pages_estimate: row.get(8)?,
        records_found: row.get(9)?,
    })
}

fn parse_timestamp(raw: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Serialization(format!("Bad timestamp '{}': {}", raw, e)))
}

impl QueueStore for SqliteStorage {
    // ===== Initialization =====

    fn replace_units(&mut self, items: &[CatalogItem]) -> StorageResult<usize> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM work_units", [])?;

        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO work_units
                 (origin, group_id, subject, state, priority, total_pages_estimate, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for item in items {
                inserted += stmt.execute(params![
                    item.key.origin,
                    item.key.group,
                    item.key.subject,
                    UnitState::Pending.to_db_string(),
                    item.priority,
                    item.total_pages_estimate,
                    now,
                ])?;
            }
        }

        tx.commit()?;
        Ok(inserted)
    }

    // ===== Transitions =====

    fn claim_next_unit(&mut self) -> StorageResult<Option<WorkUnit>> {
        // IMMEDIATE takes the write lock up front so select-then-update is atomic
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let candidate: Option<i64> = tx
            .query_row(
                "SELECT id FROM work_units WHERE state = ?1
                 ORDER BY priority DESC, RANDOM() LIMIT 1",
                params![UnitState::Pending.to_db_string()],
                |row| row.get(0),
            )
            .optional()?;

        let id = match candidate {
            Some(id) => id,
            None => {
                tx.commit()?;
                return Ok(None);
            }
        };

        let now = Utc::now().to_rfc3339();
        let updated = tx.execute(
            "UPDATE work_units SET state = ?1, last_claimed_at = ?2 WHERE id = ?3 AND state = ?4",
            params![
                UnitState::Processing.to_db_string(),
                now,
                id,
                UnitState::Pending.to_db_string()
            ],
        )?;
        if updated == 0 {
            tx.commit()?;
            return Ok(None);
        }

        let unit = tx.query_row(
            &format!("SELECT {} FROM work_units WHERE id = ?1", UNIT_COLUMNS),
            params![id],
            row_to_unit,
        )?;

        tx.commit()?;
        Ok(Some(unit))
    }

    fn complete_unit(
        &mut self,
        key: &UnitKey,
        pages_processed: u32,
        records_found: u32,
    ) -> StorageResult<bool> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE work_units
             SET state = ?1, pages_processed = ?2, records_found = ?3, completed_at = ?4,
                 total_pages_estimate = MAX(total_pages_estimate, ?2)
             WHERE origin = ?5 AND group_id = ?6 AND subject = ?7 AND state != ?1",
            params![
                UnitState::Completed.to_db_string(),
                pages_processed,
                records_found,
                now,
                key.origin,
                key.group,
                key.subject
            ],
        )?;

        if updated > 0 {
            return Ok(true);
        }

        match self.get_unit(key)? {
            Some(_) => Ok(false),
            None => Err(StorageError::UnitNotFound(key.label())),
        }
    }

    fn release_unit(&mut self, key: &UnitKey) -> StorageResult<bool> {
        let updated = self.conn.execute(
            "UPDATE work_units SET state = ?1
             WHERE origin = ?2 AND group_id = ?3 AND subject = ?4 AND state = ?5",
            params![
                UnitState::Pending.to_db_string(),
                key.origin,
                key.group,
                key.subject,
                UnitState::Processing.to_db_string()
            ],
        )?;
        Ok(updated > 0)
    }

    fn requeue_processing_units(&mut self) -> StorageResult<usize> {
        let requeued = self.conn.execute(
            "UPDATE work_units SET state = ?1 WHERE state = ?2",
            params![
                UnitState::Pending.to_db_string(),
                UnitState::Processing.to_db_string()
            ],
        )?;
        Ok(requeued)
    }

    fn reset_all_units(&mut self) -> StorageResult<usize> {
        let reset = self.conn.execute(
            "UPDATE work_units
             SET state = ?1, last_claimed_at = NULL, completed_at = NULL,
                 pages_processed = 0, records_found = 0",
            params![UnitState::Pending.to_db_string()],
        )?;
        Ok(reset)
    }

    // ===== Queries =====

    fn count_units_by_state(&self) -> StorageResult<HashMap<UnitState, u64>> {
        let mut counts: HashMap<UnitState, u64> = UnitState::all_states()
            .into_iter()
            .map(|state| (state, 0))
            .collect();

        let mut stmt = self
            .conn
            .prepare("SELECT state, COUNT(*) FROM work_units GROUP BY state")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        for row in rows {
            let (state_str, count) = row?;
            if let Some(state) = UnitState::from_db_string(&state_str) {
                counts.insert(state, count as u64);
            }
        }

        Ok(counts)
    }

    fn get_unit(&self, key: &UnitKey) -> StorageResult<Option<WorkUnit>> {
        let unit = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM work_units WHERE origin = ?1 AND group_id = ?2 AND subject = ?3",
                    UNIT_COLUMNS
                ),
                params![key.origin, key.group, key.subject],
                row_to_unit,
            )
            .optional()?;
        Ok(unit)
    }

    fn count_units(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM work_units", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn sum_records_found(&self) -> StorageResult<u64> {
        let sum: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(records_found), 0) FROM work_units",
            [],
            |row| row.get(0),
        )?;
        Ok(sum as u64)
    }
}

impl RecordStore for SqliteStorage {
    fn record_exists(&self, fingerprint: &str) -> StorageResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM records WHERE fingerprint = ?1",
                params![fingerprint],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn save_records(&mut self, records: &[Record]) -> StorageResult<usize> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;

        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO records
                 (fingerprint, origin, kind, group_id, subject, url, title, body,
                  author, rating, year, mileage, pros, cons, saved_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            )?;
            for record in records {
                inserted += stmt.execute(params![
                    record.fingerprint(),
                    record.origin,
                    record.kind,
                    record.group,
                    record.subject,
                    record.url,
                    record.title,
                    record.body,
                    record.author,
                    record.rating,
                    record.year,
                    record.mileage,
                    record.pros,
                    record.cons,
                    now,
                ])?;
            }
        }

        tx.commit()?;
        Ok(inserted)
    }

    fn record_stats(&self) -> StorageResult<StoreStats> {
        let total: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;

        let grouped = |column: &str| -> StorageResult<HashMap<String, u64>> {
            let mut stmt = self.conn.prepare(&format!(
                "SELECT {0}, COUNT(*) FROM records GROUP BY {0}",
                column
            ))?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;

            let mut map = HashMap::new();
            for row in rows {
                let (key, count) = row?;
                map.insert(key, count as u64);
            }
            Ok(map)
        };

        let by_origin = grouped("origin")?;
        let by_kind = grouped("kind")?;

        Ok(StoreStats {
            total_records: total as u64,
            by_origin,
            by_kind,
        })
    }
}

impl CheckpointStore for SqliteStorage {
    fn insert_checkpoint(&mut self, checkpoint: &Checkpoint) -> StorageResult<i64> {
        self.conn.execute(
            "INSERT INTO checkpoints
             (total_units, completed_units, pending_units, processing_units, in_flight,
              records_saved, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                checkpoint.total_units as i64,
                checkpoint.completed_units as i64,
                checkpoint.pending_units as i64,
                checkpoint.processing_units as i64,
                checkpoint.in_flight,
                checkpoint.records_saved as i64,
                checkpoint.created_at.to_rfc3339(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn latest_checkpoint(&self) -> StorageResult<Option<Checkpoint>> {
        let row = self
            .conn
            .query_row(
                "SELECT total_units, completed_units, pending_units, processing_units,
                        in_flight, records_saved, created_at
                 FROM checkpoints ORDER BY id DESC LIMIT 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, i64>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                },
            )
            .optional()?;

        let (total, completed, pending, processing, in_flight, records, created_at) = match row {
            Some(row) => row,
            None => return Ok(None),
        };

        Ok(Some(Checkpoint {
            total_units: total as u64,
            completed_units: completed as u64,
            pending_units: pending as u64,
            processing_units: processing as u64,
            in_flight,
            records_saved: records as u64,
            created_at: parse_timestamp(&created_at)?,
        }))
    }
}
