//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the harvester database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Crawl targets: one row per (origin, group, subject)
CREATE TABLE IF NOT EXISTS work_units (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    origin TEXT NOT NULL,
    group_id TEXT NOT NULL,
    subject TEXT NOT NULL,
    state TEXT NOT NULL DEFAULT 'pending',
    priority INTEGER NOT NULL DEFAULT 1,
    last_claimed_at TEXT,
    completed_at TEXT,
    pages_processed INTEGER NOT NULL DEFAULT 0,
    total_pages_estimate INTEGER NOT NULL DEFAULT 0,
    records_found INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    UNIQUE(origin, group_id, subject)
);

CREATE INDEX IF NOT EXISTS idx_work_units_state ON work_units(state, priority);

-- Harvested records, deduplicated by content fingerprint
CREATE TABLE IF NOT EXISTS records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    fingerprint TEXT NOT NULL UNIQUE,
    origin TEXT NOT NULL,
    kind TEXT NOT NULL,
    group_id TEXT NOT NULL,
    subject TEXT NOT NULL,
    url TEXT NOT NULL,
    title TEXT NOT NULL,
    body TEXT NOT NULL,
    author TEXT,
    rating REAL,
    year INTEGER,
    mileage INTEGER,
    pros TEXT,
    cons TEXT,
    saved_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_records_origin ON records(origin);
CREATE INDEX IF NOT EXISTS idx_records_subject ON records(group_id, subject);

-- Advisory progress snapshots
CREATE TABLE IF NOT EXISTS checkpoints (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    total_units INTEGER NOT NULL,
    completed_units INTEGER NOT NULL,
    pending_units INTEGER NOT NULL,
    processing_units INTEGER NOT NULL,
    in_flight TEXT,
    records_saved INTEGER NOT NULL,
    created_at TEXT NOT NULL
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
