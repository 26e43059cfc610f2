//! Database schema definitions and migrations
//!
//! This module contains all SQL schema definitions for the Kibble-Ingest database.

/// Version recorded in `PRAGMA user_version`
pub const SCHEMA_VERSION: i32 = 1;

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track ingestion runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    processed INTEGER NOT NULL DEFAULT 0,
    duplicates INTEGER NOT NULL DEFAULT 0,
    rejected INTEGER NOT NULL DEFAULT 0,
    dropped INTEGER NOT NULL DEFAULT 0,
    errors INTEGER NOT NULL DEFAULT 0,
    error TEXT
);

-- Single crawl-state record, upserted by key
CREATE TABLE IF NOT EXISTS crawl_state (
    state_key TEXT PRIMARY KEY,
    current_source TEXT NOT NULL,
    source_cursors TEXT NOT NULL,
    last_seen_keys TEXT NOT NULL,
    total_processed INTEGER NOT NULL DEFAULT 0,
    last_run_at TEXT,
    last_error TEXT,
    updated_at TEXT NOT NULL
);

-- Single-active-run lease
CREATE TABLE IF NOT EXISTS run_lease (
    lease_key TEXT PRIMARY KEY,
    holder TEXT NOT NULL,
    acquired_at TEXT NOT NULL,
    expires_at TEXT NOT NULL
);

-- Approved catalog, maintained by the moderation workflow
CREATE TABLE IF NOT EXISTS catalog_products (
    ean TEXT PRIMARY KEY,
    brand TEXT NOT NULL,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- Submissions awaiting human moderation
CREATE TABLE IF NOT EXISTS moderation_queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ean TEXT NOT NULL,
    brand TEXT NOT NULL,
    name TEXT NOT NULL,
    protein REAL,
    fat REAL,
    crude_fiber REAL,
    raw_ash REAL,
    moisture REAL,
    additives TEXT NOT NULL,
    image_url TEXT,
    status TEXT NOT NULL,
    submitted_at TEXT NOT NULL,
    source_id TEXT NOT NULL,
    run_session_id INTEGER NOT NULL REFERENCES runs(id)
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_moderation_queue_ean ON moderation_queue(ean);
CREATE INDEX IF NOT EXISTS idx_moderation_queue_status ON moderation_queue(status);
CREATE INDEX IF NOT EXISTS idx_moderation_queue_run ON moderation_queue(run_session_id);
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
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_initializes() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(initialize_schema(&conn).is_ok());

        let version: i32 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        initialize_schema(&conn).unwrap();
        let result = initialize_schema(&conn);

        assert!(result.is_ok());
    }

    #[test]
    fn test_tables_exist_after_init() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        let tables = vec![
            "runs",
            "crawl_state",
            "run_lease",
            "catalog_products",
            "moderation_queue",
        ];

        for table in tables {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "Table {} should exist", table);
        }
    }
}
