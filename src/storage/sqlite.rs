//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::output::RunCounters;
use crate::product::Ean;
use crate::state::{CrawlState, SourceId};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{
    LeaseOutcome, RunRecord, RunStatus, Submission, SubmissionRecord, SubmissionStatus,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, TransactionBehavior};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Key of the one crawl-state row
const STATE_KEY: &str = "default";

/// Key of the one run-lease row
const LEASE_KEY: &str = "run";

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
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Adds a product to the approved catalog (for testing)
    #[cfg(test)]
    pub fn insert_catalog_product(&self, ean: &str, brand: &str, name: &str) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO catalog_products (ean, brand, name, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![ean, brand, name, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn read_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<RunRecord> {
        Ok(RunRecord {
            id: row.get(0)?,
            started_at: row.get(1)?,
            finished_at: row.get(2)?,
            config_hash: row.get(3)?,
            status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
                .unwrap_or(RunStatus::Running),
            counters: RunCounters {
                processed: row.get::<_, i64>(5)? as u64,
                duplicates: row.get::<_, i64>(6)? as u64,
                rejected: row.get::<_, i64>(7)? as u64,
                dropped: row.get::<_, i64>(8)? as u64,
                errors: row.get::<_, i64>(9)? as u64,
            },
            error: row.get(10)?,
        })
    }
}

const RUN_COLUMNS: &str =
    "id, started_at, finished_at, config_hash, status, processed, duplicates, rejected, dropped, errors, error";

fn parse_timestamp(s: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Serialization(format!("invalid timestamp {:?}: {}", s, e)))
}

fn encode_source_map<T: Serialize>(map: &BTreeMap<SourceId, T>) -> StorageResult<String> {
    let keyed: BTreeMap<&str, &T> = map.iter().map(|(k, v)| (k.to_db_string(), v)).collect();
    Ok(serde_json::to_string(&keyed)?)
}

fn decode_source_map<T: DeserializeOwned>(json: &str) -> StorageResult<BTreeMap<SourceId, T>> {
    let keyed: BTreeMap<String, T> = serde_json::from_str(json)?;
    keyed
        .into_iter()
        .map(|(k, v)| {
            SourceId::from_db_string(&k)
                .map(|source| (source, v))
                .ok_or_else(|| StorageError::Serialization(format!("unknown source {:?}", k)))
        })
        .collect()
}

impl Storage for SqliteStorage {
    // ===== Crawl State =====

    fn load_state(&self) -> StorageResult<CrawlState> {
        let row = self
            .conn
            .query_row(
                "SELECT current_source, source_cursors, last_seen_keys, total_processed,
                 last_run_at, last_error
                 FROM crawl_state WHERE state_key = ?1",
                params![STATE_KEY],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, Option<String>>(5)?,
                    ))
                },
            )
            .optional()?;

        let Some((current, cursors, seen, total, last_run_at, last_error)) = row else {
            return Ok(CrawlState::default());
        };

        let current_source = SourceId::from_db_string(&current).ok_or_else(|| {
            StorageError::Serialization(format!("unknown current source {:?}", current))
        })?;

        // Sources missing from the stored map keep their initial cursor
        let mut state = CrawlState::default();
        state.current_source = current_source;
        state
            .per_source_cursor
            .extend(decode_source_map::<u64>(&cursors)?);
        state.last_seen_key = decode_source_map(&seen)?;
        state.total_processed = total as u64;
        state.last_run_at = last_run_at.as_deref().map(parse_timestamp).transpose()?;
        state.last_error = last_error;

        Ok(state)
    }

    fn save_state(&mut self, state: &CrawlState) -> StorageResult<()> {
        let cursors = encode_source_map(&state.per_source_cursor)?;
        let seen = encode_source_map(&state.last_seen_key)?;
        let now = Utc::now().to_rfc3339();

        self.conn.execute(
            "INSERT INTO crawl_state
             (state_key, current_source, source_cursors, last_seen_keys, total_processed,
              last_run_at, last_error, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(state_key) DO UPDATE SET
                current_source = excluded.current_source,
                source_cursors = excluded.source_cursors,
                last_seen_keys = excluded.last_seen_keys,
                total_processed = excluded.total_processed,
                last_run_at = excluded.last_run_at,
                last_error = excluded.last_error,
                updated_at = excluded.updated_at",
            params![
                STATE_KEY,
                state.current_source.to_db_string(),
                cursors,
                seen,
                state.total_processed as i64,
                state.last_run_at.map(|t| t.to_rfc3339()),
                state.last_error,
                now,
            ],
        )?;

        Ok(())
    }

    // ===== Run Lease =====

    fn acquire_lease(&mut self, holder: &str, ttl: Duration) -> StorageResult<LeaseOutcome> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| StorageError::Serialization(format!("lease ttl: {}", e)))?;
        let now = Utc::now();

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing: Option<(String, String)> = tx
            .query_row(
                "SELECT holder, expires_at FROM run_lease WHERE lease_key = ?1",
                params![LEASE_KEY],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        if let Some((current_holder, expires_at)) = existing {
            if current_holder != holder && parse_timestamp(&expires_at)? > now {
                return Ok(LeaseOutcome::HeldBy {
                    holder: current_holder,
                    expires_at,
                });
            }
        }

        tx.execute(
            "INSERT INTO run_lease (lease_key, holder, acquired_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(lease_key) DO UPDATE SET
                holder = excluded.holder,
                acquired_at = excluded.acquired_at,
                expires_at = excluded.expires_at",
            params![
                LEASE_KEY,
                holder,
                now.to_rfc3339(),
                (now + ttl).to_rfc3339()
            ],
        )?;
        tx.commit()?;

        Ok(LeaseOutcome::Acquired)
    }

    fn release_lease(&mut self, holder: &str) -> StorageResult<()> {
        self.conn.execute(
            "DELETE FROM run_lease WHERE lease_key = ?1 AND holder = ?2",
            params![LEASE_KEY, holder],
        )?;
        Ok(())
    }

    // ===== Catalog =====

    fn catalog_contains(&self, ean: &Ean) -> StorageResult<bool> {
        let known: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM catalog_products WHERE ean = ?1)
                 OR EXISTS(SELECT 1 FROM moderation_queue WHERE ean = ?1)",
            params![ean.as_str()],
            |row| row.get(0),
        )?;
        Ok(known)
    }

    // ===== Submission Sink =====

    fn submit(&mut self, submission: &Submission) -> StorageResult<i64> {
        let product = &submission.product;
        let additives = serde_json::to_string(&product.additives)?;

        let result = self.conn.execute(
            "INSERT INTO moderation_queue
             (ean, brand, name, protein, fat, crude_fiber, raw_ash, moisture, additives,
              image_url, status, submitted_at, source_id, run_session_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                product.ean.as_str(),
                product.brand,
                product.name,
                product.nutrients.protein,
                product.nutrients.fat,
                product.nutrients.crude_fiber,
                product.nutrients.raw_ash,
                product.nutrients.moisture,
                additives,
                product.image_url,
                submission.status.to_db_string(),
                submission.submitted_at.to_rfc3339(),
                product.source_id.to_db_string(),
                submission.run_session_id,
            ],
        );

        match result {
            Ok(_) => Ok(self.conn.last_insert_rowid()),
            Err(rusqlite::Error::SqliteFailure(err, msg))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Err(StorageError::ConstraintViolation(msg.unwrap_or_else(|| {
                    format!("submission for {} rejected", product.ean)
                })))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn get_submissions_for_run(&self, run_id: i64) -> StorageResult<Vec<SubmissionRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, ean, brand, name, status, submitted_at, source_id, run_session_id
             FROM moderation_queue WHERE run_session_id = ?1 ORDER BY id",
        )?;

        let rows = stmt.query_map(params![run_id], |row| {
            Ok(SubmissionRecord {
                id: row.get(0)?,
                ean: row.get(1)?,
                brand: row.get(2)?,
                name: row.get(3)?,
                status: SubmissionStatus::from_db_string(&row.get::<_, String>(4)?)
                    .unwrap_or(SubmissionStatus::Pending),
                submitted_at: row.get(5)?,
                source_id: row.get(6)?,
                run_session_id: row.get(7)?,
            })
        })?;

        let mut submissions = Vec::new();
        for row in rows {
            submissions.push(row?);
        }
        Ok(submissions)
    }

    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        counters: &RunCounters,
        error: Option<&str>,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, processed = ?3, duplicates = ?4,
             rejected = ?5, dropped = ?6, errors = ?7, error = ?8
             WHERE id = ?9",
            params![
                status.to_db_string(),
                now,
                counters.processed as i64,
                counters.duplicates as i64,
                counters.rejected as i64,
                counters.dropped as i64,
                counters.errors as i64,
                error,
                run_id
            ],
        )?;

        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        let sql = format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS);
        self.conn
            .query_row(&sql, params![run_id], Self::read_run)
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let sql = format!("SELECT {} FROM runs ORDER BY id DESC LIMIT 1", RUN_COLUMNS);
        Ok(self.conn.query_row(&sql, [], Self::read_run).optional()?)
    }

    // ===== Statistics =====

    fn count_submissions_by_status(&self) -> StorageResult<BTreeMap<SubmissionStatus, usize>> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM moderation_queue GROUP BY status")?;

        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = BTreeMap::new();
        for row in rows {
            let (status, count) = row?;
            if let Some(status) = SubmissionStatus::from_db_string(&status) {
                counts.insert(status, count as usize);
            }
        }
        Ok(counts)
    }

    fn count_submissions_by_source(&self) -> StorageResult<BTreeMap<SourceId, usize>> {
        let mut stmt = self
            .conn
            .prepare("SELECT source_id, COUNT(*) FROM moderation_queue GROUP BY source_id")?;

        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = BTreeMap::new();
        for row in rows {
            let (source, count) = row?;
            if let Some(source) = SourceId::from_db_string(&source) {
                counts.insert(source, count as usize);
            }
        }
        Ok(counts)
    }

    fn count_catalog_products(&self) -> StorageResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM catalog_products", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn count_runs(&self) -> StorageResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM runs", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
