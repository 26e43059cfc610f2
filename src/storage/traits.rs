//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::output::RunCounters;
use crate::product::Ean;
use crate::state::{CrawlState, SourceId};
use crate::storage::{
    LeaseOutcome, RunRecord, RunStatus, Submission, SubmissionRecord, SubmissionStatus,
};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// This trait defines every durable operation the pipeline needs: the crawl
/// state store, the run lease, the catalog lookup behind deduplication, the
/// moderation-queue sink and run bookkeeping.
pub trait Storage {
    // ===== Crawl State =====

    /// Loads the crawl state
    ///
    /// Returns a default-initialized state when nothing was ever saved; only
    /// an unreachable or corrupt store is an error.
    fn load_state(&self) -> StorageResult<CrawlState>;

    /// Upserts the single crawl-state record
    fn save_state(&mut self, state: &CrawlState) -> StorageResult<()>;

    // ===== Run Lease =====

    /// Takes the single-active-run lease for `holder`
    ///
    /// # Arguments
    ///
    /// * `holder` - Identifier of the calling process
    /// * `ttl` - How long the lease stays valid without being released
    ///
    /// # Returns
    ///
    /// `LeaseOutcome::HeldBy` when another holder owns an unexpired lease
    fn acquire_lease(&mut self, holder: &str, ttl: Duration) -> StorageResult<LeaseOutcome>;

    /// Releases the lease if `holder` still owns it
    fn release_lease(&mut self, holder: &str) -> StorageResult<()>;

    // ===== Catalog =====

    /// Returns true if the EAN is already known durably
    ///
    /// Known means present in the approved catalog or already queued for
    /// moderation by an earlier run.
    fn catalog_contains(&self, ean: &Ean) -> StorageResult<bool>;

    // ===== Submission Sink =====

    /// Appends a submission to the moderation queue
    ///
    /// # Returns
    ///
    /// The ID of the queued submission
    fn submit(&mut self, submission: &Submission) -> StorageResult<i64>;

    /// Lists the submissions written by one run, oldest first
    fn get_submissions_for_run(&self, run_id: i64) -> StorageResult<Vec<SubmissionRecord>>;

    // ===== Run Management =====

    /// Creates a new run in the `running` state
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Hash of the configuration file
    ///
    /// # Returns
    ///
    /// The ID of the newly created run, used as the run session id
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Finalizes a run with its status, finish timestamp and counters
    ///
    /// `error` is kept with the run so the next run can report it.
    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        counters: &RunCounters,
        error: Option<&str>,
    ) -> StorageResult<()>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    // ===== Statistics =====

    /// Counts queued submissions grouped by moderation status
    fn count_submissions_by_status(&self) -> StorageResult<BTreeMap<SubmissionStatus, usize>>;

    /// Counts queued submissions grouped by source
    fn count_submissions_by_source(&self) -> StorageResult<BTreeMap<SourceId, usize>>;

    /// Counts products in the approved catalog
    fn count_catalog_products(&self) -> StorageResult<usize>;

    /// Counts recorded runs
    fn count_runs(&self) -> StorageResult<usize>;
}
