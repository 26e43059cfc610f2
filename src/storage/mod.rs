//! Storage module for persisting ingestion data
//!
//! This module handles all database operations for the pipeline, including:
//! - SQLite database initialization and schema management
//! - The crawl-state record and the single-active-run lease
//! - Durable catalog membership for deduplication
//! - The moderation queue (submission sink)
//! - Run history

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::output::RunCounters;
use crate::product::CanonicalProduct;
use chrono::{DateTime, Utc};
use std::path::Path;

/// Opens (or creates) the storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully opened storage with schema in place
/// * `Err(StorageError)` - Failed to open the database
pub fn open_storage(path: &Path) -> StorageResult<SqliteStorage> {
    SqliteStorage::new(path)
}

/// A record handed to the moderation queue
#[derive(Debug, Clone)]
pub struct Submission {
    pub product: CanonicalProduct,
    pub status: SubmissionStatus,
    pub submitted_at: DateTime<Utc>,
    /// `runs.id` of the run that produced the submission
    pub run_session_id: i64,
}

impl Submission {
    /// Creates a new submission awaiting moderation
    pub fn pending(product: CanonicalProduct, run_session_id: i64) -> Self {
        Self {
            product,
            status: SubmissionStatus::Pending,
            submitted_at: Utc::now(),
            run_session_id,
        }
    }
}

/// A row of the moderation queue as read back from storage
#[derive(Debug, Clone)]
pub struct SubmissionRecord {
    pub id: i64,
    pub ean: String,
    pub brand: String,
    pub name: String,
    pub status: SubmissionStatus,
    pub submitted_at: String,
    pub source_id: String,
    pub run_session_id: i64,
}

/// Moderation status of a submission
///
/// This pipeline only ever writes `Pending`; the other states are set by the
/// human moderation workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SubmissionStatus {
    Pending,
    Approved,
    Rejected,
}

impl SubmissionStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "APPROVED" => Some(Self::Approved),
            "REJECTED" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// Represents an ingestion run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
    pub counters: RunCounters,
    /// Why the run failed, when it did
    pub error: Option<String>,
}

/// Status of an ingestion run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Result of trying to take the single-active-run lease
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseOutcome {
    Acquired,
    /// Another holder has a lease that has not expired yet
    HeldBy { holder: String, expires_at: String },
}
