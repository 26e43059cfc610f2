//! Durable run-progress record
//!
//! One logical `CrawlState` exists per deployment. It is loaded at run start,
//! mutated in memory by the coordinator and persisted at checkpoints and once
//! more when the run ends.

use crate::state::source::{Cursor, SourceId, INITIAL_CURSOR};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Progress of the ingestion across runs
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlState {
    /// Source the next batch is fetched from
    pub current_source: SourceId,

    /// Next cursor to fetch, per source
    pub per_source_cursor: BTreeMap<SourceId, Cursor>,

    /// Key (EAN) of the last record resolved from each source
    pub last_seen_key: BTreeMap<SourceId, String>,

    /// Accepted records across all runs
    pub total_processed: u64,

    pub last_run_at: Option<DateTime<Utc>>,

    /// Error condition reported by the last run, for operator inspection
    ///
    /// A fatal failure of the previous run (a final checkpoint that was not
    /// saved, or a run that never finished) takes precedence; otherwise this
    /// is the most recent transient error, and `None` after a clean run.
    pub last_error: Option<String>,
}

impl Default for CrawlState {
    fn default() -> Self {
        Self {
            current_source: SourceId::RING[0],
            per_source_cursor: SourceId::RING
                .iter()
                .map(|source| (*source, INITIAL_CURSOR))
                .collect(),
            last_seen_key: BTreeMap::new(),
            total_processed: 0,
            last_run_at: None,
            last_error: None,
        }
    }
}

impl CrawlState {
    /// Returns the cursor for a source (the initial cursor if it never progressed)
    pub fn cursor(&self, source: SourceId) -> Cursor {
        self.per_source_cursor
            .get(&source)
            .copied()
            .unwrap_or(INITIAL_CURSOR)
    }

    pub fn set_cursor(&mut self, source: SourceId, cursor: Cursor) {
        self.per_source_cursor.insert(source, cursor);
    }

    pub fn record_seen(&mut self, source: SourceId, key: &str) {
        self.last_seen_key.insert(source, key.to_string());
    }

    /// Rotates away from an exhausted source
    ///
    /// The exhausted source's cursor goes back to its initial value so it is
    /// re-scanned on its next turn; every other cursor is left untouched.
    pub fn rotate_exhausted(&mut self) -> SourceId {
        let exhausted = self.current_source;
        self.set_cursor(exhausted, INITIAL_CURSOR);
        self.current_source = exhausted.next();
        self.current_source
    }

    /// Rotates away from a failing source, keeping its cursor for its next turn
    pub fn rotate_keeping_cursor(&mut self) -> SourceId {
        self.current_source = self.current_source.next();
        self.current_source
    }
}
