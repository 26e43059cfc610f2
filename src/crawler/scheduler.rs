//! Run scheduler: time and record budgets plus inter-record pacing
//!
//! This module handles:
//! - The working window (time budget minus safety margin)
//! - The per-run record ceiling
//! - The fixed delay enforced between processed records
//!
//! All timing goes through `tokio::time` so paused-clock tests are exact.

use crate::config::RunConfig;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Why a run stopped taking new work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopReason {
    /// The working window elapsed
    TimeBudget,
    /// The per-run record ceiling was reached
    RecordBudget,
    /// Every source in the ring rotated in a row without an accepted record
    SourcesIdle,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::TimeBudget => "time-budget",
            StopReason::RecordBudget => "record-budget",
            StopReason::SourcesIdle => "sources-idle",
        };
        f.write_str(s)
    }
}

/// Scheduler enforcing the budgets of one run
///
/// The scheduler owns no work queue; the orchestrator asks it before every
/// fetch and every record whether the run may continue, and awaits
/// [`Scheduler::pace`] before processing each record.
#[derive(Debug)]
pub struct Scheduler {
    started: Instant,

    /// Time budget minus safety margin
    window: Duration,

    record_delay: Duration,

    max_records: u64,

    /// When the previous record was let through
    last_record: Option<Instant>,
}

impl Scheduler {
    /// Creates a scheduler whose clock starts now
    ///
    /// # Arguments
    ///
    /// * `config` - The run budgets and delays
    pub fn new(config: &RunConfig) -> Self {
        Self {
            started: Instant::now(),
            window: config.working_window(),
            record_delay: config.record_delay(),
            max_records: u64::from(config.max_records),
            last_record: None,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time left in the working window
    pub fn remaining(&self) -> Duration {
        self.window.saturating_sub(self.elapsed())
    }

    /// End of the working window
    pub fn deadline(&self) -> Instant {
        self.started + self.window
    }

    /// Returns the budget that forbids further work, if any
    ///
    /// # Arguments
    ///
    /// * `accepted` - Records accepted so far in this run
    pub fn stop_reason(&self, accepted: u64) -> Option<StopReason> {
        if accepted >= self.max_records {
            Some(StopReason::RecordBudget)
        } else if self.elapsed() >= self.window {
            Some(StopReason::TimeBudget)
        } else {
            None
        }
    }

    /// Waits out the inter-record delay, then marks a record as started
    ///
    /// The first record of a run goes through immediately. The wait never
    /// extends past the end of the working window, so a budget check after
    /// pacing sees the exhausted window instead of oversleeping it.
    pub async fn pace(&mut self) {
        if let Some(last) = self.last_record {
            let due = (last + self.record_delay).min(self.deadline());
            tokio::time::sleep_until(due).await;
        }
        self.last_record = Some(Instant::now());
    }

    /// Waits one record delay after a failed batch fetch
    pub async fn back_off(&self) {
        let due = (Instant::now() + self.record_delay).min(self.deadline());
        tokio::time::sleep_until(due).await;
    }
}
