//! Mutable bookkeeping of one run

use crate::crawler::dedup::DedupIndex;
use crate::output::RunCounters;
use crate::state::SourceId;
use std::collections::BTreeMap;

/// Everything a run accumulates besides the durable crawl state
#[derive(Debug)]
pub struct RunContext {
    pub run_session_id: i64,
    pub counters: RunCounters,
    pub per_source: BTreeMap<SourceId, u64>,
    pub dedup: DedupIndex,

    /// Most recent transient error, written to `CrawlState::last_error` at run end
    pub last_error: Option<String>,

    pub rotations: u32,
    pub checkpoint_failures: u32,

    /// Rotations in a row without an accepted record
    pub idle_rotations: usize,

    /// Whole-batch fetch failures of the active source in a row
    pub fetch_failures: u32,

    /// Accepted records since the last successful or attempted checkpoint
    pub since_checkpoint: u32,
}

impl RunContext {
    pub fn new(run_session_id: i64) -> Self {
        Self {
            run_session_id,
            counters: RunCounters::default(),
            per_source: SourceId::RING.iter().map(|source| (*source, 0)).collect(),
            dedup: DedupIndex::new(),
            last_error: None,
            rotations: 0,
            checkpoint_failures: 0,
            idle_rotations: 0,
            fetch_failures: 0,
            since_checkpoint: 0,
        }
    }

    /// Counts a transient error and remembers it as the latest one
    pub fn record_error(&mut self, message: String) {
        self.counters.errors += 1;
        self.last_error = Some(message);
    }

    pub fn record_accepted(&mut self, source: SourceId) {
        self.counters.processed += 1;
        *self.per_source.entry(source).or_default() += 1;
        self.idle_rotations = 0;
        self.since_checkpoint += 1;
    }

    /// Notes a change of active source
    pub fn record_rotation(&mut self) {
        self.rotations += 1;
        self.idle_rotations += 1;
        self.fetch_failures = 0;
    }

    /// Every source rotated in a row without an accepted record
    pub fn ring_idle(&self) -> bool {
        self.idle_rotations >= SourceId::RING.len()
    }
}
