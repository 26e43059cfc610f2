//! Per-run counters and the end-of-run summary

use crate::crawler::StopReason;
use crate::state::SourceId;
use serde::Serialize;
use std::collections::BTreeMap;

/// Outcome counters of one run
///
/// Every record a fetcher returns lands in exactly one of `processed`,
/// `duplicates`, `rejected` or `dropped`, unless its submission failed, in
/// which case it is counted under `errors`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunCounters {
    /// Records accepted into the moderation queue
    pub processed: u64,

    /// Records whose EAN was already in the catalog or accepted earlier in the run
    pub duplicates: u64,

    /// Records that failed validation
    pub rejected: u64,

    /// Records without a usable EAN
    pub dropped: u64,

    /// Transient failures: batch fetches, single detail pages, sink writes
    pub errors: u64,
}

/// Summary emitted when a run ends
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    /// `runs.id` of this run; also stamped on every submission it made
    pub run_session_id: i64,

    #[serde(flatten)]
    pub counters: RunCounters,

    /// Accepted records per source
    pub per_source_counts: BTreeMap<SourceId, u64>,

    pub rotations: u32,

    pub checkpoint_failures: u32,

    pub stop_reason: StopReason,

    pub elapsed_ms: u64,

    /// Source the next run starts from
    pub final_source: SourceId,
}

/// Prints a run summary to stdout in a formatted manner
///
/// # Arguments
///
/// * `summary` - The summary to display
pub fn print_summary(summary: &RunSummary) {
    let counters = &summary.counters;

    println!("=== Run {} Summary ===\n", summary.run_session_id);

    println!("Records:");
    println!("  Accepted: {}", counters.processed);
    println!("  Duplicates: {}", counters.duplicates);
    println!("  Rejected: {}", counters.rejected);
    println!("  Dropped: {}", counters.dropped);
    println!("  Errors: {}", counters.errors);
    println!();

    println!("Accepted by Source:");
    for (source, count) in &summary.per_source_counts {
        println!("  {}: {}", source, count);
    }
    println!();

    println!(
        "Stopped: {} after {:.1}s ({} rotations, next source {})",
        summary.stop_reason,
        summary.elapsed_ms as f64 / 1000.0,
        summary.rotations,
        summary.final_source
    );
    if summary.checkpoint_failures > 0 {
        println!("Checkpoint failures: {}", summary.checkpoint_failures);
    }
}
