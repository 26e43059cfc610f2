//! Output module for run summaries and stored statistics
//!
//! This module handles:
//! - The per-run counters and the summary emitted when a run ends
//! - Statistics over the moderation queue, catalog and run history

pub mod stats;
mod summary;

pub use stats::{load_statistics, print_state, print_statistics, IngestStatistics};
pub use summary::{print_summary, RunCounters, RunSummary};
