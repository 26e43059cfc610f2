//! Cursor commit and source rotation
//!
//! After each batch the coordinator decides whether the active source keeps
//! its turn. A cursor only ever moves past a batch once every record in that
//! batch has been resolved (accepted, duplicate, rejected or dropped).

use crate::state::{CrawlState, Cursor, SourceId};

/// What happened to one fetched batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Cursor the batch was fetched at
    pub cursor: Cursor,

    /// Cursor the fetcher reported for the following batch
    pub next_cursor: Cursor,

    /// The fetcher reported nothing further at this cursor
    pub exhausted: bool,

    /// Records accepted or recognized as duplicates
    pub surfaced: u64,

    /// Transient per-record failures, including fetch errors for single records
    pub errors: u64,

    /// Every record of the batch was resolved before a budget stop
    pub completed: bool,

    /// The fetcher returned only part of the page because its budget ran out
    pub truncated: bool,
}

/// State change applied after a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The batch was cut short; its cursor is kept so the next run re-fetches it
    Hold,
    /// The source keeps its turn and moves to the next cursor
    Advance { from: Cursor, to: Cursor },
    /// The turn passes to the next source in the ring
    Rotate { from: SourceId, to: SourceId },
}

/// Applies a batch outcome to the crawl state
///
/// A source rotates when it reports exhaustion, or when a completed, whole
/// batch had no accepted or duplicate record and no error. Rotation resets the
/// cursor of the source being left. A batch with errors but nothing usable
/// keeps the source's turn, and so does a truncated one.
///
/// # Arguments
///
/// * `state` - The crawl state; `current_source` is the source the batch came from
/// * `outcome` - The batch outcome
pub fn apply_batch(state: &mut CrawlState, outcome: &BatchOutcome) -> Transition {
    if !outcome.completed {
        return Transition::Hold;
    }

    let from = state.current_source;
    let silent = outcome.surfaced == 0 && outcome.errors == 0 && !outcome.truncated;
    if outcome.exhausted || silent {
        let to = state.rotate_exhausted();
        return Transition::Rotate { from, to };
    }

    state.set_cursor(from, outcome.next_cursor);
    Transition::Advance {
        from: outcome.cursor,
        to: outcome.next_cursor,
    }
}

/// Applies a whole-batch fetch failure to the crawl state
///
/// The source keeps its turn and its cursor until it has failed
/// `max_failures` times in a row; it then yields the turn but keeps its
/// cursor, so the failed page is retried on its next turn.
///
/// # Arguments
///
/// * `state` - The crawl state
/// * `consecutive_failures` - Failures of the active source in a row, including this one
/// * `max_failures` - Failures tolerated before rotating away
pub fn apply_fetch_failure(
    state: &mut CrawlState,
    consecutive_failures: u32,
    max_failures: u32,
) -> Transition {
    if consecutive_failures < max_failures {
        return Transition::Hold;
    }

    let from = state.current_source;
    let to = state.rotate_keeping_cursor();
    Transition::Rotate { from, to }
}

/// Applies a batch fetch that was still running when the run's time ran out
///
/// The fetch used up the rest of the run, so no failure streak can build up
/// within one run; the source yields its turn at once and keeps its cursor.
pub fn apply_fetch_overrun(state: &mut CrawlState) -> Transition {
    let from = state.current_source;
    let to = state.rotate_keeping_cursor();
    Transition::Rotate { from, to }
}
