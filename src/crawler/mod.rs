//! Crawler module: run orchestration and HTTP plumbing
//!
//! This module contains the core ingestion logic, including:
//! - HTTP client construction and fetch helpers shared by all sources
//! - Run budgets and inter-record pacing
//! - Cursor commits and source rotation
//! - Two-tier deduplication
//! - Overall run coordination

mod context;
mod coordinator;
mod dedup;
mod fetcher;
mod rotation;
mod scheduler;

pub use context::RunContext;
pub use coordinator::{run_ingest, Coordinator};
pub use dedup::DedupIndex;
pub use fetcher::{build_http_client, fetch_json, fetch_text, FetchError};
pub use rotation::{
    apply_batch, apply_fetch_failure, apply_fetch_overrun, BatchOutcome, Transition,
};
pub use scheduler::{Scheduler, StopReason};
