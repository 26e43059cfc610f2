//! State module for tracking ingestion progress
//!
//! # Components
//!
//! - `SourceId`: the three upstream sources and their rotation ring
//! - `CrawlState`: durable progress (active source, per-source cursors, counters)

mod crawl_state;
mod source;

pub use crawl_state::CrawlState;
pub use source::{Cursor, SourceId, INITIAL_CURSOR};
