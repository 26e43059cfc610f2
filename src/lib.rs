//! Kibble-Ingest: a resumable dog-food product ingestion pipeline
//!
//! This crate discovers dog-food product records (keyed by EAN barcode) from a
//! paginated JSON API and two HTML catalog sites, normalizes them into one
//! canonical shape, deduplicates them against the existing catalog, validates
//! them and queues the survivors for human moderation. Every invocation is a
//! short, budgeted run that picks up where the previous one stopped.

pub mod config;
pub mod crawler;
pub mod output;
pub mod product;
pub mod robots;
pub mod sources;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Kibble-Ingest operations
///
/// Only the variants produced before the crawl loop starts (`StateLoad`,
/// `LeaseHeld`, `Lease`, `Config`, `SourceSetup`) and `FinalCheckpoint` ever
/// escape a run; everything else is absorbed into the run counters.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to load crawl state: {0}")]
    StateLoad(#[source] storage::StorageError),

    #[error("Another run holds the lease ({holder}) until {expires_at}")]
    LeaseHeld { holder: String, expires_at: String },

    #[error("Failed to acquire run lease: {0}")]
    Lease(#[source] storage::StorageError),

    #[error("Failed to persist crawl state at run end: {source}")]
    FinalCheckpoint {
        source: storage::StorageError,
        summary: Box<output::RunSummary>,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Source setup error: {0}")]
    SourceSetup(String),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestError {
    /// Returns the run summary attached to a failed final checkpoint, if any
    pub fn summary(&self) -> Option<&output::RunSummary> {
        match self {
            Self::FinalCheckpoint { summary, .. } => Some(summary),
            _ => None,
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid CSS selector in config: {0}")]
    InvalidSelector(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,
}

/// Result type alias for Kibble-Ingest operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{run_ingest, Coordinator};
pub use output::RunSummary;
pub use product::{CanonicalProduct, Ean};
pub use state::{CrawlState, SourceId};
