//! Configuration module for Kibble-Ingest
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Run budgets and politeness delays live here rather than in code so operators
//! can tune them per deployment.
//!
//! # Example
//!
//! ```no_run
//! use kibble_ingest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("kibble.toml")).unwrap();
//! println!("Inter-record delay: {}ms", config.run.record_delay_ms);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{
    ApiSourceConfig, CatalogSourceConfig, Config, RunConfig, SourcesConfig, StorageConfig,
    UserAgentConfig,
};

pub use parser::{compute_config_hash, load_config, load_config_with_hash};
pub use validation::validate as validate_config;
