//! Statistics generation from the ingestion database
//!
//! This module provides functionality for extracting and displaying
//! moderation-queue, catalog and run statistics from the storage layer.

use crate::state::{CrawlState, SourceId};
use crate::storage::{RunRecord, Storage, SubmissionStatus};
use crate::IngestError;
use std::collections::BTreeMap;

/// Ingestion statistics summary
#[derive(Debug, Clone)]
pub struct IngestStatistics {
    /// Count of queued submissions by moderation status
    pub submissions_by_status: BTreeMap<SubmissionStatus, usize>,

    /// Count of queued submissions by the source that produced them
    pub submissions_by_source: BTreeMap<SourceId, usize>,

    /// Products in the approved catalog
    pub catalog_products: usize,

    /// Number of recorded runs
    pub runs: usize,

    pub latest_run: Option<RunRecord>,
}

impl IngestStatistics {
    pub fn total_submissions(&self) -> usize {
        self.submissions_by_status.values().sum()
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(IngestStatistics)` - Successfully loaded statistics
/// * `Err(IngestError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> Result<IngestStatistics, IngestError> {
    Ok(IngestStatistics {
        submissions_by_status: storage.count_submissions_by_status()?,
        submissions_by_source: storage.count_submissions_by_source()?,
        catalog_products: storage.count_catalog_products()?,
        runs: storage.count_runs()?,
        latest_run: storage.get_latest_run()?,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &IngestStatistics) {
    println!("=== Ingestion Statistics ===\n");

    println!("Overview:");
    println!("  Catalog products: {}", stats.catalog_products);
    println!("  Queued submissions: {}", stats.total_submissions());
    println!("  Runs recorded: {}", stats.runs);
    println!();

    let total = stats.total_submissions();
    if total > 0 {
        println!("Submissions by Status:");
        for (status, count) in &stats.submissions_by_status {
            let percentage = (*count as f64 / total as f64) * 100.0;
            println!("  {}: {} ({:.1}%)", status.to_db_string(), count, percentage);
        }
        println!();

        println!("Submissions by Source:");
        let mut source_counts: Vec<_> = stats.submissions_by_source.iter().collect();
        source_counts.sort_by(|a, b| b.1.cmp(a.1));
        for (source, count) in source_counts {
            println!("  {}: {}", source, count);
        }
        println!();
    }

    if let Some(run) = &stats.latest_run {
        println!("Latest Run ({}):", run.id);
        println!("  Status: {}", run.status.to_db_string());
        println!("  Started: {}", run.started_at);
        if let Some(finished) = &run.finished_at {
            println!("  Finished: {}", finished);
        }
        println!(
            "  Accepted: {}, duplicates: {}, rejected: {}, dropped: {}, errors: {}",
            run.counters.processed,
            run.counters.duplicates,
            run.counters.rejected,
            run.counters.dropped,
            run.counters.errors
        );
        if let Some(error) = &run.error {
            println!("  Error: {}", error);
        }
    }
}

/// Prints the persisted crawl state as JSON
pub fn print_state(state: &CrawlState) -> Result<(), IngestError> {
    let json = serde_json::to_string_pretty(state)
        .map_err(|e| IngestError::Storage(e.into()))?;
    println!("{}", json);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::RunCounters;
    use crate::product::{CanonicalProduct, Ean, Nutrients};
    use crate::storage::{RunStatus, SqliteStorage, Submission};

    fn product(ean: &str, source: SourceId) -> CanonicalProduct {
        CanonicalProduct {
            ean: Ean::parse(ean).unwrap(),
            brand: "Happy Paws".to_string(),
            name: "Adult Lamb".to_string(),
            nutrients: Nutrients::default(),
            additives: BTreeMap::new(),
            image_url: None,
            source_id: source,
        }
    }

    #[test]
    fn test_load_statistics() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage
            .insert_catalog_product("4001234567890", "Happy Paws", "Adult Lamb")
            .unwrap();
        let run_id = storage.create_run("hash").unwrap();
        storage
            .submit(&Submission::pending(product("4001234567891", SourceId::Api), run_id))
            .unwrap();
        storage
            .submit(&Submission::pending(
                product("4001234567892", SourceId::CatalogA),
                run_id,
            ))
            .unwrap();
        let counters = RunCounters {
            processed: 2,
            ..RunCounters::default()
        };
        storage
            .finish_run(run_id, RunStatus::Completed, &counters, None)
            .unwrap();

        let stats = load_statistics(&storage).unwrap();

        assert_eq!(stats.catalog_products, 1);
        assert_eq!(stats.total_submissions(), 2);
        assert_eq!(stats.submissions_by_status[&SubmissionStatus::Pending], 2);
        assert_eq!(stats.submissions_by_source[&SourceId::CatalogA], 1);
        assert_eq!(stats.runs, 1);
        let latest = stats.latest_run.unwrap();
        assert_eq!(latest.status, RunStatus::Completed);
        assert_eq!(latest.counters.processed, 2);
    }

    #[test]
    fn test_empty_database() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        let stats = load_statistics(&storage).unwrap();

        assert_eq!(stats.total_submissions(), 0);
        assert!(stats.latest_run.is_none());
    }
}
