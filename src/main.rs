//! Kibble-Ingest main entry point
//!
//! This is the command-line interface for the dog-food product ingestion
//! pipeline. Each invocation performs one budgeted run.

use anyhow::Context;
use clap::Parser;
use kibble_ingest::config::{load_config_with_hash, validate_config, Config};
use kibble_ingest::crawler::run_ingest;
use kibble_ingest::output::{load_statistics, print_state, print_statistics, print_summary, RunSummary};
use kibble_ingest::storage::{open_storage, Storage};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Kibble-Ingest: a resumable dog-food product ingestion pipeline
///
/// Pulls product records from a JSON API and two HTML catalogs, drops the
/// ones already in the catalog, validates the rest and queues them for
/// moderation. Every run picks up where the previous one stopped.
#[derive(Parser, Debug)]
#[command(name = "kibble-ingest")]
#[command(version)]
#[command(about = "A resumable dog-food product ingestion pipeline", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Override the wall-clock ceiling for this run (seconds)
    #[arg(long, value_name = "SECS")]
    time_budget_secs: Option<u64>,

    /// Override the accepted-record ceiling for this run
    #[arg(long, value_name = "N")]
    max_records: Option<u32>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,

    /// Validate config and show the effective settings without running
    #[arg(long, conflicts_with_all = ["stats", "show_state"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "show_state"])]
    stats: bool,

    /// Print the persisted crawl state and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    show_state: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if let Some(secs) = cli.time_budget_secs {
        config.run.time_budget_secs = secs;
    }
    if let Some(max) = cli.max_records {
        config.run.max_records = max;
    }
    validate_config(&config).context("invalid configuration after command-line overrides")?;

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else if cli.show_state {
        handle_show_state(&config)?;
    } else {
        handle_run(config, config_hash, cli.json).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("kibble_ingest=info,warn"),
            1 => EnvFilter::new("kibble_ingest=debug,info"),
            2 => EnvFilter::new("kibble_ingest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Handles the --dry-run mode: shows the effective configuration
fn handle_dry_run(config: &Config) {
    println!("=== Kibble-Ingest Dry Run ===\n");

    println!("Run Budget:");
    println!("  Time budget: {}s", config.run.time_budget_secs);
    println!("  Safety margin: {}s", config.run.safety_margin_secs);
    println!("  Max records: {}", config.run.max_records);
    println!("  Record delay: {}ms", config.run.record_delay_ms);
    println!("  Checkpoint every: {} records", config.run.checkpoint_every);
    println!("  Fetch timeout: {}s", config.run.fetch_timeout_secs);
    println!("  Max fetch failures: {}", config.run.max_fetch_failures);
    println!("  Lease TTL: {}s", config.run.lease_ttl_secs);

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.header_value());

    println!("\nStorage:");
    println!("  Database: {}", config.storage.database_path);

    let api = &config.sources.api;
    println!("\nSources:");
    println!("  api: {} (page size {})", api.base_url, api.page_size);
    for (name, catalog) in [
        ("catalog_a", &config.sources.catalog_a),
        ("catalog_b", &config.sources.catalog_b),
    ] {
        println!(
            "  {}: {} (links: {}, robots: {})",
            name,
            catalog.listing_url,
            catalog.product_link_selector,
            if catalog.respect_robots { "respected" } else { "ignored" }
        );
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.storage.database_path);

    let storage = open_storage(Path::new(&config.storage.database_path))
        .context("failed to open database")?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --show-state mode: prints the persisted crawl state
fn handle_show_state(config: &Config) -> anyhow::Result<()> {
    let storage = open_storage(Path::new(&config.storage.database_path))
        .context("failed to open database")?;
    let state = storage.load_state().context("failed to load crawl state")?;
    print_state(&state)?;

    Ok(())
}

/// Handles one ingestion run
async fn handle_run(config: Config, config_hash: String, json: bool) -> anyhow::Result<()> {
    tracing::info!(
        time_budget_secs = config.run.time_budget_secs,
        max_records = config.run.max_records,
        "starting ingestion"
    );

    match run_ingest(config, config_hash).await {
        Ok(summary) => emit_summary(&summary, json),
        Err(e) => {
            // A failed final checkpoint still reports what the run did
            if let Some(summary) = e.summary() {
                emit_summary(summary, json)?;
            }
            tracing::error!("Run failed: {}", e);
            Err(e.into())
        }
    }
}

fn emit_summary(summary: &RunSummary, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
    } else {
        print_summary(summary);
    }
    Ok(())
}
