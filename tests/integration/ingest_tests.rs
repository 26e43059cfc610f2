//! End-to-end ingestion runs against mock upstreams

use kibble_ingest::config::{load_config_with_hash, Config};
use kibble_ingest::crawler::{run_ingest, StopReason};
use kibble_ingest::output::RunCounters;
use kibble_ingest::storage::{open_storage, LeaseOutcome, Storage, SubmissionStatus};
use kibble_ingest::{IngestError, SourceId};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SEEDED_EAN: &str = "4009876543210";

/// The three upstreams of one test
struct Upstreams {
    api: MockServer,
    catalog_a: MockServer,
    catalog_b: MockServer,
}

impl Upstreams {
    async fn start() -> Self {
        Self {
            api: MockServer::start().await,
            catalog_a: MockServer::start().await,
            catalog_b: MockServer::start().await,
        }
    }
}

/// Writes a configuration file pointing at the mock servers and loads it
fn write_config(dir: &TempDir, upstreams: &Upstreams, max_fetch_failures: u32) -> (Config, String) {
    let run = format!(
        r#"
time-budget-secs = 60
safety-margin-secs = 5
max-records = 50
record-delay-ms = 0
checkpoint-every = 1
fetch-timeout-secs = 5
max-fetch-failures = {}
lease-ttl-secs = 120
"#,
        max_fetch_failures
    );
    write_config_with_run(dir, upstreams, &run)
}

/// Same as `write_config` with a custom `[run]` table body
fn write_config_with_run(dir: &TempDir, upstreams: &Upstreams, run: &str) -> (Config, String) {
    let db_path = dir.path().join("kibble.db");
    let config_path = dir.path().join("kibble.toml");
    let content = format!(
        r#"
[run]
{run}

[user-agent]
crawler-name = "KibbleIngest"
crawler-version = "0.1"
contact-url = "https://example.org/bot"
contact-email = "bot@example.org"

[storage]
database-path = "{db}"

[sources.api]
base-url = "{api}/search"
page-size = 2

[sources.catalog-a]
listing-url = "{a}/list?page={{page}}"
product-link-selector = "a.product-link"
request-spacing-ms = 0

[sources.catalog-b]
listing-url = "{b}/list?page={{page}}"
product-link-selector = "a.product-link"
request-spacing-ms = 0
"#,
        run = run,
        db = db_path.display(),
        api = upstreams.api.uri(),
        a = upstreams.catalog_a.uri(),
        b = upstreams.catalog_b.uri(),
    );
    std::fs::write(&config_path, content).expect("Failed to write config");

    load_config_with_hash(&config_path).expect("Failed to load config")
}

fn db_path(config: &Config) -> PathBuf {
    PathBuf::from(&config.storage.database_path)
}

/// Creates the schema and adds one approved catalog product
fn seed_catalog(db: &Path) {
    drop(open_storage(db).expect("Failed to create database"));
    let conn = rusqlite::Connection::open(db).expect("Failed to open database");
    conn.execute(
        "INSERT INTO catalog_products (ean, brand, name, created_at) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![SEEDED_EAN, "Happy Paws", "Senior Fish", "2026-01-01T00:00:00Z"],
    )
    .expect("Failed to seed catalog");
}

async fn mount_api(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 3,
            "products": [
                {
                    "code": "4001111111111",
                    "brands": "Happy Paws",
                    "product_name": "Adult Chicken",
                    "nutriments": { "proteins_100g": 26, "fat_100g": 15 }
                },
                { "product_name": "No barcode" }
            ]
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 3,
            "products": [
                {
                    "code": "4002222222222",
                    "brands": "Bad Data",
                    "product_name": "Broken Label",
                    "nutriments": { "fat_100g": 150 }
                }
            ]
        })))
        .mount(server)
        .await;
}

fn detail_page(name: &str, ean: &str) -> String {
    format!(
        r#"<html><head><title>{name}</title></head><body>
        <h1>{name}</h1>
        <span class="brand">Happy Paws</span>
        <p>EAN: {ean}</p>
        <table>
            <tr><th>Rohprotein</th><td>24 %</td></tr>
            <tr><th>Rohfett</th><td>12,5 %</td></tr>
        </table>
        </body></html>"#
    )
}

async fn mount_catalog_a(server: &MockServer, robots_fetches: u64) {
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private"),
        )
        .expect(robots_fetches)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/list"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><body>
            <a class="product-link" href="/p/1">Adult Lamb</a>
            <a class="product-link" href="/p/2?utm_source=list">Senior Fish</a>
            <a class="product-link" href="/private/3">Hidden</a>
            <a class="nav" href="/list?page=2">Next</a>
            </body></html>"#,
        ))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/p/1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(detail_page("Adult Lamb", "4003333333333")),
        )
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/p/2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(detail_page("Senior Fish", SEEDED_EAN)),
        )
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/private/3"))
        .respond_with(ResponseTemplate::new(200).set_body_string(detail_page("Hidden", "4004444444444")))
        .expect(0)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_full_run_across_sources() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let upstreams = Upstreams::start().await;
    mount_api(&upstreams.api).await;
    mount_catalog_a(&upstreams.catalog_a, 1).await;
    // Catalog B answers 404 to everything: no robots.txt, no listing

    let (config, hash) = write_config(&dir, &upstreams, 3);
    let db = db_path(&config);
    seed_catalog(&db);

    let summary = run_ingest(config, hash).await.expect("Run failed");

    // Api: accept, drop, reject; catalog A: accept, duplicate;
    // second api pass: duplicate, drop, reject
    assert_eq!(
        summary.counters,
        RunCounters {
            processed: 2,
            duplicates: 2,
            rejected: 2,
            dropped: 2,
            errors: 0,
        }
    );
    assert_eq!(summary.per_source_counts[&SourceId::Api], 1);
    assert_eq!(summary.per_source_counts[&SourceId::CatalogA], 1);
    assert_eq!(summary.per_source_counts[&SourceId::CatalogB], 0);
    assert_eq!(summary.stop_reason, StopReason::SourcesIdle);
    assert_eq!(summary.final_source, SourceId::CatalogA);

    let storage = open_storage(&db).expect("Failed to reopen database");
    let submissions = storage
        .get_submissions_for_run(summary.run_session_id)
        .expect("Failed to list submissions");
    assert_eq!(submissions.len(), 2);
    assert!(submissions.iter().all(|s| s.status == SubmissionStatus::Pending));
    assert_eq!(submissions[0].ean, "4001111111111");
    assert_eq!(submissions[0].source_id, "api");
    assert_eq!(submissions[1].ean, "4003333333333");
    assert_eq!(submissions[1].source_id, "catalog_a");

    let state = storage.load_state().expect("Failed to load state");
    assert_eq!(state.total_processed, 2);
    assert_eq!(state.current_source, SourceId::CatalogA);
    assert!(state.last_run_at.is_some());
    assert!(state.last_error.is_none());
}

#[tokio::test]
async fn test_rerun_only_finds_duplicates() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let upstreams = Upstreams::start().await;
    mount_api(&upstreams.api).await;
    mount_catalog_a(&upstreams.catalog_a, 2).await;

    let (config, hash) = write_config(&dir, &upstreams, 3);
    let db = db_path(&config);
    seed_catalog(&db);

    let first = run_ingest(config.clone(), hash.clone())
        .await
        .expect("First run failed");
    assert_eq!(first.counters.processed, 2);

    let second = run_ingest(config, hash).await.expect("Second run failed");
    assert_eq!(second.counters.processed, 0);
    assert!(second.counters.duplicates >= 3);

    let storage = open_storage(&db).expect("Failed to reopen database");
    assert_eq!(storage.count_runs().expect("Failed to count runs"), 2);
    assert_eq!(storage.load_state().expect("Failed to load state").total_processed, 2);
}

#[tokio::test]
async fn test_failing_api_is_counted_and_skipped() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let upstreams = Upstreams::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&upstreams.api)
        .await;

    let (config, hash) = write_config(&dir, &upstreams, 2);
    let db = db_path(&config);

    let summary = run_ingest(config, hash).await.expect("Run failed");

    assert_eq!(summary.counters.errors, 2);
    assert_eq!(summary.counters.processed, 0);
    assert_eq!(summary.stop_reason, StopReason::SourcesIdle);

    let storage = open_storage(&db).expect("Failed to reopen database");
    let state = storage.load_state().expect("Failed to load state");
    assert!(state.last_error.expect("error recorded").starts_with("api:"));
}

#[tokio::test]
async fn test_held_lease_blocks_run() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let upstreams = Upstreams::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&upstreams.api)
        .await;

    let (config, hash) = write_config(&dir, &upstreams, 3);
    let mut storage = open_storage(&db_path(&config)).expect("Failed to create database");
    assert_eq!(
        storage
            .acquire_lease("pid-1@other-host", Duration::from_secs(120))
            .expect("Failed to take lease"),
        LeaseOutcome::Acquired
    );

    let err = run_ingest(config, hash).await.unwrap_err();
    assert!(matches!(err, IngestError::LeaseHeld { .. }));
    assert_eq!(storage.count_runs().expect("Failed to count runs"), 0);
}

#[tokio::test]
async fn test_slow_catalog_does_not_wedge_the_ring() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let upstreams = Upstreams::start().await;

    Mock::given(method("GET"))
        .and(path("/list"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><body>
            <a class="product-link" href="/p/1">Adult Lamb</a>
            <a class="product-link" href="/slow/2">Slow 2</a>
            <a class="product-link" href="/slow/3">Slow 3</a>
            <a class="product-link" href="/slow/4">Slow 4</a>
            <a class="product-link" href="/slow/5">Slow 5</a>
            </body></html>"#,
        ))
        .mount(&upstreams.catalog_a)
        .await;
    Mock::given(method("GET"))
        .and(path("/p/1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(detail_page("Adult Lamb", "4003333333333")),
        )
        .mount(&upstreams.catalog_a)
        .await;
    // Every slow page outlasts the 1 s fetch timeout; only two fit the window
    Mock::given(method("GET"))
        .and(path_regex("^/slow/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(detail_page("Slow", "4005555555555"))
                .set_delay(Duration::from_secs(3)),
        )
        .expect(2)
        .mount(&upstreams.catalog_a)
        .await;

    let run = r#"
time-budget-secs = 3
safety-margin-secs = 0
max-records = 50
record-delay-ms = 10
checkpoint-every = 1
fetch-timeout-secs = 1
max-fetch-failures = 3
lease-ttl-secs = 120
"#;
    let (config, hash) = write_config_with_run(&dir, &upstreams, run);
    let db = db_path(&config);
    {
        let mut storage = open_storage(&db).expect("Failed to create database");
        let mut state = storage.load_state().expect("Failed to load state");
        state.current_source = SourceId::CatalogA;
        storage.save_state(&state).expect("Failed to save state");
    }

    let first = run_ingest(config.clone(), hash.clone())
        .await
        .expect("First run failed");

    // The partial page is resolved and the cursor moves past it
    assert_eq!(first.stop_reason, StopReason::TimeBudget);
    assert_eq!(first.counters.processed, 1);
    assert_eq!(first.counters.errors, 2);
    assert!(first.elapsed_ms <= 3_000 + 1_000);

    let state = open_storage(&db)
        .expect("Failed to reopen database")
        .load_state()
        .expect("Failed to load state");
    assert_eq!(state.current_source, SourceId::CatalogA);
    assert_eq!(state.cursor(SourceId::CatalogA), 1);
    assert!(state.last_error.expect("error recorded").starts_with("catalog_a:"));

    // Catalog A has no second listing page, so the next run moves on
    let second = run_ingest(config, hash).await.expect("Second run failed");
    assert_eq!(second.stop_reason, StopReason::SourcesIdle);
    let api_requests = upstreams
        .api
        .received_requests()
        .await
        .expect("Request recording enabled");
    assert!(!api_requests.is_empty());
}
