use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Main configuration structure for Kibble-Ingest
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub run: RunConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub storage: StorageConfig,
    pub sources: SourcesConfig,
}

/// Per-run budget and politeness configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RunConfig {
    /// Wall-clock ceiling for one invocation (seconds)
    #[serde(rename = "time-budget-secs")]
    pub time_budget_secs: u64,

    /// How long before the ceiling the run stops taking new records (seconds)
    #[serde(rename = "safety-margin-secs")]
    pub safety_margin_secs: u64,

    /// Maximum number of accepted records per run
    #[serde(rename = "max-records")]
    pub max_records: u32,

    /// Delay enforced between every processed record (milliseconds)
    #[serde(rename = "record-delay-ms")]
    pub record_delay_ms: u64,

    /// Persist the crawl state every K accepted records
    #[serde(rename = "checkpoint-every")]
    pub checkpoint_every: u32,

    /// Timeout for every individual HTTP request (seconds)
    #[serde(rename = "fetch-timeout-secs")]
    pub fetch_timeout_secs: u64,

    /// Consecutive whole-batch fetch failures before rotating away from a source
    #[serde(rename = "max-fetch-failures")]
    pub max_fetch_failures: u32,

    /// Expiry of the single-active-run lease (seconds)
    #[serde(rename = "lease-ttl-secs")]
    pub lease_ttl_secs: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            time_budget_secs: 540,
            safety_margin_secs: 30,
            max_records: 200,
            record_delay_ms: 1500,
            checkpoint_every: 10,
            fetch_timeout_secs: 20,
            max_fetch_failures: 3,
            lease_ttl_secs: 900,
        }
    }
}

impl RunConfig {
    /// Time after which the run stops taking new work (budget minus safety margin)
    pub fn working_window(&self) -> Duration {
        Duration::from_secs(self.time_budget_secs.saturating_sub(self.safety_margin_secs))
    }

    pub fn record_delay(&self) -> Duration {
        Duration::from_millis(self.record_delay_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the User-Agent header: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Durable store configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Path to the SQLite database holding crawl state, catalog and moderation queue
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// The three upstream sources, one per ring slot
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourcesConfig {
    pub api: ApiSourceConfig,
    #[serde(rename = "catalog-a")]
    pub catalog_a: CatalogSourceConfig,
    #[serde(rename = "catalog-b")]
    pub catalog_b: CatalogSourceConfig,
}

/// Paginated JSON product API
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiSourceConfig {
    /// Search endpoint; page and page size are appended as query parameters
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Records requested per page
    #[serde(rename = "page-size", default = "default_page_size")]
    pub page_size: u32,

    /// Page number the API uses for its first page
    #[serde(rename = "first-page", default = "default_first_page")]
    pub first_page: u64,

    /// Extra query parameters sent with every page request
    #[serde(default)]
    pub query: BTreeMap<String, String>,
}

/// HTML catalog site scraped listing-then-detail
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogSourceConfig {
    /// Listing page URL template; `{page}` is replaced by the page number
    #[serde(rename = "listing-url")]
    pub listing_url: String,

    /// Page number the site uses for its first listing page
    #[serde(rename = "first-page", default = "default_first_page")]
    pub first_page: u64,

    /// Selector for anchors on the listing page that lead to detail pages
    #[serde(rename = "product-link-selector")]
    pub product_link_selector: String,

    #[serde(rename = "brand-selector", default = "default_brand_selector")]
    pub brand_selector: String,

    #[serde(rename = "name-selector", default = "default_name_selector")]
    pub name_selector: String,

    #[serde(rename = "ean-selector", default = "default_ean_selector")]
    pub ean_selector: String,

    /// Selector for the table(s) holding the analytical constituents
    #[serde(rename = "nutrient-table-selector", default = "default_nutrient_table_selector")]
    pub nutrient_table_selector: String,

    #[serde(rename = "additives-table-selector", default)]
    pub additives_table_selector: Option<String>,

    #[serde(rename = "image-selector", default = "default_image_selector")]
    pub image_selector: String,

    /// Upper bound on detail pages fetched from one listing page
    #[serde(rename = "max-details-per-batch", default = "default_max_details")]
    pub max_details_per_batch: usize,

    /// Minimum gap between two requests to this site (milliseconds)
    #[serde(rename = "request-spacing-ms", default = "default_request_spacing_ms")]
    pub request_spacing_ms: u64,

    /// Honor robots.txt allow rules and Crawl-delay
    #[serde(rename = "respect-robots", default = "default_true")]
    pub respect_robots: bool,
}

impl CatalogSourceConfig {
    /// Builds the listing URL for a page number
    pub fn listing_url_for(&self, page: u64) -> String {
        self.listing_url.replace("{page}", &page.to_string())
    }

    pub fn request_spacing(&self) -> Duration {
        Duration::from_millis(self.request_spacing_ms)
    }
}

fn default_page_size() -> u32 {
    50
}

fn default_first_page() -> u64 {
    1
}

fn default_brand_selector() -> String {
    "[itemprop='brand'], .brand, .product-brand".to_string()
}

fn default_name_selector() -> String {
    "h1".to_string()
}

fn default_ean_selector() -> String {
    "[itemprop='gtin13'], [itemprop='gtin'], [itemprop='gtin8'], .ean".to_string()
}

fn default_nutrient_table_selector() -> String {
    "table".to_string()
}

fn default_image_selector() -> String {
    "meta[property='og:image'], img[itemprop='image']".to_string()
}

fn default_max_details() -> usize {
    48
}

fn default_request_spacing_ms() -> u64 {
    500
}

fn default_true() -> bool {
    true
}
