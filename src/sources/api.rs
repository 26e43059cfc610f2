//! Structured-API source: paginated JSON product search
//!
//! One page holds up to `page-size` products. The cursor is the zero-based
//! page index; the request page number is `first-page + cursor`.

use crate::config::ApiSourceConfig;
use crate::crawler::{fetch_json, FetchError};
use crate::product::{Nutrient, RawProduct};
use crate::sources::{FetchBudget, FetchedBatch, SourceFetcher};
use crate::state::{Cursor, SourceId};
use crate::IngestError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// Nutrient keys in the `nutriments` object, most specific first
const NUTRIENT_KEYS: &[(Nutrient, &[&str])] = &[
    (Nutrient::Protein, &["proteins_100g", "proteins_value", "proteins"]),
    (Nutrient::Fat, &["fat_100g", "fat_value", "fat"]),
    (
        Nutrient::CrudeFiber,
        &["fiber_100g", "crude-fibre_100g", "fiber_value", "fiber"],
    ),
    (Nutrient::RawAsh, &["ash_100g", "crude-ash_100g", "ash_value", "ash"]),
    (
        Nutrient::Moisture,
        &["moisture_100g", "water_100g", "moisture_value", "moisture"],
    ),
];

#[derive(Debug, Deserialize)]
struct SearchPage {
    /// Total number of matching products; some deployments send it as a string
    #[serde(default)]
    count: Option<Value>,

    #[serde(default)]
    products: Vec<Value>,
}

/// Fetcher for the paginated JSON API
pub struct ApiFetcher {
    client: Client,
    base_url: Url,
    page_size: u32,
    first_page: u64,
    /// Longest a page request may take
    fetch_timeout: Duration,
}

impl ApiFetcher {
    pub fn new(
        config: &ApiSourceConfig,
        client: Client,
        fetch_timeout: Duration,
    ) -> Result<Self, IngestError> {
        let mut base_url = Url::parse(&config.base_url)
            .map_err(|e| IngestError::SourceSetup(format!("api base-url: {}", e)))?;
        if !config.query.is_empty() {
            base_url.query_pairs_mut().extend_pairs(&config.query);
        }

        Ok(Self {
            client,
            base_url,
            page_size: config.page_size,
            first_page: config.first_page,
            fetch_timeout,
        })
    }

    fn page_url(&self, cursor: Cursor) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("page", &(self.first_page + cursor).to_string())
            .append_pair("page_size", &self.page_size.to_string());
        url
    }
}

#[async_trait]
impl SourceFetcher for ApiFetcher {
    fn source(&self) -> SourceId {
        SourceId::Api
    }

    async fn fetch_batch(
        &mut self,
        cursor: Cursor,
        budget: FetchBudget,
    ) -> Result<FetchedBatch, FetchError> {
        if !budget.allows(self.fetch_timeout, 0) {
            tracing::debug!(cursor, "no time left for another api page");
            return Ok(FetchedBatch::out_of_time(cursor));
        }

        let url = self.page_url(cursor);

        let page: SearchPage = match fetch_json(&self.client, url.as_str()).await {
            Ok(page) => page,
            Err(FetchError::NotFound { .. }) => {
                tracing::debug!(cursor, "api page not found");
                return Ok(FetchedBatch::exhausted(cursor));
            }
            Err(FetchError::Decode { url, message }) => {
                tracing::warn!(%url, cursor, %message, "undecodable api page, treating as exhausted");
                return Ok(FetchedBatch::exhausted(cursor));
            }
            Err(e) => return Err(e),
        };

        if page.products.is_empty() {
            return Ok(FetchedBatch::exhausted(cursor));
        }

        let total = page.count.as_ref().and_then(value_as_u64);
        let seen_after_page = (cursor + 1) * u64::from(self.page_size);

        let mut batch = FetchedBatch::continuing(cursor + 1);
        batch.records = page
            .products
            .iter()
            .map(|product| raw_product(product, &url))
            .collect();
        // The last page is still processed; the next fetch starts over
        batch.exhausted = matches!(total, Some(total) if seen_after_page >= total);

        Ok(batch)
    }
}

/// Maps one API product object to a raw record
fn raw_product(product: &Value, page_url: &Url) -> RawProduct {
    let ean = product.get("code").and_then(value_as_string);

    let brand = product
        .get("brands")
        .and_then(Value::as_str)
        .and_then(|brands| brands.split(',').map(str::trim).find(|b| !b.is_empty()))
        .map(str::to_string);

    let name = ["product_name", "product_name_de", "product_name_en", "generic_name"]
        .iter()
        .filter_map(|key| product.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|name| !name.is_empty())
        .map(str::to_string);

    let mut raw = RawProduct {
        origin: match &ean {
            Some(code) => format!("{}#{}", page_url, code),
            None => page_url.to_string(),
        },
        ean,
        brand,
        name,
        image_url: ["image_front_url", "image_url"]
            .iter()
            .find_map(|key| product.get(*key).and_then(Value::as_str))
            .map(str::to_string),
        ..RawProduct::default()
    };

    if let Some(nutriments) = product.get("nutriments") {
        for (nutrient, keys) in NUTRIENT_KEYS {
            if let Some(value) = keys
                .iter()
                .find_map(|key| nutriments.get(*key).and_then(value_as_string))
            {
                raw.nutrients.insert(*nutrient, value);
            }
        }
    }

    if let Some(tags) = product.get("additives_tags").and_then(Value::as_array) {
        for tag in tags.iter().filter_map(Value::as_str) {
            let code = tag.rsplit(':').next().unwrap_or(tag).to_uppercase();
            raw.additives.insert(code, tag.to_string());
        }
    }

    raw
}

/// Reads a JSON string or number as a string
fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn config() -> ApiSourceConfig {
        ApiSourceConfig {
            base_url: "https://api.example/cgi/search.pl".to_string(),
            page_size: 2,
            first_page: 1,
            query: BTreeMap::from([("json".to_string(), "1".to_string())]),
        }
    }

    fn page_url() -> Url {
        Url::parse("https://api.example/cgi/search.pl?page=1").unwrap()
    }

    #[test]
    fn test_page_url_carries_query_page_and_size() {
        let fetcher = ApiFetcher::new(&config(), Client::new(), Duration::from_secs(20)).unwrap();
        assert_eq!(
            fetcher.page_url(0).as_str(),
            "https://api.example/cgi/search.pl?json=1&page=1&page_size=2"
        );
        assert_eq!(
            fetcher.page_url(4).as_str(),
            "https://api.example/cgi/search.pl?json=1&page=5&page_size=2"
        );
    }

    #[tokio::test]
    async fn test_spent_budget_skips_request() {
        let mut fetcher =
            ApiFetcher::new(&config(), Client::new(), Duration::from_secs(20)).unwrap();
        let budget = FetchBudget::new(
            tokio::time::Instant::now() + Duration::from_secs(5),
            Duration::from_millis(100),
        );

        let batch = fetcher.fetch_batch(3, budget).await.unwrap();

        assert!(batch.is_out_of_time());
        assert_eq!(batch.next_cursor, 3);
    }

    #[test]
    fn test_invalid_base_url() {
        let mut config = config();
        config.base_url = "not a url".to_string();
        assert!(matches!(
            ApiFetcher::new(&config, Client::new(), Duration::from_secs(20)),
            Err(IngestError::SourceSetup(_))
        ));
    }

    #[test]
    fn test_raw_product_mapping() {
        let product = json!({
            "code": "4001234567890",
            "brands": "Happy Paws, Paws Group",
            "product_name": "",
            "product_name_de": "Adult Lamm & Reis",
            "image_front_url": "https://images.example/4001234567890.jpg",
            "nutriments": {
                "proteins_100g": 24.5,
                "fat_100g": "12",
                "fiber": 2.5
            },
            "additives_tags": ["en:e306", "en:e321"]
        });

        let raw = raw_product(&product, &page_url());
        assert_eq!(raw.ean.as_deref(), Some("4001234567890"));
        assert_eq!(raw.brand.as_deref(), Some("Happy Paws"));
        assert_eq!(raw.name.as_deref(), Some("Adult Lamm & Reis"));
        assert_eq!(
            raw.image_url.as_deref(),
            Some("https://images.example/4001234567890.jpg")
        );
        assert_eq!(raw.nutrients.get(&Nutrient::Protein).map(String::as_str), Some("24.5"));
        assert_eq!(raw.nutrients.get(&Nutrient::Fat).map(String::as_str), Some("12"));
        assert_eq!(raw.nutrients.get(&Nutrient::CrudeFiber).map(String::as_str), Some("2.5"));
        assert!(!raw.nutrients.contains_key(&Nutrient::Moisture));
        assert_eq!(raw.additives.get("E306").map(String::as_str), Some("en:e306"));
        assert!(raw.origin.ends_with("#4001234567890"));
    }

    #[test]
    fn test_numeric_code_and_missing_fields() {
        let raw = raw_product(&json!({ "code": 40012345 }), &page_url());
        assert_eq!(raw.ean.as_deref(), Some("40012345"));
        assert!(raw.brand.is_none());
        assert!(raw.name.is_none());
        assert!(raw.nutrients.is_empty());

        let raw = raw_product(&json!({ "product_name": "No code" }), &page_url());
        assert!(raw.ean.is_none());
    }

    #[test]
    fn test_count_as_string_or_number() {
        assert_eq!(value_as_u64(&json!(120)), Some(120));
        assert_eq!(value_as_u64(&json!("120")), Some(120));
        assert_eq!(value_as_u64(&json!(null)), None);
    }
}
