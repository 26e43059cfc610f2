//! HTML-catalog source: listing page, then one detail page per product
//!
//! The cursor is the zero-based listing page index; the page number put into
//! the listing URL template is `first-page + cursor`.

use crate::config::CatalogSourceConfig;
use crate::crawler::{fetch_text, FetchError};
use crate::robots::{fetch_robots, request_spacing, ParsedRobots};
use crate::sources::parser::{parse_detail, parse_listing, CatalogSelectors};
use crate::sources::{FetchBudget, FetchedBatch, SourceFetcher};
use crate::state::{Cursor, SourceId};
use crate::url::site_origin;
use crate::IngestError;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

/// Fetcher for one HTML catalog site
pub struct CatalogFetcher {
    source: SourceId,
    config: CatalogSourceConfig,
    selectors: CatalogSelectors,
    client: Client,
    /// Product token matched against robots.txt user-agent groups
    agent: String,
    /// Fetched on first use, then kept for the rest of the run
    robots: Option<ParsedRobots>,
    spacing: Duration,
    last_request: Option<Instant>,
    /// Longest a single request may take
    fetch_timeout: Duration,
}

impl CatalogFetcher {
    pub fn new(
        source: SourceId,
        config: &CatalogSourceConfig,
        client: Client,
        agent: &str,
        fetch_timeout: Duration,
    ) -> Result<Self, IngestError> {
        Ok(Self {
            source,
            selectors: CatalogSelectors::compile(config)?,
            config: config.clone(),
            client,
            agent: agent.to_string(),
            robots: None,
            spacing: config.request_spacing(),
            last_request: None,
            fetch_timeout,
        })
    }

    /// Loads robots.txt for the site the first time the site is contacted
    async fn ensure_robots(&mut self, url: &Url) {
        if self.robots.is_some() {
            return;
        }

        let robots = if self.config.respect_robots {
            match site_origin(url) {
                Ok(origin) => {
                    self.wait_turn().await;
                    fetch_robots(&self.client, &origin).await
                }
                Err(e) => {
                    tracing::warn!(source = %self.source, %url, error = %e, "cannot resolve site origin");
                    ParsedRobots::allow_all()
                }
            }
        } else {
            ParsedRobots::allow_all()
        };

        self.spacing = request_spacing(self.config.request_spacing(), &robots, &self.agent);
        tracing::debug!(source = %self.source, spacing_ms = self.spacing.as_millis() as u64, "site request spacing");
        self.robots = Some(robots);
    }

    fn is_allowed(&self, url: &Url) -> bool {
        self.robots
            .as_ref()
            .map_or(true, |robots| robots.is_allowed(url.as_str(), &self.agent))
    }

    /// Worst-case time for the next request, including the wait for its turn
    fn next_request_cost(&self) -> Duration {
        let wait = self.last_request.map_or(Duration::ZERO, |last| {
            (last + self.spacing).saturating_duration_since(Instant::now())
        });
        wait + self.fetch_timeout
    }

    /// Worst-case time to get the listing page, robots.txt included when still unknown
    fn listing_cost(&self) -> Duration {
        let mut cost = self.next_request_cost();
        if self.robots.is_none() && self.config.respect_robots {
            cost += self.spacing + self.fetch_timeout;
        }
        cost
    }

    /// Waits until the site's request spacing has passed since the last request
    async fn wait_turn(&mut self) {
        if let Some(last) = self.last_request {
            tokio::time::sleep_until(last + self.spacing).await;
        }
        self.last_request = Some(Instant::now());
    }
}

#[async_trait]
impl SourceFetcher for CatalogFetcher {
    fn source(&self) -> SourceId {
        self.source
    }

    async fn fetch_batch(
        &mut self,
        cursor: Cursor,
        budget: FetchBudget,
    ) -> Result<FetchedBatch, FetchError> {
        if !budget.allows(self.listing_cost(), 0) {
            tracing::debug!(source = %self.source, cursor, "no time left for another listing page");
            return Ok(FetchedBatch::out_of_time(cursor));
        }

        let listing = self.config.listing_url_for(self.config.first_page + cursor);
        let listing_url = Url::parse(&listing).map_err(|e| FetchError::Decode {
            url: listing.clone(),
            message: e.to_string(),
        })?;

        self.ensure_robots(&listing_url).await;
        if !self.is_allowed(&listing_url) {
            tracing::warn!(source = %self.source, url = %listing_url, "listing disallowed by robots.txt");
            return Ok(FetchedBatch::exhausted(cursor));
        }

        if !budget.allows(self.next_request_cost(), 0) {
            return Ok(FetchedBatch::out_of_time(cursor));
        }
        self.wait_turn().await;
        let html = match fetch_text(&self.client, listing_url.as_str()).await {
            Ok(html) => html,
            Err(e) if e.is_not_found() => {
                tracing::debug!(source = %self.source, cursor, "listing page not found");
                return Ok(FetchedBatch::exhausted(cursor));
            }
            Err(e) => return Err(e),
        };

        let links = parse_listing(&html, &listing_url, &self.selectors);
        if links.is_empty() {
            tracing::debug!(source = %self.source, cursor, "listing page has no product links");
            return Ok(FetchedBatch::exhausted(cursor));
        }
        tracing::debug!(source = %self.source, cursor, links = links.len(), "listing page parsed");

        let candidates: Vec<Url> = links
            .into_iter()
            .take(self.config.max_details_per_batch)
            .collect();
        let total = candidates.len();

        // A truncated page still advances; its skipped details return once the source starts over
        let mut batch = FetchedBatch::continuing(cursor + 1);
        for (index, link) in candidates.into_iter().enumerate() {
            if !self.is_allowed(&link) {
                tracing::debug!(source = %self.source, url = %link, "detail page disallowed by robots.txt");
                continue;
            }
            if !budget.allows(self.next_request_cost(), batch.records.len()) {
                tracing::info!(
                    source = %self.source,
                    cursor,
                    fetched = batch.records.len(),
                    skipped = total - index,
                    "time budget reached, returning partial batch"
                );
                batch.truncated = true;
                break;
            }

            self.wait_turn().await;
            match fetch_text(&self.client, link.as_str()).await {
                Ok(html) => batch.records.push(parse_detail(&html, &link, &self.selectors)),
                Err(e) => {
                    tracing::warn!(source = %self.source, url = %link, error = %e, "detail page fetch failed");
                    batch.record_errors.push(e.to_string());
                }
            }
        }

        Ok(batch)
    }
}
