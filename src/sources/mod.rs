//! Upstream product sources
//!
//! Every source hides its transport behind one contract, [`SourceFetcher`]:
//! given a cursor, return the next batch of raw candidate records or signal
//! that nothing further is available at that cursor. The orchestrator never
//! sees JSON pages or HTML listings.
//!
//! # Components
//!
//! - `ApiFetcher`: paginated JSON product search
//! - `CatalogFetcher`: HTML listing pages, then one detail page per product
//! - `parser`: HTML extraction used by the catalog fetcher

mod api;
mod catalog;
mod parser;

pub use crate::crawler::FetchError;
pub use api::ApiFetcher;
pub use catalog::CatalogFetcher;
pub use parser::{parse_detail, parse_listing, CatalogSelectors};

use crate::config::Config;
use crate::crawler::build_http_client;
use crate::product::RawProduct;
use crate::state::{Cursor, SourceId};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;

/// One page of candidate records from a source
#[derive(Debug, Clone, Default)]
pub struct FetchedBatch {
    /// Raw records, in upstream order
    pub records: Vec<RawProduct>,

    /// Cursor of the page after this one
    pub next_cursor: Cursor,

    /// Nothing further is available at this cursor right now
    pub exhausted: bool,

    /// Per-record failures inside an otherwise successful batch (e.g. a detail
    /// page that timed out)
    pub record_errors: Vec<String>,

    /// The fetch budget ran out before every candidate of the page was fetched
    pub truncated: bool,
}

impl FetchedBatch {
    /// Creates an empty, non-exhausted batch that continues at `next_cursor`
    pub fn continuing(next_cursor: Cursor) -> Self {
        Self {
            next_cursor,
            ..Self::default()
        }
    }

    /// Creates the batch a source returns when nothing is available at `cursor`
    pub fn exhausted(cursor: Cursor) -> Self {
        Self {
            next_cursor: cursor,
            exhausted: true,
            ..Self::default()
        }
    }

    /// Creates the batch a source returns when not even one request fits its budget
    pub fn out_of_time(cursor: Cursor) -> Self {
        Self {
            next_cursor: cursor,
            truncated: true,
            ..Self::default()
        }
    }

    /// Nothing was fetched because the budget was already spent
    pub fn is_out_of_time(&self) -> bool {
        self.truncated && self.records.is_empty() && self.record_errors.is_empty()
    }
}

/// Time a fetcher may spend on one batch
///
/// The batch must be handed back early enough that the orchestrator can
/// still resolve every record in it before the run's deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchBudget {
    /// Instant by which the batch and its records must be done
    pub deadline: Instant,

    /// Time reserved per collected record for resolving it after the fetch
    pub per_record: Duration,
}

impl FetchBudget {
    pub fn new(deadline: Instant, per_record: Duration) -> Self {
        Self {
            deadline,
            per_record,
        }
    }

    /// Whether a request taking up to `request` still leaves time to resolve
    /// the `collected` records plus the one it may yield
    pub fn allows(&self, request: Duration, collected: usize) -> bool {
        let slots = u32::try_from(collected).unwrap_or(u32::MAX).saturating_add(1);
        let needed = request.saturating_add(self.per_record.saturating_mul(slots));
        Instant::now()
            .checked_add(needed)
            .map_or(false, |done| done <= self.deadline)
    }
}

/// Capability every upstream source implements
///
/// Transient per-record failures go into `FetchedBatch::record_errors`; an
/// `Err` means the whole batch could not be fetched (timeout, 5xx, network).
/// A batch that cannot be understood at all is reported as exhausted. A
/// fetcher stops issuing requests once they no longer fit `budget` and
/// returns what it has, marked `truncated`.
#[async_trait]
pub trait SourceFetcher: Send {
    /// The ring slot this fetcher serves
    fn source(&self) -> SourceId;

    /// Fetches the batch at `cursor` within `budget`
    async fn fetch_batch(
        &mut self,
        cursor: Cursor,
        budget: FetchBudget,
    ) -> Result<FetchedBatch, FetchError>;
}

/// The three fetchers, selected by `SourceId`
pub struct SourceSet {
    api: Box<dyn SourceFetcher>,
    catalog_a: Box<dyn SourceFetcher>,
    catalog_b: Box<dyn SourceFetcher>,
}

impl SourceSet {
    pub fn new(
        api: Box<dyn SourceFetcher>,
        catalog_a: Box<dyn SourceFetcher>,
        catalog_b: Box<dyn SourceFetcher>,
    ) -> Self {
        debug_assert_eq!(api.source(), SourceId::Api);
        debug_assert_eq!(catalog_a.source(), SourceId::CatalogA);
        debug_assert_eq!(catalog_b.source(), SourceId::CatalogB);
        Self {
            api,
            catalog_a,
            catalog_b,
        }
    }

    /// Builds the production fetchers from configuration
    ///
    /// All fetchers share one HTTP client carrying the crawler's user agent
    /// and the configured per-request timeout.
    pub fn from_config(config: &Config) -> crate::Result<Self> {
        let client = build_http_client(&config.user_agent, config.run.fetch_timeout())?;
        let agent = config.user_agent.crawler_name.clone();

        Ok(Self::new(
            Box::new(ApiFetcher::new(
                &config.sources.api,
                client.clone(),
                config.run.fetch_timeout(),
            )?),
            Box::new(CatalogFetcher::new(
                SourceId::CatalogA,
                &config.sources.catalog_a,
                client.clone(),
                &agent,
                config.run.fetch_timeout(),
            )?),
            Box::new(CatalogFetcher::new(
                SourceId::CatalogB,
                &config.sources.catalog_b,
                client,
                &agent,
                config.run.fetch_timeout(),
            )?),
        ))
    }

    pub fn get_mut(&mut self, source: SourceId) -> &mut dyn SourceFetcher {
        match source {
            SourceId::Api => self.api.as_mut(),
            SourceId::CatalogA => self.catalog_a.as_mut(),
            SourceId::CatalogB => self.catalog_b.as_mut(),
        }
    }
}
