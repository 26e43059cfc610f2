//! Robots.txt handling module
//!
//! The HTML catalog fetchers fetch `/robots.txt` once per run per site and
//! consult it before every listing and detail request.

mod parser;

pub use parser::ParsedRobots;

use crate::crawler::{fetch_text, FetchError};
use reqwest::Client;
use std::time::Duration;

/// Upper bound applied to a site's `Crawl-delay`
pub const MAX_CRAWL_DELAY: Duration = Duration::from_secs(30);

/// Fetches and parses robots.txt for a site
///
/// A missing or unreachable robots.txt yields an allow-all policy; robots.txt
/// trouble never fails a batch.
///
/// # Arguments
///
/// * `client` - The HTTP client to use
/// * `origin` - Site origin, e.g. `https://shop.example`
pub async fn fetch_robots(client: &Client, origin: &str) -> ParsedRobots {
    let url = format!("{}/robots.txt", origin.trim_end_matches('/'));
    match fetch_text(client, &url).await {
        Ok(body) => ParsedRobots::from_content(&body),
        Err(FetchError::NotFound { .. }) => {
            tracing::debug!(origin, "no robots.txt");
            ParsedRobots::allow_all()
        }
        Err(e) => {
            tracing::warn!(origin, error = %e, "failed to fetch robots.txt, allowing all");
            ParsedRobots::allow_all()
        }
    }
}

/// Spacing between two requests to a site
///
/// The larger of the configured spacing and the site's `Crawl-delay`, the
/// latter capped at [`MAX_CRAWL_DELAY`].
pub fn request_spacing(configured: Duration, robots: &ParsedRobots, agent: &str) -> Duration {
    let crawl_delay = robots
        .crawl_delay(agent)
        .map(|d| d.min(MAX_CRAWL_DELAY))
        .unwrap_or_default();
    configured.max(crawl_delay)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_spacing_uses_larger_value() {
        let robots = ParsedRobots::from_content("User-agent: *\nCrawl-delay: 2");
        assert_eq!(
            request_spacing(Duration::from_millis(500), &robots, "KibbleIngest"),
            Duration::from_secs(2)
        );
        assert_eq!(
            request_spacing(Duration::from_secs(5), &robots, "KibbleIngest"),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn test_request_spacing_caps_crawl_delay() {
        let robots = ParsedRobots::from_content("User-agent: *\nCrawl-delay: 3600");
        assert_eq!(
            request_spacing(Duration::from_millis(500), &robots, "KibbleIngest"),
            MAX_CRAWL_DELAY
        );
    }

    #[test]
    fn test_request_spacing_without_robots() {
        assert_eq!(
            request_spacing(
                Duration::from_millis(250),
                &ParsedRobots::allow_all(),
                "KibbleIngest"
            ),
            Duration::from_millis(250)
        );
    }
}
