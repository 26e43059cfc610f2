//! Robots.txt parser implementation
//!
//! Allow/disallow matching is delegated to the robotstxt crate; `Crawl-delay`,
//! which that crate does not expose, is read from the user-agent groups here.

use robotstxt::DefaultMatcher;
use std::time::Duration;

/// Parsed robots.txt data for one site
#[derive(Debug, Clone)]
pub struct ParsedRobots {
    /// Raw robots.txt body; `None` means allow everything
    content: Option<String>,
}

impl ParsedRobots {
    /// Wraps a fetched robots.txt body
    pub fn from_content(content: &str) -> Self {
        Self {
            content: Some(content.to_string()),
        }
    }

    /// Creates a permissive policy
    ///
    /// Used when the site has no robots.txt or it could not be fetched.
    pub fn allow_all() -> Self {
        Self { content: None }
    }

    /// Checks if a URL may be fetched by the given agent
    ///
    /// # Arguments
    ///
    /// * `url` - Absolute URL of the page to fetch
    /// * `agent` - Product token of the crawler (e.g. "KibbleIngest")
    pub fn is_allowed(&self, url: &str, agent: &str) -> bool {
        match self.content.as_deref() {
            None | Some("") => true,
            Some(body) => {
                let mut matcher = DefaultMatcher::default();
                matcher.one_agent_allowed_by_robots(body, agent, url)
            }
        }
    }

    /// Gets the crawl delay that applies to an agent
    ///
    /// A group naming the agent wins over the `*` group. Unparsable or
    /// negative values are ignored.
    pub fn crawl_delay(&self, agent: &str) -> Option<Duration> {
        let body = self.content.as_deref()?;
        let agent = agent.to_lowercase();

        let mut group: Vec<String> = Vec::new();
        let mut group_has_rules = false;
        let mut for_agent: Option<f64> = None;
        let mut for_wildcard: Option<f64> = None;

        for line in body.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            if key == "user-agent" {
                // A user-agent line after rules starts a new group
                if group_has_rules {
                    group.clear();
                    group_has_rules = false;
                }
                group.push(value.to_lowercase());
                continue;
            }

            group_has_rules = true;
            if key != "crawl-delay" {
                continue;
            }
            let Some(delay) = value.parse::<f64>().ok().filter(|d| d.is_finite() && *d >= 0.0)
            else {
                continue;
            };

            if group.iter().any(|ua| ua != "*" && agent.contains(ua.as_str())) {
                for_agent = Some(delay);
            } else if group.iter().any(|ua| ua == "*") {
                for_wildcard = Some(delay);
            }
        }

        for_agent.or(for_wildcard).map(Duration::from_secs_f64)
    }
}
