//! Crawler configuration

use serde::{Deserialize, Serialize};

use super::DEFAULT_USER_AGENT;

/// A scope filter admitting URLs under one authority and path prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Authority (host, or host:port) the filter matches
    pub authority: String,
    /// Path prefix the filter matches, always starting with `/`
    pub path_prefix: String,
}

/// Crawl coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// Root URLs the crawl starts from
    pub root_urls: Vec<String>,
    /// Extra scope filters in addition to those derived from the roots
    #[serde(default)]
    pub filters: Vec<FilterConfig>,
    /// Number of pages extracted concurrently
    pub degree_of_parallelism: usize,
    /// Ceiling for a single page navigation (seconds)
    pub navigation_timeout_secs: u64,
    /// User agent string sent by the browser
    pub user_agent: String,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            root_urls: Vec::new(),
            filters: Vec::new(),
            degree_of_parallelism: 4,
            navigation_timeout_secs: 60,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}
