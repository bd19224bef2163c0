//! Configuration for webharvest

mod browser;
mod crawler;
mod logging;
mod sinks;

pub use browser::BrowserSettings;
pub use crawler::{CrawlerConfig, FilterConfig};
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use sinks::{FileSinkConfig, SearchSinkConfig};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default user agent for browser navigation
pub const DEFAULT_USER_AGENT: &str = "webharvest/0.1 (+https://github.com/webharvest)";

/// Main configuration for a crawl run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Crawler configuration
    #[serde(default)]
    pub crawler: CrawlerConfig,
    /// Headless browser configuration
    #[serde(default)]
    pub browser: BrowserSettings,
    /// Streaming file sink configuration
    #[serde(default)]
    pub file_sink: FileSinkConfig,
    /// Search backend sink configuration
    #[serde(default)]
    pub search: SearchSinkConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e)
        })?;
        let config: Config = toml::from_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e)
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration fields.
    ///
    /// Collects all validation errors and reports them together so the user
    /// can fix everything in one pass.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if self.crawler.degree_of_parallelism == 0 {
            errors.push("degree_of_parallelism must be at least 1".to_string());
        }
        if self.crawler.navigation_timeout_secs == 0 {
            errors.push("navigation_timeout_secs must be positive".to_string());
        }
        for root in &self.crawler.root_urls {
            match url::Url::parse(root) {
                Ok(u) if u.scheme() == "http" || u.scheme() == "https" => {}
                Ok(u) => errors.push(format!(
                    "root URL '{}' has unsupported scheme '{}'",
                    root,
                    u.scheme()
                )),
                Err(e) => errors.push(format!("invalid root URL '{}': {}", root, e)),
            }
        }
        for filter in &self.crawler.filters {
            if filter.authority.is_empty() {
                errors.push("filter authority must not be empty".to_string());
            }
            if !filter.path_prefix.starts_with('/') {
                errors.push(format!(
                    "filter path prefix '{}' must start with '/'",
                    filter.path_prefix
                ));
            }
        }

        if self.browser.viewport_width == 0 || self.browser.viewport_height == 0 {
            errors.push("browser viewport dimensions must be positive".to_string());
        }

        if self.file_sink.enabled && self.file_sink.path.as_os_str().is_empty() {
            errors.push("file sink path must not be empty".to_string());
        }

        if self.search.enabled {
            if self.search.endpoint.is_empty() {
                errors.push("search endpoint must not be empty".to_string());
            }
            if self.search.alias.is_empty() {
                errors.push("search alias must not be empty".to_string());
            }
            if self.search.batch_size == 0 {
                errors.push("search batch_size must be positive".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }
    }
}
