//! Indexer sink configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Streaming file sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSinkConfig {
    /// Write crawled records to a JSON document on disk
    pub enabled: bool,
    /// Output path; parent directories are created if missing
    pub path: PathBuf,
}

impl Default for FileSinkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("webpages.json"),
        }
    }
}

/// Search backend sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSinkConfig {
    /// Index crawled records into the search backend
    pub enabled: bool,
    /// Base URL of the search backend
    pub endpoint: String,
    /// Stable alias readers query; each run builds a fresh physical index
    /// behind it
    pub alias: String,
    /// Records per bulk request
    pub batch_size: usize,
}

impl Default for SearchSinkConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "http://localhost:9200".to_string(),
            alias: "webpages".to_string(),
            batch_size: 10,
        }
    }
}
