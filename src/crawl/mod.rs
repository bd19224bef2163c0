//! Site-scoped crawling subsystem
//!
//! Implements the traversal from a set of root URLs to a stream of extracted
//! page records. The pieces:
//!
//! - `UrlFilter`: scheme + authority + path-prefix scope checks
//! - `robots`: in-document indexing/follow directive parsing
//! - `Frontier`: deduplicated work queue with termination detection
//! - `BrowserEngine`: headless browser sessions with request interception
//! - `PageExtractor`: rendered page + response to `PageData`
//! - `CrawlCoordinator`: bounded-parallelism driver and sink fan-out

pub mod browser;
pub mod coordinator;
pub mod extractor;
pub mod filter;
pub mod frontier;
pub mod robots;

pub use browser::BrowserEngine;
pub use coordinator::{CrawlCoordinator, CrawlStats};
pub use extractor::PageExtractor;
pub use filter::UrlFilter;
pub use frontier::{Admission, Frontier};

use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Errors raised while crawling a single URL.
///
/// Everything except [`CrawlError::InvariantViolation`] is recovered locally:
/// the coordinator logs the failure and moves on to the next URL.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("browser returned no response for {url}")]
    NavigationFailure { url: Url },

    #[error("navigation timed out after {0:?}")]
    NavigationTimeout(Duration),

    #[error("redirect ({status}) encountered at {url}")]
    RedirectEncountered { url: Url, status: u16 },

    #[error("HTTP status {status} for {url}")]
    HttpNotOk { url: Url, status: u16 },

    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error("browser error: {0}")]
    Browser(#[from] chromiumoxide::error::CdpError),

    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("crawl bookkeeping invariant violated: {0}")]
    InvariantViolation(&'static str),
}

impl CrawlError {
    /// Whether this error must abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CrawlError::InvariantViolation(_))
    }
}

/// Normalize a URL for identity comparison.
///
/// Strips the fragment; the `url` crate already folds scheme and host to
/// lowercase. Two URLs are the same page iff their normalized forms are
/// byte-equal.
pub fn normalize_url(url: &Url) -> Url {
    let mut normalized = url.clone();
    normalized.set_fragment(None);
    normalized
}
