//! Webharvest: a site-scoped crawling pipeline
//!
//! Starting from a set of root URLs, webharvest renders each page in a
//! headless browser (so client-side content exists before extraction), pulls
//! a structured record out of it, and streams the records to indexing sinks:
//! - a self-describing JSON document on disk
//! - a search backend behind a stable alias, rebuilt from scratch each run
//!   and swapped in atomically
//!
//! The crawl is an offline batch: a run ends once no URL remains eligible.

pub mod config;
pub mod crawl;
pub mod sink;
pub mod types;

pub use config::Config;
pub use crawl::{CrawlCoordinator, CrawlError, CrawlStats, Frontier, UrlFilter};
pub use types::{PageData, PageLink, RobotsDirectives};
