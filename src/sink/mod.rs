//! Indexer sinks
//!
//! Sinks consume the stream of crawled records. Submission never blocks the
//! crawling workers: each sink hands records to its own single-consumer task
//! over an unbounded channel and applies its own batching policy there.

pub mod file;
pub mod search;

pub use file::{FileSink, FileSinkHandle};
pub use search::{SearchSink, SearchSinkHandle};

use thiserror::Error;

use crate::types::PageData;

/// Errors surfaced by a sink when it finalizes.
///
/// Sink failures are the sink's responsibility; they never abort the crawl.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("search backend unavailable: {0}")]
    BackendUnavailable(#[from] reqwest::Error),

    #[error("search backend rejected request ({status}): {body}")]
    BackendRejected { status: u16, body: String },

    #[error("sink consumer task failed: {0}")]
    ConsumerFailed(String),
}

/// A consumer of crawled records.
///
/// `index_page` must not block; implementations forward the record to their
/// internal queue. Finalization (drain, flush, alias swap) happens on the
/// concrete sink types, which the owner closes after the run.
pub trait IndexSink: Send + Sync {
    /// Short name for log lines.
    fn name(&self) -> &'static str;

    /// Submit one record. Never blocks.
    fn index_page(&self, page: &PageData);
}
