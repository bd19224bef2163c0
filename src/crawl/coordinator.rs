//! Crawl coordination
//!
//! Drives the frontier to exhaustion with a bounded number of concurrent
//! extraction workers. Each worker loads one page, fans the extracted record
//! out to the registered sinks, admits the page's discoveries, and releases
//! its slot; the frontier closes itself when the last worker finishes with
//! nothing pending.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::sink::IndexSink;
use crate::types::PageData;

use super::browser::BrowserEngine;
use super::extractor::PageExtractor;
use super::frontier::{Admission, Frontier};
use super::CrawlError;

/// Counters accumulated over one run.
#[derive(Debug, Clone, Default)]
pub struct CrawlStats {
    /// Pages successfully extracted
    pub pages_crawled: u64,
    /// Pages skipped because of navigation or extraction failures
    pub pages_failed: u64,
    /// Pages skipped because the target answered 301/302
    pub redirects_skipped: u64,
    /// Discovered URLs admitted to the queue
    pub urls_discovered: u64,
    /// Discovered URLs recorded but out of scope
    pub urls_out_of_scope: u64,
    /// Total page load + extraction time (milliseconds)
    pub total_page_ms: u64,
    /// URLs ever observed, filled in at end of run
    pub urls_seen: usize,
}

impl CrawlStats {
    /// Average time spent per successfully crawled page.
    pub fn avg_page_ms(&self) -> f64 {
        if self.pages_crawled == 0 {
            0.0
        } else {
            self.total_page_ms as f64 / self.pages_crawled as f64
        }
    }
}

/// Handle for stopping a running crawl from the outside.
#[derive(Clone)]
pub struct CrawlHandle {
    frontier: Arc<Frontier>,
}

impl CrawlHandle {
    /// Stop admitting and dispatching URLs. In-flight workers finish their
    /// current page.
    pub fn stop(&self) {
        self.frontier.close();
    }
}

/// Coordinates one crawl run.
pub struct CrawlCoordinator {
    roots: Vec<Url>,
    frontier: Arc<Frontier>,
    browser: Arc<BrowserEngine>,
    extractor: PageExtractor,
    sinks: Vec<Arc<dyn IndexSink>>,
    degree_of_parallelism: usize,
    stats: Mutex<CrawlStats>,
}

impl CrawlCoordinator {
    pub fn new(
        roots: Vec<Url>,
        frontier: Arc<Frontier>,
        browser: Arc<BrowserEngine>,
        degree_of_parallelism: usize,
    ) -> Self {
        Self {
            roots,
            frontier,
            browser,
            extractor: PageExtractor::new(),
            sinks: Vec::new(),
            degree_of_parallelism: degree_of_parallelism.max(1),
            stats: Mutex::new(CrawlStats::default()),
        }
    }

    /// Register a sink. All sinks must be registered before `run`.
    pub fn add_sink(&mut self, sink: Arc<dyn IndexSink>) {
        self.sinks.push(sink);
    }

    /// Handle for cancelling the run.
    pub fn handle(&self) -> CrawlHandle {
        CrawlHandle {
            frontier: Arc::clone(&self.frontier),
        }
    }

    /// Run the crawl to completion and return the accumulated counters.
    pub async fn run(self: Arc<Self>) -> Result<CrawlStats, CrawlError> {
        info!(
            "Starting crawl: {} root(s), parallelism {}",
            self.roots.len(),
            self.degree_of_parallelism
        );

        for root in &self.roots {
            self.frontier.admit(root);
        }
        // Nothing to do when every root is a duplicate or out of scope.
        if self.frontier.pending_len() == 0 {
            self.frontier.close();
        }

        let coordinator = Arc::clone(&self);
        drive(
            Arc::clone(&self.frontier),
            self.degree_of_parallelism,
            move |url| {
                let coordinator = Arc::clone(&coordinator);
                async move { coordinator.process(url).await }
            },
        )
        .await?;

        let mut stats = self.stats.lock().clone();
        stats.urls_seen = self.frontier.visited_len();
        info!(
            "Crawl finished: {} crawled, {} failed, {} redirects",
            stats.pages_crawled, stats.pages_failed, stats.redirects_skipped
        );
        Ok(stats)
    }

    /// Crawl one URL: load, extract, fan out, admit discoveries.
    async fn process(&self, url: Url) {
        let started = Instant::now();
        debug!("Crawling {}", url);

        let page = match self.crawl_page(&url).await {
            Ok(page) => page,
            Err(e) => {
                self.record_failure(&url, e);
                return;
            }
        };

        // Listeners run before any discovery is enqueued.
        for sink in &self.sinks {
            sink.index_page(&page);
        }

        {
            let mut stats = self.stats.lock();
            stats.pages_crawled += 1;
            stats.total_page_ms += started.elapsed().as_millis() as u64;
        }

        // The worker still holds its permit here, so the frontier cannot
        // observe an empty queue before these admissions land.
        for target in discovered_urls(&page) {
            match self.frontier.admit(&target) {
                Admission::Enqueued => self.stats.lock().urls_discovered += 1,
                Admission::OutOfScope => self.stats.lock().urls_out_of_scope += 1,
                Admission::AlreadySeen | Admission::Closed => {}
            }
        }
    }

    async fn crawl_page(&self, url: &Url) -> Result<PageData, CrawlError> {
        let loaded = self.browser.load(url).await?;
        let result = self.extractor.extract(&loaded, url).await;
        loaded.close().await;
        result
    }

    /// Per-URL errors are recovered locally; the run continues.
    fn record_failure(&self, url: &Url, error: CrawlError) {
        match &error {
            CrawlError::RedirectEncountered { status, .. } => {
                warn!("Skipping {}: redirect ({})", url, status);
                self.stats.lock().redirects_skipped += 1;
            }
            CrawlError::NavigationFailure { .. }
            | CrawlError::NavigationTimeout(_)
            | CrawlError::HttpNotOk { .. } => {
                warn!("Skipping {}: {}", url, error);
                self.stats.lock().pages_failed += 1;
            }
            _ => {
                error!("Extraction failed for {}: {}", url, error);
                self.stats.lock().pages_failed += 1;
            }
        }
    }
}

/// URLs a page contributes back to the frontier: followable links plus feed
/// and sitemap references.
fn discovered_urls(page: &PageData) -> Vec<Url> {
    page.links
        .iter()
        .filter(|link| link.follow)
        .map(|link| link.url.clone())
        .chain(page.feeds.iter().cloned())
        .chain(page.sitemaps.iter().cloned())
        .collect()
}

/// Drive the frontier to exhaustion with at most `parallelism` concurrent
/// workers.
///
/// The worker future runs entirely between `take` and `complete`, so any URL
/// it admits is visible to termination detection. Only bookkeeping invariant
/// violations abort the loop; the frontier is closed and the error returned
/// after in-flight workers drain.
pub async fn drive<F, Fut>(
    frontier: Arc<Frontier>,
    parallelism: usize,
    worker: F,
) -> Result<(), CrawlError>
where
    F: Fn(Url) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(parallelism.max(1)));
    let mut workers: JoinSet<Result<(), CrawlError>> = JoinSet::new();
    let mut fatal: Option<CrawlError> = None;

    while let Some(url) = frontier.take().await {
        let permit = match Arc::clone(&semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };

        let frontier_for_worker = Arc::clone(&frontier);
        let worker = worker.clone();
        workers.spawn(async move {
            let _permit = permit;
            worker(url).await;
            frontier_for_worker.complete()
        });

        // Reap finished workers so the set does not grow unbounded.
        while let Some(joined) = workers.try_join_next() {
            collect_fatal(joined, &frontier, &mut fatal);
        }
    }

    while let Some(joined) = workers.join_next().await {
        collect_fatal(joined, &frontier, &mut fatal);
    }

    match fatal {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

fn collect_fatal(
    joined: Result<Result<(), CrawlError>, tokio::task::JoinError>,
    frontier: &Arc<Frontier>,
    fatal: &mut Option<CrawlError>,
) {
    match joined {
        Ok(Ok(())) => {}
        Ok(Err(error)) => {
            error!("Fatal crawl error: {}", error);
            frontier.close();
            fatal.get_or_insert(error);
        }
        Err(join_error) => {
            error!("Crawl worker panicked: {}", join_error);
            frontier.close();
            fatal.get_or_insert(CrawlError::InvariantViolation("crawl worker panicked"));
        }
    }
}
