//! Crawl frontier: deduplicated work queue with termination detection
//!
//! The frontier owns three pieces of state under one mutex: the set of URLs
//! ever seen, the FIFO of URLs admitted but not yet dispatched, and the count
//! of URLs currently being worked on. Keeping them under a single lock makes
//! `admit` atomic with respect to duplicate detection and makes end-of-run
//! detection sound: a worker that finishes while the queue is empty and no
//! other worker is in flight closes the frontier.

use std::collections::{HashSet, VecDeque};

use parking_lot::Mutex;
use tokio::sync::Notify;
use url::Url;

use super::filter::UrlFilter;
use super::normalize_url;
use super::CrawlError;

/// Outcome of offering a URL to the frontier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Newly seen and in scope; queued for extraction
    Enqueued,
    /// Newly seen but no filter matched; recorded in the seen set only
    OutOfScope,
    /// Seen before; nothing to do
    AlreadySeen,
    /// The frontier no longer accepts URLs
    Closed,
}

#[derive(Debug, Default)]
struct FrontierState {
    /// Normalized forms of every URL ever observed. Never shrinks.
    visited: HashSet<String>,
    /// URLs admitted but not yet dispatched, in discovery order.
    pending: VecDeque<Url>,
    /// URLs handed out by `take` whose worker has not called `complete`.
    in_flight: usize,
    closed: bool,
}

/// Concurrency-safe frontier over a growing set of URLs.
pub struct Frontier {
    state: Mutex<FrontierState>,
    notify: Notify,
    filters: Vec<UrlFilter>,
}

impl Frontier {
    /// Create a frontier scoped by the given filters (OR semantics).
    pub fn new(filters: Vec<UrlFilter>) -> Self {
        Self {
            state: Mutex::new(FrontierState::default()),
            notify: Notify::new(),
            filters,
        }
    }

    /// Record a URL and, if it is new and in scope, queue it for extraction.
    ///
    /// The URL enters the seen set before filtering, so even out-of-scope
    /// URLs are never re-evaluated.
    pub fn admit(&self, url: &Url) -> Admission {
        let normalized = normalize_url(url);
        let mut state = self.state.lock();

        if state.closed {
            return Admission::Closed;
        }
        if !state.visited.insert(normalized.as_str().to_string()) {
            return Admission::AlreadySeen;
        }
        if !self.filters.iter().any(|f| f.matches(&normalized)) {
            return Admission::OutOfScope;
        }

        state.pending.push_back(normalized);
        drop(state);
        self.notify.notify_waiters();
        Admission::Enqueued
    }

    /// Record a URL as seen without ever queueing it.
    ///
    /// Used by the navigation response observer for redirect targets and
    /// sub-resource documents, so later discoveries short-circuit.
    pub fn admit_seen(&self, url: &Url) {
        let normalized = normalize_url(url);
        let mut state = self.state.lock();
        state.visited.insert(normalized.as_str().to_string());
    }

    /// Take the next URL, waiting until one is available or the frontier
    /// closes. Returns None once closed with nothing pending.
    ///
    /// The in-flight count is incremented atomically with the dequeue, so a
    /// concurrently completing worker cannot observe an empty frontier while
    /// this URL is between `take` and its worker.
    pub async fn take(&self) -> Option<Url> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register as a waiter before inspecting state; a notify_waiters
            // landing between the unlock and the await would otherwise be
            // lost, leaving the driver asleep with work pending.
            notified.as_mut().enable();
            {
                let mut state = self.state.lock();
                if let Some(url) = state.pending.pop_front() {
                    state.in_flight += 1;
                    return Some(url);
                }
                if state.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Mark one taken URL as finished.
    ///
    /// While holding the lock, checks the termination condition: no worker in
    /// flight and nothing pending means no URL can ever be discovered again,
    /// so the frontier closes and all waiters wake up.
    pub fn complete(&self) -> Result<(), CrawlError> {
        let mut state = self.state.lock();
        if state.in_flight == 0 {
            return Err(CrawlError::InvariantViolation(
                "complete() called with no URL in flight",
            ));
        }
        state.in_flight -= 1;

        if state.in_flight == 0 && state.pending.is_empty() {
            state.closed = true;
            drop(state);
            self.notify.notify_waiters();
        }
        Ok(())
    }

    /// Close the frontier: no further URLs will be admitted, and all blocked
    /// takers wake up.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        drop(state);
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of URLs ever observed.
    pub fn visited_len(&self) -> usize {
        self.state.lock().visited.len()
    }

    /// Number of URLs queued but not yet dispatched.
    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Number of URLs between `take` and `complete`.
    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn open_frontier() -> Frontier {
        Frontier::new(vec![UrlFilter::new("example.com", "/")])
    }

    #[test]
    fn admit_queues_new_in_scope_url() {
        let frontier = open_frontier();
        assert_eq!(frontier.admit(&url("https://example.com/a")), Admission::Enqueued);
        assert_eq!(frontier.pending_len(), 1);
        assert_eq!(frontier.visited_len(), 1);
    }

    #[test]
    fn admit_rejects_duplicates() {
        let frontier = open_frontier();
        frontier.admit(&url("https://example.com/a"));
        assert_eq!(
            frontier.admit(&url("https://example.com/a")),
            Admission::AlreadySeen
        );
        assert_eq!(frontier.pending_len(), 1);
    }

    #[test]
    fn urls_differing_only_by_fragment_are_the_same() {
        let frontier = open_frontier();
        assert_eq!(
            frontier.admit(&url("https://example.com/a/x#s1")),
            Admission::Enqueued
        );
        assert_eq!(
            frontier.admit(&url("https://example.com/a/x#s2")),
            Admission::AlreadySeen
        );
        assert_eq!(frontier.pending_len(), 1);
    }

    #[test]
    fn out_of_scope_urls_stay_in_visited() {
        let frontier = Frontier::new(vec![UrlFilter::new("example.com", "/a/")]);
        assert_eq!(
            frontier.admit(&url("https://example.com/b/y")),
            Admission::OutOfScope
        );
        assert_eq!(frontier.pending_len(), 0);
        assert_eq!(frontier.visited_len(), 1);
        // A second offer is deduplicated, not re-filtered.
        assert_eq!(
            frontier.admit(&url("https://example.com/b/y")),
            Admission::AlreadySeen
        );
    }

    #[test]
    fn admit_seen_blocks_later_admission() {
        let frontier = open_frontier();
        frontier.admit_seen(&url("https://example.com/redirected"));
        assert_eq!(
            frontier.admit(&url("https://example.com/redirected")),
            Admission::AlreadySeen
        );
        assert_eq!(frontier.pending_len(), 0);
    }

    #[test]
    fn visited_never_smaller_than_enqueued() {
        let frontier = Frontier::new(vec![UrlFilter::new("example.com", "/a/")]);
        frontier.admit(&url("https://example.com/a/1"));
        frontier.admit(&url("https://example.com/a/2"));
        frontier.admit(&url("https://example.com/b/out"));
        frontier.admit_seen(&url("https://example.com/seen-only"));
        assert!(frontier.visited_len() >= frontier.pending_len());
        assert_eq!(frontier.visited_len(), 4);
        assert_eq!(frontier.pending_len(), 2);
    }

    #[tokio::test]
    async fn take_returns_urls_in_fifo_order() {
        let frontier = open_frontier();
        frontier.admit(&url("https://example.com/1"));
        frontier.admit(&url("https://example.com/2"));

        assert_eq!(frontier.take().await.unwrap().path(), "/1");
        assert_eq!(frontier.take().await.unwrap().path(), "/2");
        assert_eq!(frontier.in_flight(), 2);
    }

    #[tokio::test]
    async fn take_returns_none_after_close() {
        let frontier = open_frontier();
        frontier.close();
        assert!(frontier.take().await.is_none());
    }

    #[tokio::test]
    async fn close_unblocks_waiting_taker() {
        let frontier = Arc::new(open_frontier());
        let waiter = {
            let frontier = Arc::clone(&frontier);
            tokio::spawn(async move { frontier.take().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        frontier.close();
        let taken = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("taker should wake up")
            .unwrap();
        assert!(taken.is_none());
    }

    #[tokio::test]
    async fn admit_unblocks_waiting_taker() {
        let frontier = Arc::new(open_frontier());
        let waiter = {
            let frontier = Arc::clone(&frontier);
            tokio::spawn(async move { frontier.take().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        frontier.admit(&url("https://example.com/late"));
        let taken = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("taker should wake up")
            .unwrap();
        assert_eq!(taken.unwrap().path(), "/late");
    }

    #[tokio::test]
    async fn last_completion_closes_the_frontier() {
        let frontier = open_frontier();
        frontier.admit(&url("https://example.com/only"));

        let taken = frontier.take().await.unwrap();
        assert_eq!(taken.path(), "/only");
        assert!(!frontier.is_closed());

        frontier.complete().unwrap();
        assert!(frontier.is_closed());
        assert!(frontier.take().await.is_none());
    }

    #[tokio::test]
    async fn completion_with_pending_work_keeps_frontier_open() {
        let frontier = open_frontier();
        frontier.admit(&url("https://example.com/1"));
        frontier.admit(&url("https://example.com/2"));

        let _ = frontier.take().await.unwrap();
        frontier.complete().unwrap();
        assert!(!frontier.is_closed());
        assert_eq!(frontier.pending_len(), 1);
    }

    #[tokio::test]
    async fn discovery_before_completion_keeps_frontier_open() {
        let frontier = open_frontier();
        frontier.admit(&url("https://example.com/root"));

        let _ = frontier.take().await.unwrap();
        // Worker discovers a link while still holding its slot.
        frontier.admit(&url("https://example.com/found"));
        frontier.complete().unwrap();

        assert!(!frontier.is_closed());
        assert_eq!(frontier.take().await.unwrap().path(), "/found");
    }

    #[test]
    fn complete_without_take_is_an_invariant_violation() {
        let frontier = open_frontier();
        let err = frontier.complete().unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn concurrent_admits_dedupe_to_one_entry() {
        let frontier = Arc::new(open_frontier());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let frontier = Arc::clone(&frontier);
            handles.push(tokio::spawn(async move {
                frontier.admit(&url("https://example.com/contended"))
            }));
        }

        let mut enqueued = 0;
        for handle in handles {
            if handle.await.unwrap() == Admission::Enqueued {
                enqueued += 1;
            }
        }
        assert_eq!(enqueued, 1);
        assert_eq!(frontier.pending_len(), 1);
    }
}
