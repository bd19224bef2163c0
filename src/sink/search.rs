//! Search backend sink with atomic alias swap
//!
//! Each run builds a fresh physical index named
//! `<alias>_<yyyyMMddHHmmss>_<rand>` and bulk-loads records into it in small
//! batches. Only when the stream closes does the stable alias move: one
//! atomic `_aliases` call adds the new index and removes every index
//! previously bound, so readers querying the alias see either the old build
//! or the new one, never a partial view. The replaced indices are deleted
//! afterwards.
//!
//! Records whose robots directives say `noindex` are dropped at submission;
//! the file sink deliberately does not share this behavior.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use reqwest::StatusCode;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SearchSinkConfig;
use crate::types::PageData;

use super::{IndexSink, SinkError};

/// Single-consumer sink batching records into the search backend.
pub struct SearchSink {
    tx: UnboundedSender<PageData>,
    consumer: JoinHandle<Result<(), SinkError>>,
    cancelled: Arc<AtomicBool>,
}

impl SearchSink {
    /// Start the consumer task. The physical index is created lazily by the
    /// consumer so a failing backend surfaces at close, not here.
    pub fn start(config: SearchSinkConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancelled = Arc::new(AtomicBool::new(false));
        let consumer = tokio::spawn(run_consumer(config, rx, Arc::clone(&cancelled)));
        Self {
            tx,
            consumer,
            cancelled,
        }
    }

    /// Drain outstanding records, swap the alias, delete replaced indices.
    pub async fn close(self) -> Result<(), SinkError> {
        drop(self.tx);
        self.consumer
            .await
            .map_err(|e| SinkError::ConsumerFailed(e.to_string()))?
    }

    /// Drain outstanding records but leave the alias untouched.
    ///
    /// Used on cancellation so searchers keep seeing the previous complete
    /// build rather than a partial one.
    pub async fn abort(self) -> Result<(), SinkError> {
        self.cancelled.store(true, Ordering::SeqCst);
        drop(self.tx);
        self.consumer
            .await
            .map_err(|e| SinkError::ConsumerFailed(e.to_string()))?
    }
}

impl IndexSink for SearchSink {
    fn name(&self) -> &'static str {
        "search"
    }

    fn index_page(&self, page: &PageData) {
        submit(&self.tx, page);
    }
}

/// Cloneable submission handle, registered with the coordinator while the
/// owning [`SearchSink`] stays behind to be closed after the run.
#[derive(Clone)]
pub struct SearchSinkHandle {
    tx: UnboundedSender<PageData>,
}

impl SearchSink {
    pub fn handle(&self) -> SearchSinkHandle {
        SearchSinkHandle {
            tx: self.tx.clone(),
        }
    }
}

impl IndexSink for SearchSinkHandle {
    fn name(&self) -> &'static str {
        "search"
    }

    fn index_page(&self, page: &PageData) {
        submit(&self.tx, page);
    }
}

fn submit(tx: &UnboundedSender<PageData>, page: &PageData) {
    if !should_index(page) {
        debug!("Skipping noindex page {}", page.canonical_url);
        return;
    }
    if tx.send(page.clone()).is_err() {
        debug!("Search sink consumer already stopped; dropping record");
    }
}

/// Pages marked `noindex` never reach the search backend.
pub(crate) fn should_index(page: &PageData) -> bool {
    page.effective_robots().index_page
}

/// Fresh physical index name behind the stable alias.
pub(crate) fn physical_index_name(alias: &str) -> String {
    format!(
        "{}_{}_{:08x}",
        alias,
        Utc::now().format("%Y%m%d%H%M%S"),
        rand::random::<u32>()
    )
}

/// NDJSON payload for one `_bulk` request.
pub(crate) fn bulk_payload(index: &str, pages: &[PageData]) -> Result<String, serde_json::Error> {
    let mut payload = String::new();
    for page in pages {
        payload.push_str(&serde_json::to_string(
            &serde_json::json!({ "index": { "_index": index } }),
        )?);
        payload.push('\n');
        payload.push_str(&serde_json::to_string(page)?);
        payload.push('\n');
    }
    Ok(payload)
}

/// Alias actions rebinding `alias` from `old_indices` to `new_index` in one
/// atomic operation.
pub(crate) fn alias_actions(
    alias: &str,
    new_index: &str,
    old_indices: &[String],
) -> serde_json::Value {
    let mut actions = vec![serde_json::json!({
        "add": { "index": new_index, "alias": alias }
    })];
    for old in old_indices {
        actions.push(serde_json::json!({
            "remove": { "index": old, "alias": alias }
        }));
    }
    serde_json::json!({ "actions": actions })
}

async fn run_consumer(
    config: SearchSinkConfig,
    mut rx: UnboundedReceiver<PageData>,
    cancelled: Arc<AtomicBool>,
) -> Result<(), SinkError> {
    let client = reqwest::Client::new();
    let endpoint = config.endpoint.trim_end_matches('/').to_string();
    let index_name = physical_index_name(&config.alias);

    create_index(&client, &endpoint, &index_name).await?;
    info!("Created physical index {}", index_name);

    let mut batch: Vec<PageData> = Vec::with_capacity(config.batch_size);
    let mut indexed = 0usize;

    loop {
        match rx.try_recv() {
            Ok(page) => {
                batch.push(page);
                if batch.len() >= config.batch_size {
                    indexed += flush_batch(&client, &endpoint, &index_name, &mut batch).await?;
                }
            }
            Err(TryRecvError::Empty) => {
                // Nothing immediately available: flush the partial batch
                // rather than sitting on it, then wait for more.
                if !batch.is_empty() {
                    indexed += flush_batch(&client, &endpoint, &index_name, &mut batch).await?;
                }
                match rx.recv().await {
                    Some(page) => batch.push(page),
                    None => break,
                }
            }
            Err(TryRecvError::Disconnected) => break,
        }
    }

    if !batch.is_empty() {
        indexed += flush_batch(&client, &endpoint, &index_name, &mut batch).await?;
    }

    if cancelled.load(Ordering::SeqCst) {
        info!(
            "Run cancelled; leaving alias '{}' untouched ({} record(s) in {})",
            config.alias, indexed, index_name
        );
        return Ok(());
    }

    swap_alias(&client, &endpoint, &config.alias, &index_name).await?;
    info!(
        "Alias '{}' now serves {} ({} record(s))",
        config.alias, index_name, indexed
    );
    Ok(())
}

async fn create_index(
    client: &reqwest::Client,
    endpoint: &str,
    index: &str,
) -> Result<(), SinkError> {
    let response = client
        .put(format!("{}/{}", endpoint, index))
        .json(&serde_json::json!({}))
        .send()
        .await?;
    ensure_success(response).await
}

async fn flush_batch(
    client: &reqwest::Client,
    endpoint: &str,
    index: &str,
    batch: &mut Vec<PageData>,
) -> Result<usize, SinkError> {
    let payload = bulk_payload(index, batch)?;
    debug!("Flushing {} record(s) to {}", batch.len(), index);

    let response = client
        .post(format!("{}/_bulk", endpoint))
        .header("content-type", "application/x-ndjson")
        .body(payload)
        .send()
        .await?;
    ensure_success(response).await?;

    let flushed = batch.len();
    batch.clear();
    Ok(flushed)
}

async fn swap_alias(
    client: &reqwest::Client,
    endpoint: &str,
    alias: &str,
    new_index: &str,
) -> Result<(), SinkError> {
    let old_indices = current_alias_indices(client, endpoint, alias).await?;

    let response = client
        .post(format!("{}/_aliases", endpoint))
        .json(&alias_actions(alias, new_index, &old_indices))
        .send()
        .await?;
    ensure_success(response).await?;

    for old in &old_indices {
        let response = client.delete(format!("{}/{}", endpoint, old)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            continue;
        }
        if let Err(e) = ensure_success(response).await {
            // The alias already moved; a leftover index is an annoyance,
            // not a correctness problem.
            warn!("Failed to delete replaced index {}: {}", old, e);
        }
    }
    Ok(())
}

/// Indices currently bound to the alias; empty when the alias is unknown.
async fn current_alias_indices(
    client: &reqwest::Client,
    endpoint: &str,
    alias: &str,
) -> Result<Vec<String>, SinkError> {
    let response = client
        .get(format!("{}/_alias/{}", endpoint, alias))
        .send()
        .await?;
    if response.status() == StatusCode::NOT_FOUND {
        return Ok(Vec::new());
    }
    let response = check_status(response).await?;
    let mapping: serde_json::Value = response.json().await?;
    Ok(mapping
        .as_object()
        .map(|m| m.keys().cloned().collect())
        .unwrap_or_default())
}

async fn ensure_success(response: reqwest::Response) -> Result<(), SinkError> {
    check_status(response).await.map(|_| ())
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, SinkError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SinkError::BackendRejected {
        status: status.as_u16(),
        body,
    })
}
