//! Streaming file sink
//!
//! Writes the run's records as one self-describing JSON document:
//! `{ "Version": 1, "CreatedAt": <ISO-8601 UTC>, "Pages": [ ... ] }`.
//! Records are appended as they arrive; the array and object are closed and
//! the stream flushed when the sink is closed. serde_json writes non-ASCII
//! literally, so the document stays readable.
//!
//! This sink deliberately writes every record, including `noindex` pages;
//! only the search-backend sink honors `noindex`.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::types::PageData;

use super::{IndexSink, SinkError};

/// Single-consumer sink appending records to a JSON document on disk.
pub struct FileSink {
    tx: UnboundedSender<PageData>,
    consumer: JoinHandle<Result<usize, SinkError>>,
    path: PathBuf,
}

impl FileSink {
    /// Create (or replace) the output document and start the consumer.
    ///
    /// The parent directory is created if missing.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = File::create(&path)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let consumer = tokio::spawn(write_document(file, rx));

        Ok(Self { tx, consumer, path })
    }

    /// Drain outstanding records, close the document, flush the stream.
    pub async fn close(self) -> Result<(), SinkError> {
        drop(self.tx);
        let written = self
            .consumer
            .await
            .map_err(|e| SinkError::ConsumerFailed(e.to_string()))??;
        info!("Wrote {} page(s) to {}", written, self.path.display());
        Ok(())
    }
}

impl IndexSink for FileSink {
    fn name(&self) -> &'static str {
        "file"
    }

    fn index_page(&self, page: &PageData) {
        if self.tx.send(page.clone()).is_err() {
            debug!("File sink consumer already stopped; dropping record");
        }
    }
}

/// Cloneable submission handle, registered with the coordinator while the
/// owning [`FileSink`] stays behind to be closed after the run.
#[derive(Clone)]
pub struct FileSinkHandle {
    tx: UnboundedSender<PageData>,
}

impl FileSink {
    pub fn handle(&self) -> FileSinkHandle {
        FileSinkHandle {
            tx: self.tx.clone(),
        }
    }
}

impl IndexSink for FileSinkHandle {
    fn name(&self) -> &'static str {
        "file"
    }

    fn index_page(&self, page: &PageData) {
        if self.tx.send(page.clone()).is_err() {
            debug!("File sink consumer already stopped; dropping record");
        }
    }
}

async fn write_document(
    file: File,
    mut rx: UnboundedReceiver<PageData>,
) -> Result<usize, SinkError> {
    let mut writer = BufWriter::new(file);
    let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    write!(
        writer,
        "{{\"Version\":1,\"CreatedAt\":{},\"Pages\":[",
        serde_json::to_string(&created_at)?
    )?;

    let mut written = 0usize;
    while let Some(page) = rx.recv().await {
        if written > 0 {
            writer.write_all(b",")?;
        }
        // One record at a time; the channel serializes concurrent producers.
        serde_json::to_writer(&mut writer, &page)?;
        written += 1;
    }

    writer.write_all(b"]}")?;
    writer.flush()?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PageLink, RobotsDirectives};
    use url::Url;

    fn page(path: &str, title: &str) -> PageData {
        PageData {
            canonical_url: Url::parse(&format!("https://example.com{}", path)).unwrap(),
            mime_type: Some("text/html".to_string()),
            content: Some("<html></html>".to_string()),
            title: Some(title.to_string()),
            description: None,
            links: vec![PageLink::new(
                Url::parse("https://example.com/linked").unwrap(),
                Some("linked".to_string()),
                true,
            )],
            feeds: Vec::new(),
            sitemaps: Vec::new(),
            main_element_texts: vec!["text".to_string()],
            headers: Vec::new(),
            robots: Some(RobotsDirectives {
                index_page: false,
                follow_links: true,
            }),
            crawled_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn writes_a_self_describing_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pages.json");

        let sink = FileSink::create(&path).unwrap();
        sink.index_page(&page("/a", "First"));
        sink.index_page(&page("/b", "Second"));
        sink.close().await.unwrap();

        let document: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(document["Version"], 1);
        assert!(document["CreatedAt"].as_str().unwrap().ends_with('Z'));
        assert_eq!(document["Pages"].as_array().unwrap().len(), 2);
        assert_eq!(document["Pages"][0]["title"], "First");
    }

    #[tokio::test]
    async fn empty_run_produces_an_empty_pages_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pages.json");

        let sink = FileSink::create(&path).unwrap();
        sink.close().await.unwrap();

        let document: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(document["Pages"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn non_ascii_is_written_literally() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pages.json");

        let sink = FileSink::create(&path).unwrap();
        sink.index_page(&page("/é", "Café — überschrift"));
        sink.close().await.unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("Café — überschrift"));
        assert!(!raw.contains("\\u00e9"));
    }

    #[tokio::test]
    async fn noindex_pages_are_still_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pages.json");

        let sink = FileSink::create(&path).unwrap();
        // The fixture's robots say noindex; the file sink ignores that.
        sink.index_page(&page("/hidden", "Hidden"));
        sink.close().await.unwrap();

        let document: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(document["Pages"].as_array().unwrap().len(), 1);
        assert_eq!(document["Pages"][0]["robots"]["indexPage"], false);
    }

    #[tokio::test]
    async fn missing_parent_directories_are_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/pages.json");

        let sink = FileSink::create(&path).unwrap();
        sink.close().await.unwrap();

        assert!(path.exists());
    }

    #[tokio::test]
    async fn create_replaces_an_existing_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pages.json");
        fs::write(&path, "stale contents").unwrap();

        let sink = FileSink::create(&path).unwrap();
        sink.close().await.unwrap();

        let document: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(document["Version"], 1);
    }
}
