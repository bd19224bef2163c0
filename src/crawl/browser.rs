//! Headless browser sessions
//!
//! Wraps chromiumoxide with the behavior the crawl needs: a shared browser
//! whose pages execute scripts, abort image/media/font requests before they
//! are fetched, and surface every document response URL observed during
//! navigation to the frontier's seen set.

use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams as FetchEnableParams, EventRequestPaused,
    FailRequestParams,
};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams as NetworkEnableParams, ErrorReason, EventRequestWillBeSent,
    EventResponseReceived, GetResponseBodyParams, RequestId, ResourceType,
    SetUserAgentOverrideParams,
};
use chromiumoxide::Page;
use futures::future::FutureExt;
use futures::StreamExt;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use crate::config::BrowserSettings;

use super::CrawlError;

/// JavaScript that resolves once the document is interactive or complete.
const WAIT_FOR_READY_SCRIPT: &str = r#"
    new Promise((resolve) => {
        if (document.readyState === 'complete' || document.readyState === 'interactive') {
            resolve(document.readyState);
        } else {
            document.addEventListener('DOMContentLoaded', () => resolve(document.readyState));
            setTimeout(() => resolve('timeout'), 10000);
        }
    })
"#;

/// Settle time after the load event for late script-driven DOM work.
const POST_LOAD_QUIET_PERIOD: Duration = Duration::from_millis(500);

/// Ceiling for the listener task to hand over the main document response.
/// The response arrives before the load event, so the handover is normally
/// already resolved by the time navigation returns.
const NAVIGATION_RESPONSE_WAIT: Duration = Duration::from_secs(5);

/// The main document response of a completed navigation.
#[derive(Debug, Clone)]
pub struct NavigationResponse {
    /// Response URL
    pub url: String,
    /// HTTP status
    pub status: u16,
    headers: serde_json::Value,
    request_id: RequestId,
}

impl NavigationResponse {
    /// All values of a header, case-insensitive on the name.
    ///
    /// CDP joins repeated headers with newlines; they are split back apart
    /// here so `X-Robots-Tag: noindex` twice yields two values.
    pub fn header_values(&self, name: &str) -> Vec<String> {
        let mut values = Vec::new();
        if let Some(map) = self.headers.as_object() {
            for (key, value) in map {
                if !key.eq_ignore_ascii_case(name) {
                    continue;
                }
                if let Some(s) = value.as_str() {
                    values.extend(
                        s.split('\n')
                            .map(|part| part.trim().to_string())
                            .filter(|part| !part.is_empty()),
                    );
                }
            }
        }
        values
    }

    /// First value of a header, if present.
    pub fn header(&self, name: &str) -> Option<String> {
        self.header_values(name).into_iter().next()
    }

    /// The response media type: `content-type` without parameters,
    /// lowercased.
    pub fn media_type(&self) -> Option<String> {
        self.header("content-type").map(|value| {
            value
                .split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        })
    }
}

/// What the response observer saw during one navigation.
///
/// The main document response itself is handed to `load` through a oneshot;
/// only the redirect status travels through this log, and it is recorded
/// strictly before that handover.
#[derive(Debug, Default)]
struct ResponseLog {
    /// Status of the first redirect in the document chain, if any
    redirect_status: Option<u16>,
}

/// Shared headless browser. Each worker opens, uses, and closes its own page.
pub struct BrowserEngine {
    browser: Browser,
    handler_task: JoinHandle<()>,
    user_agent: String,
    navigation_timeout: Duration,
    /// Every document response URL observed during navigation lands here so
    /// the frontier can short-circuit later discoveries of the same URL.
    observer: UnboundedSender<Url>,
}

impl BrowserEngine {
    /// Launch the browser process and its CDP event loop.
    pub async fn launch(
        settings: &BrowserSettings,
        user_agent: String,
        navigation_timeout: Duration,
        observer: UnboundedSender<Url>,
    ) -> Result<Self, CrawlError> {
        let mut builder = BrowserConfig::builder()
            .window_size(settings.viewport_width, settings.viewport_height)
            .arg(format!("--lang={}", settings.locale));
        if let Some(executable) = &settings.executable {
            builder = builder.chrome_executable(executable);
        }
        let config = builder.build().map_err(CrawlError::Launch)?;

        let (browser, mut handler) = Browser::launch(config).await?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            browser,
            handler_task,
            user_agent,
            navigation_timeout,
            observer,
        })
    }

    /// Load a URL in a fresh page, enforcing the navigation ceiling.
    ///
    /// Fails with [`CrawlError::RedirectEncountered`] when the target answers
    /// 301/302, [`CrawlError::NavigationFailure`] when no document response
    /// arrives, and [`CrawlError::HttpNotOk`] for other non-2xx statuses.
    pub async fn load(&self, url: &Url) -> Result<LoadedPage, CrawlError> {
        let page = self.browser.new_page("about:blank").await?;

        let log = Arc::new(Mutex::new(ResponseLog::default()));
        let mut tasks = Vec::new();

        let document_rx = match self.instrument_page(&page, &log, &mut tasks).await {
            Ok(rx) => rx,
            Err(e) => {
                discard_page(page, tasks).await;
                return Err(e);
            }
        };

        let ceiling = self.navigation_timeout;
        let navigation = tokio::time::timeout(ceiling, async {
            page.goto(url.as_str()).await?;
            page.wait_for_navigation().await?;
            Ok::<_, chromiumoxide::error::CdpError>(())
        })
        .await;

        match navigation {
            Err(_) => {
                discard_page(page, tasks).await;
                return Err(CrawlError::NavigationTimeout(ceiling));
            }
            Ok(Err(e)) => {
                discard_page(page, tasks).await;
                return Err(e.into());
            }
            Ok(Ok(())) => {}
        }

        wait_for_page_ready(&page).await;
        tokio::time::sleep(POST_LOAD_QUIET_PERIOD).await;

        // The listener task hands over the main document response; waiting on
        // the channel (not a timer) is what orders this read after the
        // listener has processed the navigation events.
        let document = match tokio::time::timeout(NAVIGATION_RESPONSE_WAIT, document_rx).await {
            Ok(Ok(response)) => Some(response),
            Ok(Err(_)) | Err(_) => None,
        };

        // Redirect hops are drained into the log before the handover above,
        // so this read cannot miss one.
        let redirect_status = log.lock().redirect_status;
        if let Some(status) = redirect_status {
            if matches!(status, 301 | 302) {
                discard_page(page, tasks).await;
                return Err(CrawlError::RedirectEncountered {
                    url: url.clone(),
                    status,
                });
            }
        }

        let Some(response) = document else {
            discard_page(page, tasks).await;
            return Err(CrawlError::NavigationFailure { url: url.clone() });
        };

        if !(200..300).contains(&response.status) {
            let status = response.status;
            discard_page(page, tasks).await;
            return Err(CrawlError::HttpNotOk {
                url: url.clone(),
                status,
            });
        }

        Ok(LoadedPage {
            page,
            response,
            tasks,
        })
    }

    /// Set up interception and response observation on a fresh page.
    ///
    /// Returns the receiver on which the listener task delivers the main
    /// document response once it (and any redirect hops preceding it) has
    /// been processed.
    async fn instrument_page(
        &self,
        page: &Page,
        log: &Arc<Mutex<ResponseLog>>,
        tasks: &mut Vec<JoinHandle<()>>,
    ) -> Result<oneshot::Receiver<NavigationResponse>, CrawlError> {
        page.execute(SetUserAgentOverrideParams::new(self.user_agent.clone()))
            .await?;
        page.execute(NetworkEnableParams::default()).await?;
        page.execute(FetchEnableParams::default()).await?;

        // Abort images, media, and fonts before they are fetched.
        {
            let mut paused = page.event_listener::<EventRequestPaused>().await?;
            let page = page.clone();
            tasks.push(tokio::spawn(async move {
                while let Some(event) = paused.next().await {
                    let request_id = event.request_id.clone();
                    let abort = matches!(
                        event.resource_type,
                        ResourceType::Image | ResourceType::Media | ResourceType::Font
                    );
                    let outcome = if abort {
                        page.execute(FailRequestParams::new(request_id, ErrorReason::Aborted))
                            .await
                            .map(|_| ())
                    } else {
                        page.execute(ContinueRequestParams::new(request_id))
                            .await
                            .map(|_| ())
                    };
                    if outcome.is_err() {
                        // Page is gone; the stream will end shortly.
                        break;
                    }
                }
            }));
        }

        // One task owns both navigation event streams so the redirect hops
        // of the document chain are recorded before the main response is
        // handed over. Every document response URL is also surfaced to the
        // frontier's seen set.
        let mut requests = page.event_listener::<EventRequestWillBeSent>().await?;
        let mut responses = page.event_listener::<EventResponseReceived>().await?;
        let (document_tx, document_rx) = oneshot::channel();
        {
            let log = Arc::clone(log);
            let observer = self.observer.clone();
            tasks.push(tokio::spawn(async move {
                let mut document_tx = Some(document_tx);
                loop {
                    tokio::select! {
                        request = requests.next() => {
                            let Some(event) = request else { break };
                            record_redirect(&event, &log, &observer);
                        }
                        response = responses.next() => {
                            let Some(event) = response else { break };
                            if event.r#type != ResourceType::Document {
                                continue;
                            }
                            if let Ok(observed) = Url::parse(&event.response.url) {
                                let _ = observer.send(observed);
                            }
                            if let Some(tx) = document_tx.take() {
                                // Redirect events for this navigation were
                                // emitted before its final response; drain
                                // any still buffered before the handover.
                                while let Some(Some(buffered)) = requests.next().now_or_never() {
                                    record_redirect(&buffered, &log, &observer);
                                }
                                let _ = tx.send(NavigationResponse {
                                    url: event.response.url.clone(),
                                    status: event.response.status as u16,
                                    headers: event.response.headers.inner().clone(),
                                    request_id: event.request_id.clone(),
                                });
                            }
                        }
                    }
                }
            }));
        }

        Ok(document_rx)
    }

    /// Close the browser process.
    pub async fn shutdown(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("Failed to close browser: {}", e);
        }
        self.handler_task.abort();
    }
}

/// A successfully navigated page, ready for extraction.
pub struct LoadedPage {
    page: Page,
    response: NavigationResponse,
    tasks: Vec<JoinHandle<()>>,
}

impl LoadedPage {
    /// The navigation's main document response.
    pub fn response(&self) -> &NavigationResponse {
        &self.response
    }

    /// Document title as reported by the browser.
    pub async fn title(&self) -> Result<Option<String>, CrawlError> {
        Ok(self.page.get_title().await?)
    }

    /// Full rendered HTML after script execution.
    pub async fn rendered_html(&self) -> Result<String, CrawlError> {
        Ok(self.page.content().await?)
    }

    /// Evaluate a script and deserialize its return value.
    pub async fn evaluate<T: DeserializeOwned>(&self, script: &str) -> Result<T, CrawlError> {
        let result = self.page.evaluate(script).await?;
        result
            .into_value::<T>()
            .map_err(|e| CrawlError::Extraction(format!("script result: {}", e)))
    }

    /// Raw response body of the main document.
    ///
    /// Returns None for binary bodies; the crawl only needs text (XML).
    pub async fn response_body(&self) -> Result<Option<String>, CrawlError> {
        let response = self
            .page
            .execute(GetResponseBodyParams::new(self.response.request_id.clone()))
            .await?;
        if response.result.base64_encoded {
            return Ok(None);
        }
        Ok(Some(response.result.body.clone()))
    }

    /// Close the page and stop its event tasks.
    pub async fn close(self) {
        for task in &self.tasks {
            task.abort();
        }
        if let Err(e) = self.page.close().await {
            debug!("Failed to close page: {}", e);
        }
    }
}

/// Remember the status of the first document redirect and mark its target
/// as seen.
fn record_redirect(
    event: &EventRequestWillBeSent,
    log: &Arc<Mutex<ResponseLog>>,
    observer: &UnboundedSender<Url>,
) {
    if event.r#type != Some(ResourceType::Document) {
        return;
    }
    let Some(redirect) = &event.redirect_response else {
        return;
    };
    {
        let mut log = log.lock();
        if log.redirect_status.is_none() {
            log.redirect_status = Some(redirect.status as u16);
        }
    }
    if let Ok(target) = Url::parse(&event.request.url) {
        let _ = observer.send(target);
    }
}

/// Wait for the document ready state, tolerating non-HTML pages.
async fn wait_for_page_ready(page: &Page) {
    match tokio::time::timeout(
        Duration::from_secs(10),
        page.evaluate(WAIT_FOR_READY_SCRIPT),
    )
    .await
    {
        Ok(Ok(result)) => {
            let state: String = result
                .into_value()
                .unwrap_or_else(|_| "unknown".to_string());
            debug!("Page ready state: {}", state);
        }
        Ok(Err(e)) => {
            debug!("Could not check ready state (possibly non-HTML page): {}", e);
        }
        Err(_) => {
            warn!("Timeout waiting for page ready state");
        }
    }
}

/// Tear down a page that will not be extracted.
async fn discard_page(page: Page, tasks: Vec<JoinHandle<()>>) {
    for task in &tasks {
        task.abort();
    }
    if let Err(e) = page.close().await {
        debug!("Failed to close discarded page: {}", e);
    }
}
