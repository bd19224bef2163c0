//! Webharvest: crawl a site and stream extracted pages to indexing sinks.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use url::Url;

use webharvest::config::{Config, LogFormat, LoggingConfig};
use webharvest::crawl::{BrowserEngine, CrawlCoordinator, CrawlStats, Frontier, UrlFilter};
use webharvest::sink::{FileSink, IndexSink, SearchSink};

#[derive(Parser)]
#[command(name = "webharvest")]
#[command(about = "Crawl a site and stream extracted pages to indexing sinks")]
#[command(version)]
struct Cli {
    /// Root URLs to crawl
    #[arg(required_unless_present = "config")]
    roots: Vec<String>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output path for the JSON document sink
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Search backend endpoint; enables the search sink
    #[arg(long)]
    search_endpoint: Option<String>,

    /// Concurrent page extractions
    #[arg(short, long)]
    parallelism: Option<usize>,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if !cli.roots.is_empty() {
        config.crawler.root_urls = cli.roots.clone();
    }
    if let Some(parallelism) = cli.parallelism {
        config.crawler.degree_of_parallelism = parallelism;
    }
    if let Some(output) = &cli.output {
        config.file_sink.enabled = true;
        config.file_sink.path = output.clone();
    }
    if let Some(endpoint) = &cli.search_endpoint {
        config.search.enabled = true;
        config.search.endpoint = endpoint.clone();
    }
    config.validate()?;

    init_logging(&config.logging, cli.verbose)?;

    run_crawl(config).await
}

/// Configured level and format, with `-v` flags taking precedence.
fn init_logging(logging: &LoggingConfig, verbose: u8) -> Result<()> {
    let log_level = match verbose {
        0 => logging.level.as_tracing_level(),
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let builder = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false);
    match logging.format {
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish())?,
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
    }
    Ok(())
}

async fn run_crawl(config: Config) -> Result<()> {
    let roots: Vec<Url> = config
        .crawler
        .root_urls
        .iter()
        .map(|s| Url::parse(s))
        .collect::<Result<_, _>>()?;
    if roots.is_empty() {
        anyhow::bail!("No root URLs provided");
    }

    // Scope: host + www twin per root, plus any configured extras.
    let mut filters: Vec<UrlFilter> = Vec::new();
    for root in &roots {
        filters.extend(UrlFilter::for_root(root));
    }
    filters.extend(config.crawler.filters.iter().map(UrlFilter::from));
    for filter in &filters {
        info!("Scope: {}{}", filter.authority(), filter.path_prefix());
    }

    let frontier = Arc::new(Frontier::new(filters));

    // URLs observed as navigation responses or redirect targets go straight
    // into the seen set, never the queue.
    let (observer_tx, mut observer_rx) = tokio::sync::mpsc::unbounded_channel();
    let observer_frontier = Arc::clone(&frontier);
    let observer_task = tokio::spawn(async move {
        while let Some(url) = observer_rx.recv().await {
            observer_frontier.admit_seen(&url);
        }
    });

    let browser = Arc::new(
        BrowserEngine::launch(
            &config.browser,
            config.crawler.user_agent.clone(),
            Duration::from_secs(config.crawler.navigation_timeout_secs),
            observer_tx,
        )
        .await?,
    );

    let mut coordinator = CrawlCoordinator::new(
        roots,
        Arc::clone(&frontier),
        Arc::clone(&browser),
        config.crawler.degree_of_parallelism,
    );

    let file_sink = if config.file_sink.enabled {
        let sink = FileSink::create(&config.file_sink.path)?;
        coordinator.add_sink(Arc::new(sink.handle()) as Arc<dyn IndexSink>);
        Some(sink)
    } else {
        None
    };

    let search_sink = if config.search.enabled {
        let sink = SearchSink::start(config.search.clone());
        coordinator.add_sink(Arc::new(sink.handle()) as Arc<dyn IndexSink>);
        Some(sink)
    } else {
        None
    };

    // Run to exhaustion; an interrupt closes the frontier and lets in-flight
    // pages finish.
    let crawl_handle = coordinator.handle();
    let mut cancelled = false;
    let run_future = Arc::new(coordinator).run();
    tokio::pin!(run_future);
    let stats = loop {
        tokio::select! {
            result = &mut run_future => break result?,
            signal = tokio::signal::ctrl_c(), if !cancelled => {
                signal?;
                warn!("Interrupt received; finishing in-flight pages");
                cancelled = true;
                crawl_handle.stop();
            }
        }
    };

    if let Some(sink) = file_sink {
        if let Err(e) = sink.close().await {
            warn!("File sink failed: {}", e);
        }
    }
    if let Some(sink) = search_sink {
        // A cancelled run leaves the previous alias binding in place.
        let result = if cancelled {
            sink.abort().await
        } else {
            sink.close().await
        };
        if let Err(e) = result {
            warn!("Search sink failed: {}", e);
        }
    }

    match Arc::try_unwrap(browser) {
        Ok(browser) => browser.shutdown().await,
        Err(_) => warn!("Browser still referenced at shutdown"),
    }
    observer_task.abort();

    print_summary(&stats);
    Ok(())
}

fn print_summary(stats: &CrawlStats) {
    println!("\nCrawl complete!");
    println!("==================");
    println!("Pages crawled:      {}", stats.pages_crawled);
    println!("Pages failed:       {}", stats.pages_failed);
    println!("Redirects skipped:  {}", stats.redirects_skipped);
    println!("URLs discovered:    {}", stats.urls_discovered);
    println!("URLs out of scope:  {}", stats.urls_out_of_scope);
    println!("URLs seen:          {}", stats.urls_seen);
    println!("Avg page time:      {:.1}ms", stats.avg_page_ms());
}
