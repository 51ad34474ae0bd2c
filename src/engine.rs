//! In-process API over the crawl-and-discovery engine
//!
//! `ArwEngine` wires the components together and exposes the operations a
//! REST layer or the CLI calls: scrape, crawl (submit/status/cancel), map,
//! batch, discover, stats and cache clearing.

use crate::cache::{CacheStats, TieredCache};
use crate::config::{validate, Config};
use crate::crawler::{
    CrawlObserver, CrawlOrchestrator, MappedPage, NoopObserver, PageScraper, RateLimiter,
};
use crate::discovery::{ArwDiscovery, ArwDiscoveryResult};
use crate::extract::{build_http_client, ContentExtractor, CrawlResult, PageRenderer, WebDriverRenderer};
use crate::options::ScrapeOptions;
use crate::queue::{BatchJob, CancelOutcome, CrawlJob, QueueManager, QueueStats};
use crate::storage::open_storage;
use crate::url::parse_input_url;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Queue and cache counters
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStats {
    pub queues: QueueStats,
    pub cache: CacheStats,
    /// Domains the rate limiter has seen
    pub tracked_domains: usize,
}

pub struct ArwEngine {
    cache: Arc<TieredCache>,
    discovery: Arc<ArwDiscovery>,
    limiter: Arc<RateLimiter>,
    orchestrator: Arc<CrawlOrchestrator>,
    scraper: Arc<PageScraper>,
    queue: QueueManager,
}

impl ArwEngine {
    /// Builds the engine, using a WebDriver renderer if one is configured
    ///
    /// Must be called from within a tokio runtime: the queue workers start
    /// immediately and unfinished jobs in the store are resumed.
    pub fn new(config: Config) -> crate::Result<Self> {
        let renderer = WebDriverRenderer::from_config(&config.renderer)
            .map(|r| Arc::new(r) as Arc<dyn PageRenderer>);
        Self::with_renderer(config, renderer)
    }

    /// Builds the engine with an explicit rendering backend
    pub fn with_renderer(
        config: Config,
        renderer: Option<Arc<dyn PageRenderer>>,
    ) -> crate::Result<Self> {
        validate(&config)?;
        let storage = open_storage(Path::new(&config.storage.database_path))?;
        let cache = Arc::new(TieredCache::new(
            Arc::clone(&storage),
            config.cache.local_max_entries,
        ));
        let client = build_http_client(&config)?;

        let discovery = Arc::new(ArwDiscovery::new(client.clone(), Arc::clone(&cache), &config));
        let extractor = Arc::new(ContentExtractor::new(client, renderer, &config));
        let limiter = Arc::new(RateLimiter::new(&config.crawler));

        let orchestrator = Arc::new(CrawlOrchestrator::new(
            Arc::clone(&extractor),
            Arc::clone(&discovery),
            Arc::clone(&limiter),
            &config.crawler,
        ));
        let scraper = Arc::new(PageScraper::new(
            extractor,
            Arc::clone(&discovery),
            Arc::clone(&limiter),
            Arc::clone(&cache),
            Duration::from_secs(config.cache.page_ttl),
        ));

        let queue = QueueManager::new(
            storage,
            Arc::clone(&orchestrator),
            Arc::clone(&scraper),
            &config,
        )?;

        tracing::info!(
            database = %config.storage.database_path,
            workers = config.crawler.max_concurrent_requests,
            "Engine started"
        );

        Ok(Self {
            cache,
            discovery,
            limiter,
            orchestrator,
            scraper,
            queue,
        })
    }

    /// Scrapes a single page
    pub async fn scrape(&self, url: &str, options: &ScrapeOptions) -> crate::Result<CrawlResult> {
        let url = parse_input_url(url)?;
        options.validate()?;
        self.scraper.scrape(&url, options).await
    }

    /// Queues a crawl and returns its job ID
    pub fn submit_crawl(&self, url: &str, options: ScrapeOptions) -> crate::Result<String> {
        self.queue.submit_crawl(url, options)
    }

    pub fn crawl_status(&self, job_id: &str) -> crate::Result<CrawlJob> {
        self.queue.status(job_id)
    }

    /// Cancels a crawl or batch job
    ///
    /// Cancelling a finished job is a no-op.
    pub fn cancel(&self, job_id: &str) -> crate::Result<CancelOutcome> {
        self.queue.cancel(job_id)
    }

    /// Crawls without queueing and lists the pages reached, in BFS order
    ///
    /// Pages that failed to load are left out.
    pub async fn map(&self, url: &str, options: &ScrapeOptions) -> crate::Result<Vec<MappedPage>> {
        let seed = parse_input_url(url)?;
        options.validate()?;

        let summary = self
            .orchestrator
            .crawl(&seed, options, &mut NoopObserver)
            .await?;

        Ok(summary
            .results
            .iter()
            .filter(|r| !r.is_error())
            .map(MappedPage::from)
            .collect())
    }

    /// Queues independent scrapes of `urls` and returns the job ID
    pub fn submit_batch(&self, urls: &[String], options: ScrapeOptions) -> crate::Result<String> {
        self.queue.submit_batch(urls, options)
    }

    pub fn batch_status(&self, job_id: &str) -> crate::Result<BatchJob> {
        self.queue.status(job_id)
    }

    /// Runs ARW discovery for the origin of `url`
    pub async fn discover(&self, url: &str) -> crate::Result<ArwDiscoveryResult> {
        let url = parse_input_url(url)?;
        Ok(self.discovery.discover(&url).await)
    }

    pub fn stats(&self) -> crate::Result<EngineStats> {
        Ok(EngineStats {
            queues: self.queue.stats()?,
            cache: self.cache.stats()?,
            tracked_domains: self.limiter.tracked_domains(),
        })
    }

    /// Drops every cached discovery document and page; returns entries removed
    pub fn clear_cache(&self) -> crate::Result<u64> {
        self.cache.clear()
    }

    /// Crawls in the background and streams results as they are produced
    ///
    /// Dropping the receiver stops the crawl at its next frontier pop.
    pub fn crawl_stream(
        &self,
        url: &str,
        options: ScrapeOptions,
    ) -> crate::Result<mpsc::UnboundedReceiver<CrawlResult>> {
        let seed = parse_input_url(url)?;
        options.validate()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let orchestrator = Arc::clone(&self.orchestrator);
        tokio::spawn(async move {
            let mut observer = ChannelObserver { tx };
            if let Err(e) = orchestrator.crawl(&seed, &options, &mut observer).await {
                tracing::warn!(url = %seed, error = %e, "Streaming crawl failed");
            }
        });
        Ok(rx)
    }
}

struct ChannelObserver {
    tx: mpsc::UnboundedSender<CrawlResult>,
}

impl CrawlObserver for ChannelObserver {
    fn is_cancelled(&mut self) -> bool {
        self.tx.is_closed()
    }

    fn on_result(&mut self, result: &CrawlResult) -> crate::Result<()> {
        // A closed channel is noticed at the next pop
        let _ = self.tx.send(result.clone());
        Ok(())
    }
}
