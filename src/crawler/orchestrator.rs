//! Breadth-first crawl orchestration
//!
//! This module contains the crawl loop, which:
//! - Walks a FIFO frontier of `(url, depth)` from the seed
//! - Normalizes every URL before the visited check and before queueing
//! - Applies depth, page-count, domain-scope and robots.txt bounds, to
//!   redirect targets as well as to the URLs that were requested
//! - Paces fetches through the shared rate limiter
//! - Emits one result per fetched URL, error results included
//! - Checks for cancellation at every frontier pop

use crate::config::CrawlerConfig;
use crate::crawler::rate_limiter::{RateLimiter, RATE_LIMITED_COOLDOWN};
use crate::discovery::{ArwDiscovery, ArwDiscoveryResult};
use crate::extract::{ContentExtractor, CrawlResult};
use crate::options::ScrapeOptions;
use crate::url::{extract_domain, normalize_url, origin_of, same_registered_domain};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use url::Url;

/// Receives results as a crawl progresses and decides whether it continues
pub trait CrawlObserver: Send {
    /// Polled before every frontier pop
    fn is_cancelled(&mut self) -> bool {
        false
    }

    /// Called once per emitted result, in breadth-first order
    fn on_result(&mut self, result: &CrawlResult) -> crate::Result<()>;
}

/// Observer that only collects
#[derive(Debug, Default)]
pub struct NoopObserver;

impl CrawlObserver for NoopObserver {
    fn on_result(&mut self, _result: &CrawlResult) -> crate::Result<()> {
        Ok(())
    }
}

/// Outcome of one crawl run
#[derive(Debug, Clone, Default)]
pub struct CrawlSummary {
    pub results: Vec<CrawlResult>,
    /// True if the observer stopped the crawl early
    pub cancelled: bool,
}

/// Drives breadth-first crawls; shared by all workers
pub struct CrawlOrchestrator {
    extractor: Arc<ContentExtractor>,
    discovery: Arc<ArwDiscovery>,
    limiter: Arc<RateLimiter>,
    config: CrawlerConfig,
}

/// Per-crawl traversal state; never shared between jobs
struct Frontier {
    queue: VecDeque<(Url, u32)>,
    queued: HashSet<String>,
    visited: HashSet<String>,
}

impl Frontier {
    fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            queued: HashSet::new(),
            visited: HashSet::new(),
        }
    }

    /// Queues a URL unless it was already queued or visited
    fn push(&mut self, url: Url, depth: u32) -> bool {
        let key = url.as_str().to_string();
        if self.visited.contains(&key) || !self.queued.insert(key) {
            return false;
        }
        self.queue.push_back((url, depth));
        true
    }

    fn pop(&mut self) -> Option<(Url, u32)> {
        self.queue.pop_front()
    }

    /// Marks a URL visited; returns false if it already was
    fn visit(&mut self, url: &Url) -> bool {
        self.visited.insert(url.as_str().to_string())
    }
}

impl CrawlOrchestrator {
    pub fn new(
        extractor: Arc<ContentExtractor>,
        discovery: Arc<ArwDiscovery>,
        limiter: Arc<RateLimiter>,
        config: &CrawlerConfig,
    ) -> Self {
        Self {
            extractor,
            discovery,
            limiter,
            config: config.clone(),
        }
    }

    /// Crawls from `seed` until the frontier empties, `maxPages` results
    /// are emitted, or the observer cancels
    ///
    /// Page-level failures become error results. The only error returned is
    /// a transport failure on the seed itself (nothing was reachable), or a
    /// failure reported by the observer.
    ///
    /// # Arguments
    ///
    /// * `seed` - Starting URL
    /// * `options` - Validated request options
    /// * `observer` - Receives results and is polled for cancellation
    pub async fn crawl(
        &self,
        seed: &Url,
        options: &ScrapeOptions,
        observer: &mut dyn CrawlObserver,
    ) -> crate::Result<CrawlSummary> {
        let max_depth = options.effective_max_depth(&self.config);
        let max_pages = options.effective_max_pages(&self.config) as usize;
        let seed = normalize_url(seed.as_str())?;
        let product_token = self.discovery.robots_token(options).to_string();

        let mut frontier = Frontier::new();
        let mut origins: HashMap<String, ArwDiscoveryResult> = HashMap::new();
        let mut summary = CrawlSummary::default();

        frontier.push(seed.clone(), 0);

        if options.follow_sitemap && max_depth >= 1 {
            let arw = self.discover(&seed, &mut origins).await;
            let mut seeded = 0usize;
            for loc in arw.sitemap_urls() {
                let Ok(url) = normalize_url(loc) else {
                    continue;
                };
                if self.in_scope(&seed, &url, options) && frontier.push(url, 1) {
                    seeded += 1;
                }
            }
            tracing::debug!(seed = %seed, seeded, "Seeded frontier from sitemap");
        }

        while let Some((url, depth)) = frontier.pop() {
            if observer.is_cancelled() {
                tracing::info!(seed = %seed, emitted = summary.results.len(), "Crawl cancelled");
                summary.cancelled = true;
                break;
            }

            if summary.results.len() >= max_pages {
                break;
            }

            if depth > max_depth || !self.in_scope(&seed, &url, options) {
                continue;
            }

            let arw = self.discover(&url, &mut origins).await;
            if options.respect_robots_txt && !arw.is_allowed(&url, &product_token) {
                tracing::debug!(url = %url, "Disallowed by robots.txt");
                continue;
            }

            if !frontier.visit(&url) {
                continue;
            }

            let domain = extract_domain(&url).unwrap_or_default();
            self.limiter
                .acquire(&domain, arw.crawl_delay(&product_token))
                .await;

            let result = match self.extractor.extract(&url, options).await {
                Ok(mut page) => {
                    let final_url = normalize_url(&page.url).unwrap_or_else(|_| url.clone());
                    if final_url != url {
                        let target = RedirectTarget {
                            seed: &seed,
                            url: &final_url,
                            options,
                            product_token: &product_token,
                        };
                        if let Some(reason) =
                            self.reject_redirect(target, &mut frontier, &mut origins).await
                        {
                            tracing::debug!(url = %url, target = %final_url, reason, "Dropped redirected page");
                            continue;
                        }
                    }

                    page.depth = depth;
                    page.arw = Some(arw.info_for(&url, &product_token));

                    if depth < max_depth {
                        for link in &page.links {
                            let Ok(next) = normalize_url(link) else {
                                continue;
                            };
                            if self.in_scope(&seed, &next, options) {
                                frontier.push(next, depth + 1);
                            }
                        }
                    }
                    page
                }
                Err(e) => {
                    if depth == 0 && summary.results.is_empty() && e.is_transient() {
                        return Err(e);
                    }
                    if e.status_code() == Some(429) {
                        self.limiter.penalize(&domain, RATE_LIMITED_COOLDOWN);
                    }
                    tracing::warn!(url = %url, depth, error = %e, "Page failed");
                    let mut failed = CrawlResult::failed(url.as_str(), depth, &e);
                    failed.arw = Some(arw.info_for(&url, &product_token));
                    failed
                }
            };

            observer.on_result(&result)?;
            summary.results.push(result);
        }

        tracing::info!(
            seed = %seed,
            pages = summary.results.len(),
            cancelled = summary.cancelled,
            "Crawl finished"
        );
        Ok(summary)
    }

    /// Same registered domain as the seed unless external links are followed
    fn in_scope(&self, seed: &Url, url: &Url, options: &ScrapeOptions) -> bool {
        options.follow_external_links || same_registered_domain(seed, url)
    }

    /// Why a redirect target may not be emitted, if it may not
    ///
    /// An accepted target is marked visited.
    async fn reject_redirect(
        &self,
        target: RedirectTarget<'_>,
        frontier: &mut Frontier,
        origins: &mut HashMap<String, ArwDiscoveryResult>,
    ) -> Option<&'static str> {
        if !self.in_scope(target.seed, target.url, target.options) {
            return Some("out of scope");
        }
        if target.options.respect_robots_txt {
            let arw = self.discover(target.url, origins).await;
            if !arw.is_allowed(target.url, target.product_token) {
                return Some("disallowed by robots.txt");
            }
        }
        if !frontier.visit(target.url) {
            return Some("already visited");
        }
        None
    }

    async fn discover(
        &self,
        url: &Url,
        origins: &mut HashMap<String, ArwDiscoveryResult>,
    ) -> ArwDiscoveryResult {
        let origin = origin_of(url);
        if let Some(found) = origins.get(&origin) {
            return found.clone();
        }
        let result = self.discovery.discover(url).await;
        origins.insert(origin, result.clone());
        result
    }
}

struct RedirectTarget<'a> {
    seed: &'a Url,
    url: &'a Url,
    options: &'a ScrapeOptions,
    product_token: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frontier_deduplicates() {
        let mut frontier = Frontier::new();
        let a = Url::parse("https://example.com/a").unwrap();

        assert!(frontier.push(a.clone(), 0));
        assert!(!frontier.push(a.clone(), 1));

        let (popped, depth) = frontier.pop().unwrap();
        assert_eq!(depth, 0);
        assert!(frontier.visit(&popped));
        assert!(!frontier.visit(&popped));

        // Visited URLs are never queued again
        assert!(!frontier.push(a, 2));
        assert!(frontier.pop().is_none());
    }

    #[test]
    fn test_frontier_is_fifo() {
        let mut frontier = Frontier::new();
        for path in ["/1", "/2", "/3"] {
            frontier.push(Url::parse(&format!("https://example.com{}", path)).unwrap(), 1);
        }
        let order: Vec<String> = std::iter::from_fn(|| frontier.pop())
            .map(|(u, _)| u.path().to_string())
            .collect();
        assert_eq!(order, vec!["/1", "/2", "/3"]);
    }
}
