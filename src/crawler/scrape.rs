//! Single-page scraping with politeness and page caching

use crate::cache::TieredCache;
use crate::crawler::rate_limiter::{RateLimiter, RATE_LIMITED_COOLDOWN};
use crate::discovery::ArwDiscovery;
use crate::extract::{ContentExtractor, CrawlResult};
use crate::options::ScrapeOptions;
use crate::url::extract_domain;
use crate::ArwError;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Fetches one page the way a crawl would, outside of any crawl
pub struct PageScraper {
    extractor: Arc<ContentExtractor>,
    discovery: Arc<ArwDiscovery>,
    limiter: Arc<RateLimiter>,
    cache: Arc<TieredCache>,
    page_ttl: Duration,
}

impl PageScraper {
    pub fn new(
        extractor: Arc<ContentExtractor>,
        discovery: Arc<ArwDiscovery>,
        limiter: Arc<RateLimiter>,
        cache: Arc<TieredCache>,
        page_ttl: Duration,
    ) -> Self {
        Self {
            extractor,
            discovery,
            limiter,
            cache,
            page_ttl,
        }
    }

    /// Scrapes `url`, serving from the page cache when possible
    ///
    /// Rendered requests always go to the browser and are never cached.
    ///
    /// # Errors
    ///
    /// * `ArwError::RobotsDenied` - `respectRobotsTxt` is set and robots.txt
    ///   disallows the URL or the URL it redirected to
    /// * `ArwError::Fetch` / `ArwError::Render` - the page could not be loaded
    pub async fn scrape(&self, url: &Url, options: &ScrapeOptions) -> crate::Result<CrawlResult> {
        let cache_key = (!options.needs_rendering()).then(|| options.page_cache_key(url.as_str()));

        if let Some(key) = &cache_key {
            match self.cache.get::<CrawlResult>(key) {
                Ok(Some(cached)) => {
                    tracing::debug!(url = %url, "Page cache hit");
                    return Ok(cached);
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(url = %url, error = %e, "Page cache read failed"),
            }
        }

        let arw = self.discovery.discover(url).await;
        let product_token = self.discovery.robots_token(options);
        if options.respect_robots_txt && !arw.is_allowed(url, product_token) {
            return Err(ArwError::RobotsDenied {
                url: url.to_string(),
            });
        }

        let domain = extract_domain(url).unwrap_or_default();
        self.limiter.acquire(&domain, arw.crawl_delay(product_token)).await;

        let mut result = match self.extractor.extract(url, options).await {
            Ok(result) => result,
            Err(e) => {
                if e.status_code() == Some(429) {
                    self.limiter.penalize(&domain, RATE_LIMITED_COOLDOWN);
                }
                return Err(e);
            }
        };

        if options.respect_robots_txt {
            if let Ok(final_url) = Url::parse(&result.url) {
                if final_url != *url {
                    let target = self.discovery.discover(&final_url).await;
                    if !target.is_allowed(&final_url, product_token) {
                        tracing::debug!(url = %url, target = %final_url, "Redirected into a disallowed path");
                        return Err(ArwError::RobotsDenied {
                            url: final_url.to_string(),
                        });
                    }
                }
            }
        }
        result.arw = Some(arw.info_for(url, product_token));

        if let Some(key) = &cache_key {
            if let Err(e) = self.cache.set(key, &result, self.page_ttl) {
                tracing::warn!(url = %url, error = %e, "Page cache write failed");
            }
        }

        Ok(result)
    }
}
