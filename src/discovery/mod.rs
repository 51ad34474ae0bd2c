//! ARW discovery: `llms.txt`, `robots.txt` and `sitemap.xml` for an origin
//!
//! Discovery never fails. Each of the three documents is fetched
//! independently; a document that cannot be fetched or is not what it claims
//! to be is logged and left out of the result. Successful documents and the
//! assembled result are cached per origin for the discovery TTL.

mod llms;
mod robots;
mod sitemap;

pub use llms::{parse_llms_txt, LlmsSection, LlmsTxtData};
pub use robots::{is_allowed, parse_robots, product_token_of, RobotsGroup, RobotsTxtData};
pub use sitemap::{looks_like_sitemap, parse_sitemap, SitemapData, SitemapEntry, SITEMAP_PATHS};

use crate::cache::{TieredCache, DISCOVERY_PREFIX, DOCUMENT_PREFIX};
use crate::config::Config;
use crate::options::ScrapeOptions;
use crate::url::origin_of;
use crate::ArwError;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Per-origin protocol summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArwDiscoveryResult {
    pub origin: String,
    pub llms_txt: Option<LlmsTxtData>,
    pub robots_txt: Option<RobotsTxtData>,
    pub sitemap: Option<SitemapData>,
    pub discovered_at: DateTime<Utc>,
}

/// Discovery facts attached to each crawled page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArwInfo {
    pub has_llms_txt: bool,
    pub has_robots_txt: bool,
    pub has_sitemap: bool,
    pub allowed_by_robots: bool,
    pub crawl_delay_ms: Option<u64>,
}

impl ArwDiscoveryResult {
    /// Checks a URL against this origin's robots.txt
    pub fn is_allowed(&self, url: &Url, product_token: &str) -> bool {
        is_allowed(url, self.robots_txt.as_ref(), product_token)
    }

    /// robots.txt crawl delay for `product_token`
    pub fn crawl_delay(&self, product_token: &str) -> Option<Duration> {
        self.robots_txt
            .as_ref()
            .and_then(|r| r.crawl_delay_for(product_token))
    }

    /// Summary of the origin's documents as seen from one page
    pub fn info_for(&self, url: &Url, product_token: &str) -> ArwInfo {
        ArwInfo {
            has_llms_txt: self.llms_txt.is_some(),
            has_robots_txt: self.robots_txt.is_some(),
            has_sitemap: self.sitemap.is_some(),
            allowed_by_robots: self.is_allowed(url, product_token),
            crawl_delay_ms: self
                .crawl_delay(product_token)
                .map(|d| d.as_millis() as u64),
        }
    }

    /// Sitemap locations, in document order
    pub fn sitemap_urls(&self) -> impl Iterator<Item = &str> {
        self.sitemap
            .iter()
            .flat_map(|s| s.urls.iter().map(|e| e.loc.as_str()))
    }
}

/// Discovery service shared by every worker
pub struct ArwDiscovery {
    client: Client,
    cache: Arc<TieredCache>,
    ttl: Duration,
    product_token: String,
}

impl ArwDiscovery {
    /// Creates a discovery service
    ///
    /// # Arguments
    ///
    /// * `client` - HTTP client carrying the crawler's user agent
    /// * `cache` - Process-wide cache
    /// * `config` - Supplies the discovery TTL and the robots product token
    pub fn new(client: Client, cache: Arc<TieredCache>, config: &Config) -> Self {
        Self {
            client,
            cache,
            ttl: Duration::from_secs(config.cache.discovery_ttl),
            product_token: config.user_agent.product_token().to_string(),
        }
    }

    /// Agent name used for robots.txt matching
    pub fn product_token(&self) -> &str {
        &self.product_token
    }

    /// Agent name robots.txt is matched against for one request
    ///
    /// A `userAgent` override is identified by its own product token; without
    /// one the configured crawler name applies.
    pub fn robots_token<'a>(&'a self, options: &'a ScrapeOptions) -> &'a str {
        options
            .user_agent
            .as_deref()
            .map(product_token_of)
            .filter(|token| !token.is_empty())
            .unwrap_or(self.product_token.as_str())
    }

    /// Discovers the ARW documents for the origin of `url`
    pub async fn discover(&self, url: &Url) -> ArwDiscoveryResult {
        let origin = origin_of(url);
        let key = format!("{}{}", DISCOVERY_PREFIX, origin);

        if let Some(cached) = self.cached::<ArwDiscoveryResult>(&key) {
            tracing::trace!(origin = %origin, "Discovery cache hit");
            return cached;
        }

        tracing::debug!(origin = %origin, "Discovering ARW documents");
        let (llms_txt, robots_txt) = tokio::join!(self.llms_txt(&origin), self.robots_txt(&origin));
        let sitemap = self.sitemap(&origin, robots_txt.as_ref()).await;

        let result = ArwDiscoveryResult {
            origin: origin.clone(),
            llms_txt,
            robots_txt,
            sitemap,
            discovered_at: Utc::now(),
        };

        tracing::info!(
            origin = %origin,
            llms_txt = result.llms_txt.is_some(),
            robots_txt = result.robots_txt.is_some(),
            sitemap = result.sitemap.is_some(),
            "Discovery complete"
        );

        self.store(&key, &result);
        result
    }

    /// Drops every cached document for the origin of `url`
    pub fn invalidate(&self, url: &Url) -> crate::Result<()> {
        let origin = origin_of(url);
        self.cache
            .invalidate(&format!("{}{}", DISCOVERY_PREFIX, origin))?;
        for doc in ["llms", "robots", "sitemap"] {
            self.cache.invalidate(&document_key(doc, &origin))?;
        }
        Ok(())
    }

    async fn llms_txt(&self, origin: &str) -> Option<LlmsTxtData> {
        let key = document_key("llms", origin);
        if let Some(cached) = self.cached(&key) {
            return Some(cached);
        }

        let url = format!("{}/llms.txt", origin);
        let body = self.fetch_document(&url).await.ok()?;
        let data = parse_llms_txt(&url, &body);
        self.store(&key, &data);
        Some(data)
    }

    async fn robots_txt(&self, origin: &str) -> Option<RobotsTxtData> {
        let key = document_key("robots", origin);
        if let Some(cached) = self.cached(&key) {
            return Some(cached);
        }

        let url = format!("{}/robots.txt", origin);
        let body = self.fetch_document(&url).await.ok()?;
        let data = parse_robots(&url, &body, &self.product_token);
        self.store(&key, &data);
        Some(data)
    }

    async fn sitemap(&self, origin: &str, robots: Option<&RobotsTxtData>) -> Option<SitemapData> {
        let key = document_key("sitemap", origin);
        if let Some(cached) = self.cached(&key) {
            return Some(cached);
        }

        let well_known = SITEMAP_PATHS.iter().map(|path| format!("{}{}", origin, path));
        let from_robots = robots.and_then(|r| r.sitemaps.first().cloned());

        for url in well_known.chain(from_robots) {
            let Ok(body) = self.fetch_document(&url).await else {
                continue;
            };
            if !looks_like_sitemap(&body) {
                tracing::debug!(url = %url, "Ignoring response that is not a sitemap");
                continue;
            }

            let data = parse_sitemap(&url, &body);
            self.store(&key, &data);
            return Some(data);
        }

        None
    }

    /// Fetches a protocol document, failing on any non-success status
    async fn fetch_document(&self, url: &str) -> crate::Result<String> {
        let result = async {
            let response = self.client.get(url).send().await.map_err(|e| ArwError::Discovery {
                url: url.to_string(),
                message: e.to_string(),
            })?;

            let status = response.status();
            if !status.is_success() {
                return Err(ArwError::Discovery {
                    url: url.to_string(),
                    message: format!("HTTP {}", status.as_u16()),
                });
            }

            response.text().await.map_err(|e| ArwError::Discovery {
                url: url.to_string(),
                message: e.to_string(),
            })
        }
        .await;

        if let Err(e) = &result {
            tracing::debug!(error = %e, "Discovery document unavailable");
        }
        result
    }

    fn cached<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.cache.get(key) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, error = %e, "Cache read failed");
                None
            }
        }
    }

    fn store<T: Serialize>(&self, key: &str, value: &T) {
        if let Err(e) = self.cache.set(key, value, self.ttl) {
            tracing::warn!(key, error = %e, "Cache write failed");
        }
    }
}

fn document_key(doc: &str, origin: &str) -> String {
    format!("{}{}:{}", DOCUMENT_PREFIX, doc, origin)
}
