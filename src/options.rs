//! Per-request options for scrape, crawl, map and batch operations
//!
//! Options arrive as a configuration object (camelCase keys) and are
//! validated before any job is queued.

use crate::config::CrawlerConfig;
use reqwest::header::{HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::time::Duration;

/// Upper bound accepted for `maxDepth`
pub const MAX_DEPTH_LIMIT: u32 = 10;

/// Upper bound accepted for `maxPages`
pub const MAX_PAGES_LIMIT: u32 = 10_000;

/// Which representation of the page goes into `CrawlResult.content`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractionMode {
    Html,
    Text,
    #[default]
    Markdown,
    MachineView,
}

/// Post-load wait condition; either form forces the rendering path
///
/// Numbers deserialize as a delay in milliseconds, strings as a CSS selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WaitFor {
    Delay(u64),
    Selector(String),
}

/// Options recognized by every engine operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScrapeOptions {
    pub extraction_mode: ExtractionMode,

    /// Defaults to `crawler.max-depth`
    pub max_depth: Option<u32>,

    /// Defaults to `crawler.max-pages`
    pub max_pages: Option<u32>,

    pub respect_robots_txt: bool,

    /// Seed the frontier with the origin's sitemap entries
    pub follow_sitemap: bool,

    /// Follow links outside the seed's registered domain
    pub follow_external_links: bool,

    /// Overrides the configured user agent
    pub user_agent: Option<String>,

    /// Overrides `crawler.request-timeout`
    pub timeout_ms: Option<u64>,

    pub wait_for: Option<WaitFor>,

    pub screenshot: bool,

    pub headers: BTreeMap<String, String>,

    pub cookies: BTreeMap<String, String>,
}

impl Default for ScrapeOptions {
    fn default() -> Self {
        Self {
            extraction_mode: ExtractionMode::default(),
            max_depth: None,
            max_pages: None,
            respect_robots_txt: true,
            follow_sitemap: false,
            follow_external_links: false,
            user_agent: None,
            timeout_ms: None,
            wait_for: None,
            screenshot: false,
            headers: BTreeMap::new(),
            cookies: BTreeMap::new(),
        }
    }
}

impl ScrapeOptions {
    /// Rejects malformed options before anything is queued
    pub fn validate(&self) -> crate::Result<()> {
        if let Some(depth) = self.max_depth {
            if depth > MAX_DEPTH_LIMIT {
                return Err(invalid(format!(
                    "maxDepth must be at most {}, got {}",
                    MAX_DEPTH_LIMIT, depth
                )));
            }
        }

        if let Some(pages) = self.max_pages {
            if pages == 0 || pages > MAX_PAGES_LIMIT {
                return Err(invalid(format!(
                    "maxPages must be between 1 and {}, got {}",
                    MAX_PAGES_LIMIT, pages
                )));
            }
        }

        if self.timeout_ms == Some(0) {
            return Err(invalid("timeoutMs must be greater than 0".to_string()));
        }

        if let Some(WaitFor::Selector(selector)) = &self.wait_for {
            if selector.trim().is_empty() {
                return Err(invalid("waitFor selector cannot be empty".to_string()));
            }
        }

        if let Some(agent) = &self.user_agent {
            if agent.trim().is_empty() || HeaderValue::from_str(agent).is_err() {
                return Err(invalid(format!("Invalid userAgent '{}'", agent)));
            }
        }

        for (name, value) in &self.headers {
            if HeaderName::from_bytes(name.as_bytes()).is_err() {
                return Err(invalid(format!("Invalid header name '{}'", name)));
            }
            if HeaderValue::from_str(value).is_err() {
                return Err(invalid(format!("Invalid value for header '{}'", name)));
            }
        }

        for name in self.cookies.keys() {
            if name.is_empty() || name.contains(|c: char| c == ';' || c == '=' || c.is_whitespace())
            {
                return Err(invalid(format!("Invalid cookie name '{}'", name)));
            }
        }

        Ok(())
    }

    /// Returns true when the page must be loaded through the renderer
    pub fn needs_rendering(&self) -> bool {
        self.wait_for.is_some() || self.screenshot
    }

    pub fn effective_max_depth(&self, config: &CrawlerConfig) -> u32 {
        self.max_depth.unwrap_or(config.max_depth)
    }

    pub fn effective_max_pages(&self, config: &CrawlerConfig) -> u32 {
        self.max_pages.unwrap_or(config.max_pages)
    }

    pub fn effective_timeout(&self, config: &CrawlerConfig) -> Duration {
        Duration::from_millis(self.timeout_ms.unwrap_or(config.request_timeout))
    }

    /// Cache key for a single-page fetch of `url` with these options
    pub fn page_cache_key(&self, url: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        hasher.update(b"\n");
        // BTreeMap fields keep the serialization stable
        hasher.update(serde_json::to_string(self).unwrap_or_default().as_bytes());
        format!("{}{}", crate::cache::PAGE_PREFIX, hex::encode(hasher.finalize()))
    }
}

fn invalid(message: String) -> crate::ArwError {
    crate::ArwError::Validation(message)
}
