//! Crawl orchestration and politeness
//!
//! This module contains the multi-page crawl logic, including:
//! - The shared per-domain rate limiter
//! - Breadth-first traversal with depth, page and scope bounds
//! - Cached single-page scrapes for `scrape` and batch jobs
//! - Cancellation and incremental result delivery through observers

mod orchestrator;
mod rate_limiter;
mod scrape;

pub use orchestrator::{CrawlObserver, CrawlOrchestrator, CrawlSummary, NoopObserver};
pub use rate_limiter::{RateLimiter, RATE_LIMITED_COOLDOWN};
pub use scrape::PageScraper;

use crate::extract::CrawlResult;
use serde::{Deserialize, Serialize};

/// Lightweight entry returned by site mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappedPage {
    pub url: String,
    pub depth: u32,
    pub title: Option<String>,
    pub status_code: Option<u16>,
}

impl From<&CrawlResult> for MappedPage {
    fn from(result: &CrawlResult) -> Self {
        Self {
            url: result.url.clone(),
            depth: result.depth,
            title: result.title.clone(),
            status_code: result.status_code,
        }
    }
}
