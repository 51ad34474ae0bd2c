//! Content extraction for a single page
//!
//! This module contains the fetch and extraction pipeline, including:
//! - Plain HTTP fetching with per-request overrides
//! - The WebDriver rendering fallback (wait conditions, screenshots)
//! - Title, text, markdown, link and metadata extraction
//!
//! HTML handling sits behind [`process_document`]; callers only see
//! [`CrawlResult`].

pub mod blocks;
mod fetcher;
pub mod html;
mod markdown;
mod metadata;
mod render;

pub use fetcher::{build_http_client, cookie_header, fetch_page, FetchedPage, MAX_REDIRECTS};
pub use markdown::blocks_to_markdown;
pub use metadata::{extract_metadata, PageMetadata};
pub use render::{PageRenderer, RenderedPage, WebDriverRenderer};

use crate::config::{Config, CrawlerConfig};
use crate::discovery::ArwInfo;
use crate::options::{ExtractionMode, ScrapeOptions};
use crate::transform::{transform_parsed, MachineView};
use crate::ArwError;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use reqwest::Client;
use scraper::Html;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;

/// One fetched and extracted page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlResult {
    pub url: String,
    /// Distance from the crawl seed; 0 outside crawls
    pub depth: u32,
    pub title: Option<String>,
    /// Representation selected by `extractionMode`
    pub content: String,
    /// Raw HTML, kept for HTML responses so the page can be re-transformed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    pub links: Vec<String>,
    pub metadata: PageMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arw: Option<ArwInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_view: Option<MachineView>,
    /// Base64 PNG
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    pub status_code: Option<u16>,
    pub content_type: Option<String>,
    /// Set when the page could not be fetched; other fields are empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub crawled_at: DateTime<Utc>,
}

impl CrawlResult {
    /// A result recording a failed fetch
    pub fn failed(url: &str, depth: u32, error: &ArwError) -> Self {
        Self {
            url: url.to_string(),
            depth,
            title: None,
            content: String::new(),
            html: None,
            links: Vec::new(),
            metadata: PageMetadata::default(),
            arw: None,
            machine_view: None,
            screenshot: None,
            status_code: error.status_code(),
            content_type: None,
            error: Some(error.to_string()),
            crawled_at: Utc::now(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Builds a result from a response body
///
/// HTML bodies go through full extraction; anything else is passed through
/// as content without links.
///
/// # Arguments
///
/// * `url` - Final URL of the page, used as the base for links
/// * `status_code` - HTTP status, if known
/// * `content_type` - Response content type, if known
/// * `body` - Response body
/// * `is_html` - Whether the body should be parsed as HTML
/// * `mode` - Which representation goes into `content`
pub fn process_document(
    url: &Url,
    status_code: Option<u16>,
    content_type: Option<String>,
    body: String,
    is_html: bool,
    mode: ExtractionMode,
) -> CrawlResult {
    let mut result = CrawlResult {
        url: url.to_string(),
        depth: 0,
        title: None,
        content: String::new(),
        html: None,
        links: Vec::new(),
        metadata: PageMetadata::default(),
        arw: None,
        machine_view: None,
        screenshot: None,
        status_code,
        content_type,
        error: None,
        crawled_at: Utc::now(),
    };

    if !is_html {
        result.content = body;
        return result;
    }

    let document = Html::parse_document(&body);
    result.title = html::extract_title(&document);
    result.links = html::extract_links(&document, url);
    result.metadata = extract_metadata(&document, url);
    let mut view_blocks = None;
    result.content = match mode {
        ExtractionMode::Html => body.clone(),
        ExtractionMode::Text => html::extract_text(&document),
        ExtractionMode::Markdown | ExtractionMode::MachineView => {
            let blocks = blocks::document_blocks(&document, url);
            let markdown = blocks_to_markdown(&blocks);
            view_blocks = (mode == ExtractionMode::MachineView).then_some(blocks);
            markdown
        }
    };

    // The view reuses the parse and the blocks behind the markdown
    if let Some(blocks) = &view_blocks {
        result.machine_view = Some(transform_parsed(&result, &document, blocks));
    }
    result.html = Some(body);

    result
}

/// Fetches pages and turns them into `CrawlResult`s
pub struct ContentExtractor {
    client: Client,
    renderer: Option<Arc<dyn PageRenderer>>,
    config: CrawlerConfig,
}

impl ContentExtractor {
    pub fn new(client: Client, renderer: Option<Arc<dyn PageRenderer>>, config: &Config) -> Self {
        Self {
            client,
            renderer,
            config: config.crawler.clone(),
        }
    }

    /// Extracts one page
    ///
    /// # Errors
    ///
    /// * `ArwError::Fetch` - network failure, timeout or non-2xx status
    /// * `ArwError::Render` - rendering was required but failed or no
    ///   renderer is configured
    pub async fn extract(&self, url: &Url, options: &ScrapeOptions) -> crate::Result<CrawlResult> {
        if options.needs_rendering() {
            return self.extract_rendered(url, options).await;
        }

        let timeout = options.effective_timeout(&self.config);
        let page = fetch_page(&self.client, url, options, timeout).await?;
        let is_html = page.is_html();

        Ok(process_document(
            &page.final_url,
            Some(page.status_code),
            page.content_type,
            page.body,
            is_html,
            options.extraction_mode,
        ))
    }

    async fn extract_rendered(
        &self,
        url: &Url,
        options: &ScrapeOptions,
    ) -> crate::Result<CrawlResult> {
        let renderer = self.renderer.as_ref().ok_or_else(|| ArwError::Render {
            url: url.to_string(),
            message: "no renderer configured (set renderer.webdriver-url)".to_string(),
        })?;

        tracing::debug!(url = %url, "Rendering page");
        let page = renderer.render(url, options).await?;

        let mut result = process_document(
            &page.final_url,
            None,
            Some("text/html".to_string()),
            page.html,
            true,
            options.extraction_mode,
        );
        result.screenshot = page
            .screenshot
            .map(|png| base64::engine::general_purpose::STANDARD.encode(png));
        Ok(result)
    }
}
