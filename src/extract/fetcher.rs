//! HTTP fetcher implementation
//!
//! This module handles the lightweight fetch path, including:
//! - Building the shared HTTP client with the crawler's user agent
//! - Per-request user agent, header and cookie overrides
//! - Error classification into `ArwError::Fetch`

use crate::config::Config;
use crate::options::ScrapeOptions;
use crate::ArwError;
use reqwest::header::{CONTENT_TYPE, COOKIE, USER_AGENT};
use reqwest::{redirect::Policy, Client};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

/// Maximum redirect hops before a fetch fails
pub const MAX_REDIRECTS: usize = 10;

/// A successfully fetched response body
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects
    pub final_url: Url,
    pub status_code: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl FetchedPage {
    pub fn is_html(&self) -> bool {
        match &self.content_type {
            Some(ct) => {
                let ct = ct.to_ascii_lowercase();
                ct.contains("text/html") || ct.contains("application/xhtml")
            }
            // Untyped responses are sniffed
            None => self.body.trim_start().starts_with('<'),
        }
    }
}

/// Builds an HTTP client with proper configuration
///
/// The client carries the configured user agent
/// (`CrawlerName/Version (+ContactURL; ContactEmail)`) and request timeout,
/// and follows at most [`MAX_REDIRECTS`] redirects.
///
/// # Arguments
///
/// * `config` - The crawler configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &Config) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.user_agent_string())
        .timeout(Duration::from_millis(config.crawler.request_timeout))
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Formats cookies as a single `Cookie` header value
pub fn cookie_header(cookies: &BTreeMap<String, String>) -> String {
    cookies
        .iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Fetches a page with a plain GET
///
/// # Errors
///
/// | Condition | Error |
/// |-----------|-------|
/// | Connection refused, DNS, TLS | `Fetch { status: None }` |
/// | Timeout | `Fetch { status: None }` |
/// | Non-2xx status | `Fetch { status: Some(code) }` |
/// | Body read failure | `Fetch { status: None }` |
pub async fn fetch_page(
    client: &Client,
    url: &Url,
    options: &ScrapeOptions,
    timeout: Duration,
) -> crate::Result<FetchedPage> {
    let mut request = client.get(url.clone()).timeout(timeout);

    if let Some(agent) = &options.user_agent {
        request = request.header(USER_AGENT, agent.as_str());
    }
    for (name, value) in &options.headers {
        request = request.header(name.as_str(), value.as_str());
    }
    if !options.cookies.is_empty() {
        request = request.header(COOKIE, cookie_header(&options.cookies));
    }

    let response = request
        .send()
        .await
        .map_err(|e| ArwError::fetch(url.as_str(), &e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(ArwError::Fetch {
            url: url.to_string(),
            status: Some(status.as_u16()),
            message: format!("HTTP {}", status),
        });
    }

    let final_url = response.url().clone();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let body = response
        .text()
        .await
        .map_err(|e| ArwError::fetch(url.as_str(), &e))?;

    tracing::debug!(url = %url, status = status.as_u16(), bytes = body.len(), "Fetched page");

    Ok(FetchedPage {
        final_url,
        status_code: status.as_u16(),
        content_type,
        body,
    })
}
