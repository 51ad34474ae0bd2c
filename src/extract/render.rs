//! Rendering fallback for pages that need a browser
//!
//! Rendering is an external capability reached over WebDriver. The
//! extractor only uses it when the caller asks for a wait condition or a
//! screenshot.

use crate::config::RendererConfig;
use crate::options::{ScrapeOptions, WaitFor};
use crate::ArwError;
use async_trait::async_trait;
use fantoccini::cookies::Cookie;
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::{json, Map, Value};
use std::time::Duration;
use url::Url;

/// Final state of a rendered page
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub final_url: Url,
    pub html: String,
    /// PNG bytes when a screenshot was requested
    pub screenshot: Option<Vec<u8>>,
}

/// A browser-backed page loader
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, url: &Url, options: &ScrapeOptions) -> crate::Result<RenderedPage>;
}

/// Renders pages through a WebDriver endpoint (chromedriver, geckodriver)
pub struct WebDriverRenderer {
    webdriver_url: String,
    selector_timeout: Duration,
}

impl WebDriverRenderer {
    pub fn new(webdriver_url: impl Into<String>, selector_timeout: Duration) -> Self {
        Self {
            webdriver_url: webdriver_url.into(),
            selector_timeout,
        }
    }

    /// Builds a renderer if `renderer.webdriver-url` is configured
    pub fn from_config(config: &RendererConfig) -> Option<Self> {
        config.webdriver_url.as_ref().map(|url| {
            Self::new(url.clone(), Duration::from_millis(config.selector_timeout))
        })
    }

    fn capabilities(options: &ScrapeOptions) -> Map<String, Value> {
        let mut args = vec![json!("--headless"), json!("--disable-gpu")];
        if let Some(agent) = &options.user_agent {
            args.push(json!(format!("--user-agent={}", agent)));
        }

        let mut caps = Map::new();
        caps.insert("goog:chromeOptions".to_string(), json!({ "args": args }));
        caps.insert(
            "moz:firefoxOptions".to_string(),
            json!({ "args": ["-headless"] }),
        );
        caps
    }

    async fn connect(&self, url: &Url, options: &ScrapeOptions) -> crate::Result<Client> {
        let mut builder = ClientBuilder::rustls().map_err(|e| render_error(url, e))?;
        builder.capabilities(Self::capabilities(options));
        builder
            .connect(&self.webdriver_url)
            .await
            .map_err(|e| render_error(url, e))
    }

    async fn drive(
        &self,
        client: &Client,
        url: &Url,
        options: &ScrapeOptions,
    ) -> crate::Result<RenderedPage> {
        client
            .goto(url.as_str())
            .await
            .map_err(|e| render_error(url, e))?;

        // Cookies can only be set once the browser is on the origin
        if !options.cookies.is_empty() {
            for (name, value) in &options.cookies {
                client
                    .add_cookie(Cookie::new(name.clone(), value.clone()))
                    .await
                    .map_err(|e| render_error(url, e))?;
            }
            client
                .goto(url.as_str())
                .await
                .map_err(|e| render_error(url, e))?;
        }

        if !options.headers.is_empty() {
            tracing::debug!(
                url = %url,
                count = options.headers.len(),
                "WebDriver sessions cannot set request headers; skipping"
            );
        }

        match &options.wait_for {
            Some(WaitFor::Selector(selector)) => {
                let waited = client
                    .wait()
                    .at_most(self.selector_timeout)
                    .for_element(Locator::Css(selector.as_str()))
                    .await;
                if let Err(e) = waited {
                    tracing::warn!(url = %url, selector = %selector, error = %e, "Selector did not appear");
                }
            }
            Some(WaitFor::Delay(ms)) => {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
            }
            None => {}
        }

        let html = client.source().await.map_err(|e| render_error(url, e))?;
        let final_url = client
            .current_url()
            .await
            .unwrap_or_else(|_| url.clone());

        let screenshot = if options.screenshot {
            Some(client.screenshot().await.map_err(|e| render_error(url, e))?)
        } else {
            None
        };

        Ok(RenderedPage {
            final_url,
            html,
            screenshot,
        })
    }
}

#[async_trait]
impl PageRenderer for WebDriverRenderer {
    async fn render(&self, url: &Url, options: &ScrapeOptions) -> crate::Result<RenderedPage> {
        let client = self.connect(url, options).await?;
        let result = self.drive(&client, url, options).await;

        if let Err(e) = client.close().await {
            tracing::debug!(url = %url, error = %e, "Failed to close WebDriver session");
        }

        result
    }
}

fn render_error(url: &Url, error: impl std::fmt::Display) -> ArwError {
    ArwError::Render {
        url: url.to_string(),
        message: error.to_string(),
    }
}
