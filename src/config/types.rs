use serde::Deserialize;

/// Main configuration structure for the ARW crawler
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent", default)]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub renderer: RendererConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Default maximum depth from the seed URL
    #[serde(rename = "max-depth")]
    pub max_depth: u32,

    /// Default maximum number of results per crawl
    #[serde(rename = "max-pages")]
    pub max_pages: u32,

    /// Number of crawl jobs processed in parallel
    #[serde(rename = "max-concurrent-requests")]
    pub max_concurrent_requests: u32,

    /// Minimum time between requests to the same domain (milliseconds)
    #[serde(rename = "minimum-request-interval")]
    pub minimum_request_interval: u64,

    /// Sliding window length for per-domain request counting (milliseconds)
    #[serde(rename = "rate-window")]
    pub rate_window: u64,

    /// Maximum requests per domain inside one window
    #[serde(rename = "rate-window-max-requests")]
    pub rate_window_max_requests: u32,

    /// Default HTTP timeout (milliseconds)
    #[serde(rename = "request-timeout")]
    pub request_timeout: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_pages: 100,
            max_concurrent_requests: 5,
            minimum_request_interval: 250,
            rate_window: 1000,
            rate_window_max_requests: 4,
            request_timeout: 30_000,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Full user agent header value
    ///
    /// Format: `CrawlerName/Version (+ContactURL; ContactEmail)`
    pub fn user_agent_string(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }

    /// Product token matched against `User-agent:` lines in robots.txt
    pub fn product_token(&self) -> &str {
        &self.crawler_name
    }
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "ArwCrawler".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: "https://example.com/arw-crawler".to_string(),
            contact_email: "crawler@example.com".to_string(),
        }
    }
}

/// Durable store configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the SQLite database file (`:memory:` for a private in-memory store)
    #[serde(rename = "database-path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: "arw-crawler.db".to_string(),
        }
    }
}

/// Cache lifetimes and sizing
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL for discovery documents and results (seconds)
    #[serde(rename = "discovery-ttl")]
    pub discovery_ttl: u64,

    /// TTL for scraped pages (seconds)
    #[serde(rename = "page-ttl")]
    pub page_ttl: u64,

    /// Maximum entries held in the in-process tier
    #[serde(rename = "local-max-entries")]
    pub local_max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            discovery_ttl: 3600,
            page_ttl: 300,
            local_max_entries: 1000,
        }
    }
}

/// Job retry policy
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Attempts per job before it is marked failed
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// Base delay for exponential backoff between attempts (milliseconds)
    #[serde(rename = "backoff-base")]
    pub backoff_base: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: 2000,
        }
    }
}

/// Rendering fallback configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// WebDriver endpoint (e.g. `http://localhost:4444`); rendering is unavailable when unset
    #[serde(rename = "webdriver-url")]
    pub webdriver_url: Option<String>,

    /// Upper bound on waiting for a CSS selector (milliseconds)
    #[serde(rename = "selector-timeout")]
    pub selector_timeout: u64,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            webdriver_url: None,
            selector_timeout: 10_000,
        }
    }
}
