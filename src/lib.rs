//! ARW Crawler: crawl-and-discovery engine for the Agent-Ready Web
//!
//! This crate crawls websites, discovers their machine-readability documents
//! (`llms.txt`, `robots.txt`, `sitemap.xml`), extracts page content into
//! AI-consumable views, and schedules the work on a durable, bounded job queue
//! with caching and per-domain politeness.

pub mod cache;
pub mod config;
pub mod crawler;
pub mod discovery;
pub mod engine;
pub mod extract;
pub mod options;
pub mod queue;
pub mod state;
pub mod storage;
pub mod transform;
pub mod url;

use thiserror::Error;

/// Main error type for ARW crawler operations
#[derive(Debug, Error)]
pub enum ArwError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Network, timeout or HTTP status failure on a single page
    #[error("Fetch failed for {url}: {message}")]
    Fetch {
        url: String,
        status: Option<u16>,
        message: String,
    },

    /// The rendering fallback could not complete
    #[error("Render failed for {url}: {message}")]
    Render { url: String, message: String },

    /// One of the protocol documents could not be fetched or parsed
    #[error("Discovery failed for {url}: {message}")]
    Discovery { url: String, message: String },

    /// Malformed input URL or options, rejected before queueing
    #[error("Validation error: {0}")]
    Validation(String),

    /// Job-level retries exhausted
    #[error("Job {job_id} failed: {message}")]
    JobFailure { job_id: String, message: String },

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("URL disallowed by robots.txt: {url}")]
    RobotsDenied { url: String },

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ArwError {
    /// Builds a fetch error from a reqwest failure
    pub fn fetch(url: &str, error: &reqwest::Error) -> Self {
        let message = if error.is_timeout() {
            "Request timeout".to_string()
        } else if error.is_connect() {
            "Connection refused".to_string()
        } else {
            error.to_string()
        };

        Self::Fetch {
            url: url.to_string(),
            status: error.status().map(|s| s.as_u16()),
            message,
        }
    }

    /// Returns true for transport-level failures that are worth retrying
    ///
    /// HTTP status errors, validation errors and robots denials are permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Fetch { status, .. } => status.is_none() || matches!(status, Some(502..=504)),
            Self::Render { .. } => true,
            Self::Reqwest(e) => e.is_timeout() || e.is_connect(),
            Self::Storage(storage::StorageError::LockPoisoned) => true,
            Self::Io(_) => true,
            _ => false,
        }
    }

    /// HTTP status attached to a fetch failure, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Fetch { status, .. } => *status,
            _ => None,
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for ARW crawler operations
pub type Result<T> = std::result::Result<T, ArwError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use engine::ArwEngine;
pub use extract::{CrawlResult, PageMetadata};
pub use options::{ExtractionMode, ScrapeOptions, WaitFor};
pub use queue::{BatchJob, CancelOutcome, CrawlJob};
pub use state::JobStatus;
pub use transform::MachineView;
pub use url::{normalize_url, origin_of};
