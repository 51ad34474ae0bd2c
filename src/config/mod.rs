//! Configuration module for the ARW crawler
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every section is optional; missing keys fall back to `Config::default()`.
//!
//! # Example
//!
//! ```no_run
//! use arw_crawler::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("arw-crawler.toml")).unwrap();
//! println!("Crawler will use max depth: {}", config.crawler.max_depth);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    CacheConfig, Config, CrawlerConfig, QueueConfig, RendererConfig, StorageConfig,
    UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
pub use validation::validate;
