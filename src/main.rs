//! ARW Crawler main entry point
//!
//! Command-line wrapper over the in-process engine. Every command prints
//! its result as JSON on stdout; logs go to stderr.

use anyhow::{bail, Context};
use arw_crawler::config::{load_config_with_hash, Config};
use arw_crawler::queue::{CancelOutcome, Job};
use arw_crawler::{ArwEngine, ExtractionMode, ScrapeOptions, WaitFor};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// ARW Crawler: crawl sites and discover their Agent-Ready Web documents
#[derive(Parser, Debug)]
#[command(name = "arw-crawler")]
#[command(version)]
#[command(about = "Crawl-and-discovery engine for the Agent-Ready Web", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (defaults apply when omitted)
    #[arg(short, long, value_name = "CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch and extract a single page
    Scrape {
        url: String,
        #[command(flatten)]
        options: OptionArgs,
    },
    /// Queue a breadth-first crawl and wait for it to finish
    Crawl {
        url: String,
        #[command(flatten)]
        options: OptionArgs,
        /// Status polling interval in milliseconds
        #[arg(long, default_value_t = 500)]
        poll_interval: u64,
    },
    /// List the pages reachable from a URL
    Map {
        url: String,
        #[command(flatten)]
        options: OptionArgs,
    },
    /// Scrape several URLs as one job
    Batch {
        #[arg(required = true)]
        urls: Vec<String>,
        #[command(flatten)]
        options: OptionArgs,
        /// Status polling interval in milliseconds
        #[arg(long, default_value_t = 500)]
        poll_interval: u64,
    },
    /// Fetch llms.txt, robots.txt and sitemap.xml for a site
    Discover { url: String },
    /// Show queue and cache counters
    Stats,
    /// Remove every cached discovery document and page
    ClearCache,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Mode {
    Html,
    Text,
    Markdown,
    MachineView,
}

impl From<Mode> for ExtractionMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Html => Self::Html,
            Mode::Text => Self::Text,
            Mode::Markdown => Self::Markdown,
            Mode::MachineView => Self::MachineView,
        }
    }
}

#[derive(Args, Debug)]
struct OptionArgs {
    /// Representation placed in `content`
    #[arg(long, value_enum, default_value = "markdown")]
    mode: Mode,

    #[arg(long)]
    max_depth: Option<u32>,

    #[arg(long)]
    max_pages: Option<u32>,

    /// Ignore robots.txt rules
    #[arg(long)]
    ignore_robots: bool,

    /// Seed the crawl with sitemap entries
    #[arg(long)]
    follow_sitemap: bool,

    /// Follow links to other sites
    #[arg(long)]
    follow_external: bool,

    #[arg(long)]
    user_agent: Option<String>,

    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Render the page and wait for this CSS selector
    #[arg(long, conflicts_with = "wait_ms")]
    wait_selector: Option<String>,

    /// Render the page and wait this many milliseconds after load
    #[arg(long)]
    wait_ms: Option<u64>,

    /// Render the page and capture a screenshot
    #[arg(long)]
    screenshot: bool,

    /// Extra request header, NAME=VALUE (repeatable)
    #[arg(long = "header", value_name = "NAME=VALUE")]
    headers: Vec<String>,

    /// Cookie, NAME=VALUE (repeatable)
    #[arg(long = "cookie", value_name = "NAME=VALUE")]
    cookies: Vec<String>,
}

impl OptionArgs {
    fn into_options(self) -> anyhow::Result<ScrapeOptions> {
        let wait_for = match (self.wait_selector, self.wait_ms) {
            (Some(selector), _) => Some(WaitFor::Selector(selector)),
            (None, Some(ms)) => Some(WaitFor::Delay(ms)),
            (None, None) => None,
        };

        Ok(ScrapeOptions {
            extraction_mode: self.mode.into(),
            max_depth: self.max_depth,
            max_pages: self.max_pages,
            respect_robots_txt: !self.ignore_robots,
            follow_sitemap: self.follow_sitemap,
            follow_external_links: self.follow_external,
            user_agent: self.user_agent,
            timeout_ms: self.timeout_ms,
            wait_for,
            screenshot: self.screenshot,
            headers: parse_pairs(&self.headers, "header")?,
            cookies: parse_pairs(&self.cookies, "cookie")?,
        })
    }
}

fn parse_pairs(pairs: &[String], what: &str) -> anyhow::Result<BTreeMap<String, String>> {
    pairs
        .iter()
        .map(|pair| match pair.split_once('=') {
            Some((name, value)) => Ok((name.trim().to_string(), value.to_string())),
            None => bail!("Invalid {} '{}', expected NAME=VALUE", what, pair),
        })
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            config
        }
        None => Config::default(),
    };

    let engine = ArwEngine::new(config).context("Failed to start engine")?;

    match cli.command {
        Command::Scrape { url, options } => {
            let result = engine.scrape(&url, &options.into_options()?).await?;
            print_json(&result)
        }
        Command::Crawl {
            url,
            options,
            poll_interval,
        } => {
            let id = engine.submit_crawl(&url, options.into_options()?)?;
            tracing::info!("Submitted crawl job {}", id);
            let job = wait_for_job(&engine, &id, poll_interval, |e, id| e.crawl_status(id)).await?;
            print_json(&job)
        }
        Command::Map { url, options } => {
            let pages = engine.map(&url, &options.into_options()?).await?;
            print_json(&pages)
        }
        Command::Batch {
            urls,
            options,
            poll_interval,
        } => {
            let id = engine.submit_batch(&urls, options.into_options()?)?;
            tracing::info!("Submitted batch job {}", id);
            let job = wait_for_job(&engine, &id, poll_interval, |e, id| e.batch_status(id)).await?;
            print_json(&job)
        }
        Command::Discover { url } => print_json(&engine.discover(&url).await?),
        Command::Stats => print_json(&engine.stats()?),
        Command::ClearCache => {
            let removed = engine.clear_cache()?;
            print_json(&serde_json::json!({ "removed": removed }))
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("arw_crawler=info,warn"),
            1 => EnvFilter::new("arw_crawler=debug,info"),
            2 => EnvFilter::new("arw_crawler=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Polls a job until it is terminal; Ctrl-C cancels it
async fn wait_for_job<J, F>(
    engine: &ArwEngine,
    id: &str,
    poll_interval: u64,
    status: F,
) -> anyhow::Result<J>
where
    J: Job,
    F: Fn(&ArwEngine, &str) -> arw_crawler::Result<J>,
{
    let interval = Duration::from_millis(poll_interval.max(10));
    let mut cancelled = false;

    loop {
        let job = status(engine, id)?;
        if job.status().is_terminal() {
            return Ok(job);
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = tokio::signal::ctrl_c(), if !cancelled => {
                tracing::warn!("Interrupted; cancelling job {}", id);
                if engine.cancel(id)? == CancelOutcome::Removed {
                    bail!("Job {} was cancelled before it started", id);
                }
                cancelled = true;
            }
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
