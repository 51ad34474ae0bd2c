//! robots.txt parsing and permission checks
//!
//! The structured parse keeps the per-agent groups, sitemap references and
//! crawl delay. Allow/disallow decisions are delegated to the `robotstxt`
//! matcher, which implements the standard precedence rules.

use chrono::{DateTime, Utc};
use robotstxt::DefaultMatcher;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// One `User-agent` group and its path rules
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RobotsGroup {
    /// Lowercased agent names the group applies to
    pub user_agents: Vec<String>,
    pub allow: Vec<String>,
    pub disallow: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crawl_delay_ms: Option<u64>,
}

impl RobotsGroup {
    fn is_wildcard(&self) -> bool {
        self.user_agents.iter().any(|ua| ua == "*")
    }

    /// Whether a `User-agent` line of this group names `product_token`
    fn names(&self, product_token: &str) -> bool {
        let token = product_token_of(product_token);
        !token.is_empty()
            && self
                .user_agents
                .iter()
                .any(|ua| product_token_of(ua).eq_ignore_ascii_case(token))
    }
}

/// Parsed crawl-permission document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RobotsTxtData {
    pub source_url: String,
    pub raw: String,
    pub groups: Vec<RobotsGroup>,
    pub sitemaps: Vec<String>,
    /// Crawl delay applying to this crawler, in milliseconds
    pub crawl_delay_ms: Option<u64>,
    pub parsed_at: DateTime<Utc>,
}

impl RobotsTxtData {
    /// Crawl delay as a duration
    pub fn crawl_delay(&self) -> Option<Duration> {
        self.crawl_delay_ms.map(Duration::from_millis)
    }

    /// Crawl delay for an arbitrary agent
    pub fn crawl_delay_for(&self, product_token: &str) -> Option<Duration> {
        delay_for(&self.groups, product_token).map(Duration::from_millis)
    }
}

/// Leading product token of a user agent string (`ArwBot/1.0 (...)` gives
/// `ArwBot`)
///
/// Only letters, `_` and `-` count, the same rule the allow/disallow matcher
/// applies to `User-agent` lines.
pub fn product_token_of(agent: &str) -> &str {
    let agent = agent.trim();
    let end = agent
        .find(|c: char| !(c.is_ascii_alphabetic() || c == '_' || c == '-'))
        .unwrap_or(agent.len());
    &agent[..end]
}

/// Agent-specific delay if a group names the agent, else the wildcard one
fn delay_for(groups: &[RobotsGroup], product_token: &str) -> Option<u64> {
    let specific = groups
        .iter()
        .filter(|g| g.names(product_token))
        .find_map(|g| g.crawl_delay_ms);
    specific.or_else(|| {
        groups
            .iter()
            .filter(|g| g.is_wildcard())
            .find_map(|g| g.crawl_delay_ms)
    })
}

/// Parses a robots.txt body
///
/// `User-agent` lines that follow each other share one group; any other
/// directive closes the run so the next `User-agent` opens a new group.
/// `Crawl-delay` is kept on its group; the top-level delay is the one for
/// `product_token`, where an agent-specific delay wins over the wildcard one.
/// Unknown directives and malformed values are skipped.
///
/// # Arguments
///
/// * `source_url` - Where the document was fetched from
/// * `raw` - The document body
/// * `product_token` - This crawler's agent name
pub fn parse_robots(source_url: &str, raw: &str, product_token: &str) -> RobotsTxtData {
    let mut groups: Vec<RobotsGroup> = Vec::new();
    let mut sitemaps = Vec::new();
    let mut in_agent_run = false;

    for line in raw.lines() {
        let line = line.split('#').next().unwrap_or("").trim();
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = value.trim();

        match key.as_str() {
            "user-agent" => {
                if value.is_empty() {
                    continue;
                }
                if !in_agent_run || groups.is_empty() {
                    groups.push(RobotsGroup::default());
                }
                if let Some(group) = groups.last_mut() {
                    group.user_agents.push(value.to_lowercase());
                }
                in_agent_run = true;
            }
            "allow" | "disallow" => {
                in_agent_run = false;
                // An empty Disallow means "allow everything" and adds no rule
                if value.is_empty() {
                    continue;
                }
                if let Some(group) = groups.last_mut() {
                    if key == "allow" {
                        group.allow.push(value.to_string());
                    } else {
                        group.disallow.push(value.to_string());
                    }
                }
            }
            "crawl-delay" => {
                in_agent_run = false;
                let Some(delay_ms) = parse_delay_ms(value) else {
                    continue;
                };
                if let Some(group) = groups.last_mut() {
                    group.crawl_delay_ms.get_or_insert(delay_ms);
                }
            }
            "sitemap" => {
                if !value.is_empty() {
                    sitemaps.push(value.to_string());
                }
            }
            _ => {
                in_agent_run = false;
            }
        }
    }

    let crawl_delay_ms = delay_for(&groups, product_token);
    RobotsTxtData {
        source_url: source_url.to_string(),
        raw: raw.to_string(),
        groups,
        sitemaps,
        crawl_delay_ms,
        parsed_at: Utc::now(),
    }
}

fn parse_delay_ms(value: &str) -> Option<u64> {
    let secs: f64 = value.parse().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Some((secs * 1000.0).round() as u64)
}

/// Checks whether `url` may be fetched by `product_token`
///
/// A full user agent string is reduced to its product token first.
/// Longest matching pattern wins and `Allow` beats `Disallow` on ties.
/// Without a robots.txt everything is allowed.
pub fn is_allowed(url: &Url, robots: Option<&RobotsTxtData>, product_token: &str) -> bool {
    let Some(robots) = robots else {
        return true;
    };
    if robots.raw.trim().is_empty() {
        return true;
    }

    let token = match product_token_of(product_token) {
        "" => product_token,
        token => token,
    };
    let mut matcher = DefaultMatcher::default();
    matcher.one_agent_allowed_by_robots(&robots.raw, token, url.as_str())
}
