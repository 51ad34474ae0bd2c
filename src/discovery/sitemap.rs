//! sitemap.xml parsing
//!
//! A tolerant string scan rather than a full XML parse: sitemaps in the wild
//! are frequently malformed, and only a handful of tags matter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Well-known sitemap locations, tried in order
pub const SITEMAP_PATHS: &[&str] = &["/sitemap.xml", "/sitemap_index.xml", "/sitemap-index.xml"];

/// One `<url>` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SitemapEntry {
    pub loc: String,
    pub lastmod: Option<String>,
    pub changefreq: Option<String>,
    pub priority: Option<f32>,
}

/// Parsed URL inventory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SitemapData {
    pub source_url: String,
    pub urls: Vec<SitemapEntry>,
    /// Child sitemaps listed by a sitemap index (not fetched)
    pub sitemaps: Vec<String>,
    pub parsed_at: DateTime<Utc>,
}

/// Parses a sitemap or sitemap index document
///
/// `<url>` blocks without a `<loc>` are skipped; missing optional fields are
/// left as `None`.
pub fn parse_sitemap(source_url: &str, xml: &str) -> SitemapData {
    let urls = blocks(xml, "url")
        .into_iter()
        .filter_map(|block| {
            let loc = tag_value(block, "loc")?;
            Some(SitemapEntry {
                loc,
                lastmod: tag_value(block, "lastmod"),
                changefreq: tag_value(block, "changefreq"),
                priority: tag_value(block, "priority").and_then(|p| p.parse().ok()),
            })
        })
        .collect();

    let sitemaps = blocks(xml, "sitemap")
        .into_iter()
        .filter_map(|block| tag_value(block, "loc"))
        .collect();

    SitemapData {
        source_url: source_url.to_string(),
        urls,
        sitemaps,
        parsed_at: Utc::now(),
    }
}

/// Returns true if the body looks like a sitemap at all
///
/// Servers that answer every path with an HTML page would otherwise be
/// accepted as an empty sitemap.
pub fn looks_like_sitemap(body: &str) -> bool {
    body.contains("<urlset") || body.contains("<sitemapindex")
}

/// Inner text of every `<tag>...</tag>` element, in document order
fn blocks<'a>(xml: &'a str, tag: &str) -> Vec<&'a str> {
    let open = format!("<{}", tag);
    let close = format!("</{}>", tag);
    let mut found = Vec::new();
    let mut rest = xml;

    while let Some(start) = rest.find(&open) {
        let after = &rest[start + open.len()..];

        // `<url` must not match `<urlset`
        let boundary = after
            .chars()
            .next()
            .map_or(false, |c| c == '>' || c.is_whitespace());
        if !boundary {
            rest = after;
            continue;
        }

        let Some(gt) = after.find('>') else {
            break;
        };
        let body = &after[gt + 1..];
        let Some(end) = body.find(&close) else {
            break;
        };

        found.push(&body[..end]);
        rest = &body[end + close.len()..];
    }

    found
}

fn tag_value(block: &str, tag: &str) -> Option<String> {
    let inner = blocks(block, tag).into_iter().next()?;
    let inner = inner.trim();
    let inner = inner
        .strip_prefix("<![CDATA[")
        .and_then(|s| s.strip_suffix("]]>"))
        .unwrap_or(inner);

    let value = decode_entities(inner.trim());
    (!value.is_empty()).then_some(value)
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
