//! HTML helpers: title, plain text and link extraction
//!
//! # Link Extraction Rules
//!
//! **Include:** `<a href>` anywhere in the document, resolved against the
//! page URL, fragment removed.
//!
//! **Exclude:**
//! - fragment-only hrefs (`#section`)
//! - `javascript:`, `mailto:`, `tel:` and `data:` URIs
//! - `<a download>` links
//! - anything that is not HTTP(S) after resolution

use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Elements whose content never counts as page text
pub const SKIPPED_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "svg", "head", "nav", "footer", "aside",
];

/// Element depth below which structure is flattened to plain text
pub const MAX_NESTING_DEPTH: usize = 256;

/// An outbound anchor with its visible text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    pub url: String,
    pub text: String,
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

/// Joins an element's text nodes and collapses whitespace
pub fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Page title: the first non-empty `<title>`, else the first `<h1>`
pub fn extract_title(document: &Html) -> Option<String> {
    ["title", "h1"].into_iter().find_map(|css| {
        let sel = selector(css)?;
        document
            .select(&sel)
            .map(element_text)
            .find(|text| !text.is_empty())
    })
}

/// Visible text of the document with boilerplate regions removed
pub fn extract_text(document: &Html) -> String {
    let mut out = String::new();
    let root = selector("body")
        .and_then(|sel| document.select(&sel).next())
        .unwrap_or_else(|| document.root_element());
    push_text(root, &mut out);
    collapse_whitespace(&out)
}

/// Visible text of one element, boilerplate regions removed
pub fn visible_text(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    push_text(element, &mut out);
    collapse_whitespace(&out)
}

fn push_text(element: ElementRef<'_>, out: &mut String) {
    // Depth-first with an explicit stack; `None` closes an element
    let mut stack: Vec<_> = element.children().map(Some).collect();
    stack.reverse();

    while let Some(entry) = stack.pop() {
        let Some(node) = entry else {
            // Keep adjacent block texts from running together
            out.push(' ');
            continue;
        };
        if let Some(child_element) = ElementRef::wrap(node) {
            if SKIPPED_TAGS.contains(&child_element.value().name()) {
                continue;
            }
            stack.push(None);
            let start = stack.len();
            stack.extend(node.children().map(Some));
            stack[start..].reverse();
        } else if let Some(text) = node.value().as_text() {
            out.push_str(text);
        }
    }
}

/// Resolves an href to an absolute HTTP(S) URL without fragment
///
/// Returns None if the link should be excluded.
pub fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    let mut absolute = base_url.join(href).ok()?;
    if absolute.scheme() != "http" && absolute.scheme() != "https" {
        return None;
    }
    absolute.set_fragment(None);
    Some(absolute)
}

/// All anchors in document order, including duplicates
pub fn extract_anchors(document: &Html, base_url: &Url) -> Vec<Anchor> {
    let Some(sel) = selector("a[href]") else {
        return Vec::new();
    };

    document
        .select(&sel)
        .filter(|element| element.value().attr("download").is_none())
        .filter_map(|element| {
            let href = element.value().attr("href")?;
            let url = resolve_link(href, base_url)?;
            Some(Anchor {
                url: url.to_string(),
                text: element_text(element),
            })
        })
        .collect()
}

/// Absolute outbound links, de-duplicated, first occurrence wins
pub fn extract_links(document: &Html, base_url: &Url) -> Vec<String> {
    let mut seen = HashSet::new();
    extract_anchors(document, base_url)
        .into_iter()
        .filter_map(|anchor| seen.insert(anchor.url.clone()).then_some(anchor.url))
        .collect()
}
