//! `<meta>`, OpenGraph and JSON-LD extraction

use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// Page-level metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetadata {
    pub description: Option<String>,
    pub keywords: Vec<String>,
    pub canonical: Option<String>,
    pub language: Option<String>,
    /// `og:*` properties without the prefix
    pub open_graph: BTreeMap<String, String>,
    /// Remaining named `<meta>` tags (`name` or `http-equiv`), lowercased keys
    pub meta: BTreeMap<String, String>,
    /// Parsed `application/ld+json` blocks; unparseable blocks are skipped
    pub json_ld: Vec<serde_json::Value>,
}

/// Extracts standard and OpenGraph meta tags plus JSON-LD blocks
pub fn extract_metadata(document: &Html, base_url: &Url) -> PageMetadata {
    let mut metadata = PageMetadata::default();

    if let Ok(sel) = Selector::parse("meta[content]") {
        for element in document.select(&sel) {
            let attrs = element.value();
            let Some(content) = attrs.attr("content").map(str::trim) else {
                continue;
            };

            if let Some(property) = attrs.attr("property") {
                if let Some(key) = property.trim().strip_prefix("og:") {
                    metadata
                        .open_graph
                        .entry(key.to_string())
                        .or_insert_with(|| content.to_string());
                    continue;
                }
            }

            let Some(name) = attrs.attr("name").or_else(|| attrs.attr("http-equiv")) else {
                continue;
            };
            let name = name.trim().to_lowercase();

            match name.as_str() {
                "description" if metadata.description.is_none() => {
                    metadata.description = Some(content.to_string());
                }
                "keywords" if metadata.keywords.is_empty() => {
                    metadata.keywords = content
                        .split(',')
                        .map(str::trim)
                        .filter(|k| !k.is_empty())
                        .map(str::to_string)
                        .collect();
                }
                _ => {
                    metadata.meta.entry(name).or_insert_with(|| content.to_string());
                }
            }
        }
    }

    if metadata.description.is_none() {
        metadata.description = metadata.open_graph.get("description").cloned();
    }

    if let Ok(sel) = Selector::parse("link[rel='canonical'][href]") {
        metadata.canonical = document
            .select(&sel)
            .filter_map(|e| e.value().attr("href"))
            .find_map(|href| base_url.join(href.trim()).ok())
            .map(|u| u.to_string());
    }

    if let Ok(sel) = Selector::parse("html[lang]") {
        metadata.language = document
            .select(&sel)
            .next()
            .and_then(|e| e.value().attr("lang"))
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty());
    }

    if let Ok(sel) = Selector::parse("script[type='application/ld+json']") {
        for element in document.select(&sel) {
            let raw = element.text().collect::<String>();
            match serde_json::from_str::<serde_json::Value>(raw.trim()) {
                Ok(value) => metadata.json_ld.push(value),
                Err(e) => tracing::debug!(error = %e, "Skipping malformed JSON-LD block"),
            }
        }
    }

    metadata
}
