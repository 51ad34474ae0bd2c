//! Machine View Transformer
//!
//! Converts an extracted page into a structured, section-oriented view for
//! automated consumers. The transform is pure: no I/O, no failure modes.
//! Section order always follows document order, so consumers can chunk the
//! view at heading boundaries using the heading anchors.

use crate::extract::blocks::{document_blocks, Block, Inline, ListItem};
use crate::extract::html::extract_anchors;
use crate::extract::CrawlResult;
use crate::url::{classify_link, LinkScope};
use scraper::Html;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use url::Url;

/// Paragraphs that make up the summary
pub const SUMMARY_PARAGRAPHS: usize = 3;

/// Summary length cap in characters
pub const SUMMARY_MAX_CHARS: usize = 500;

/// A typed piece of the page, in document order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Section {
    Heading {
        level: u8,
        text: String,
        /// Slug usable as a chunk id; unique within the view
        anchor: String,
    },
    Paragraph {
        text: String,
    },
    List {
        ordered: bool,
        items: Vec<String>,
    },
    Code {
        language: Option<String>,
        content: String,
    },
    Table {
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
    },
}

impl Section {
    /// Plain text of the section
    pub fn text(&self) -> String {
        match self {
            Self::Heading { text, .. } | Self::Paragraph { text } => text.clone(),
            Self::List { items, .. } => items.join("\n"),
            Self::Code { content, .. } => content.clone(),
            Self::Table { headers, rows } => std::iter::once(headers)
                .chain(rows.iter())
                .filter(|r| !r.is_empty())
                .map(|r| r.join(" | "))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// An outbound link with its scope relative to the page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedLink {
    pub url: String,
    pub text: String,
    pub scope: LinkScope,
}

/// Metadata carried into the view
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewMetadata {
    pub language: Option<String>,
    pub canonical: Option<String>,
    pub keywords: Vec<String>,
    pub open_graph: BTreeMap<String, String>,
    /// JSON-LD payloads
    pub structured_data: Vec<serde_json::Value>,
    pub word_count: usize,
}

/// AI-oriented view of one page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineView {
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    /// Main text, one section per paragraph
    pub content: String,
    pub sections: Vec<Section>,
    pub links: Vec<ClassifiedLink>,
    pub metadata: ViewMetadata,
    pub summary: String,
}

/// Builds the machine view of a page
///
/// Pages with stored HTML are re-parsed; other results fall back to their
/// text content split into paragraphs.
pub fn transform(result: &CrawlResult) -> MachineView {
    let base = Url::parse(&result.url).ok();

    match (&result.html, &base) {
        (Some(html), Some(base)) => {
            let document = Html::parse_document(html);
            let blocks = document_blocks(&document, base);
            transform_parsed(result, &document, &blocks)
        }
        _ => {
            let sections = result
                .content
                .split("\n\n")
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(|p| Section::Paragraph { text: p.to_string() })
                .collect();
            let anchors = result
                .links
                .iter()
                .map(|l| (l.clone(), String::new()))
                .collect();
            let links = base.as_ref().map(|b| classify(b, anchors)).unwrap_or_default();
            assemble(result, sections, links)
        }
    }
}

/// Builds the machine view from the document and blocks extraction already
/// produced for `result`
pub fn transform_parsed(result: &CrawlResult, document: &Html, blocks: &[Block]) -> MachineView {
    let sections = sections_from_blocks(blocks);
    let links = match Url::parse(&result.url) {
        Ok(base) => {
            let anchors = extract_anchors(document, &base)
                .into_iter()
                .map(|a| (a.url, a.text))
                .collect();
            classify(&base, anchors)
        }
        Err(_) => Vec::new(),
    };
    assemble(result, sections, links)
}

fn assemble(result: &CrawlResult, sections: Vec<Section>, links: Vec<ClassifiedLink>) -> MachineView {
    let content = sections
        .iter()
        .map(Section::text)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");
    let word_count = content.split_whitespace().count();

    MachineView {
        url: result.url.clone(),
        title: result.title.clone(),
        description: result.metadata.description.clone(),
        summary: summarize(&sections),
        content,
        sections,
        links,
        metadata: ViewMetadata {
            language: result.metadata.language.clone(),
            canonical: result.metadata.canonical.clone(),
            keywords: result.metadata.keywords.clone(),
            open_graph: result.metadata.open_graph.clone(),
            structured_data: result.metadata.json_ld.clone(),
            word_count,
        },
    }
}

fn sections_from_blocks(blocks: &[Block]) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut anchors: HashSet<String> = HashSet::new();
    push_sections(blocks, &mut sections, &mut anchors);
    sections
}

fn push_sections(blocks: &[Block], out: &mut Vec<Section>, anchors: &mut HashSet<String>) {
    for block in blocks {
        match block {
            Block::Heading { level, content } => out.push(Section::Heading {
                level: *level,
                text: content.plain.clone(),
                anchor: unique_anchor(&content.plain, anchors),
            }),
            Block::Paragraph(Inline { plain, .. }) => out.push(Section::Paragraph {
                text: plain.clone(),
            }),
            Block::List { ordered, items } => {
                let mut flat = Vec::new();
                flatten_items(items, 0, &mut flat);
                out.push(Section::List {
                    ordered: *ordered,
                    items: flat,
                });
            }
            Block::Code { language, content } => out.push(Section::Code {
                language: language.clone(),
                content: content.clone(),
            }),
            Block::Quote(inner) => push_sections(inner, out, anchors),
            Block::Table { headers, rows } => out.push(Section::Table {
                headers: headers.clone(),
                rows: rows.clone(),
            }),
            Block::Rule => {}
        }
    }
}

/// Nested items are kept in order, indented two spaces per level
fn flatten_items(items: &[ListItem], depth: usize, out: &mut Vec<String>) {
    for item in items {
        if !item.content.plain.is_empty() {
            out.push(format!("{}{}", "  ".repeat(depth), item.content.plain));
        }
        for child in &item.children {
            if let Block::List { items, .. } = child {
                flatten_items(items, depth + 1, out);
            }
        }
    }
}

/// Lowercase alphanumerics joined by `-`
pub fn slugify(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Slug of `text`, suffixed `-1`, `-2`, ... until no earlier heading uses it
fn unique_anchor(text: &str, used: &mut HashSet<String>) -> String {
    let mut slug = slugify(text);
    if slug.is_empty() {
        slug = "section".to_string();
    }

    let mut anchor = slug.clone();
    let mut suffix = 0;
    while !used.insert(anchor.clone()) {
        suffix += 1;
        anchor = format!("{}-{}", slug, suffix);
    }
    anchor
}

fn classify(base: &Url, anchors: Vec<(String, String)>) -> Vec<ClassifiedLink> {
    let mut seen = HashSet::new();
    anchors
        .into_iter()
        .filter(|(url, _)| seen.insert(url.clone()))
        .filter_map(|(url, text)| {
            let parsed = Url::parse(&url).ok()?;
            Some(ClassifiedLink {
                scope: classify_link(base, &parsed),
                url,
                text,
            })
        })
        .collect()
}

/// Extractive summary: the first few non-empty paragraphs, length-capped
fn summarize(sections: &[Section]) -> String {
    let paragraphs: Vec<&str> = sections
        .iter()
        .filter_map(|s| match s {
            Section::Paragraph { text } if !text.trim().is_empty() => Some(text.as_str()),
            _ => None,
        })
        .take(SUMMARY_PARAGRAPHS)
        .collect();

    let summary = paragraphs.join(" ");
    if summary.chars().count() <= SUMMARY_MAX_CHARS {
        return summary;
    }

    let mut truncated: String = summary.chars().take(SUMMARY_MAX_CHARS).collect();
    if let Some(space) = truncated.rfind(' ') {
        truncated.truncate(space);
    }
    truncated.push_str("...");
    truncated
}
