//! Document walker producing typed content blocks in source order
//!
//! Both the markdown converter and the machine view are built from these
//! blocks, so a different HTML front end only has to produce `Block`s.
//! Content nested deeper than [`MAX_NESTING_DEPTH`] is kept as plain text.

use crate::extract::html::{
    collapse_whitespace, resolve_link, visible_text, MAX_NESTING_DEPTH, SKIPPED_TAGS,
};
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Inline content in two renderings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inline {
    pub plain: String,
    pub markdown: String,
}

impl Inline {
    fn push(&mut self, other: Inline) {
        self.plain.push_str(&other.plain);
        self.markdown.push_str(&other.markdown);
    }

    fn push_text(&mut self, text: &str) {
        self.plain.push_str(text);
        self.markdown.push_str(text);
    }

    fn flattened(element: ElementRef<'_>) -> Inline {
        let text = visible_text(element);
        Inline {
            markdown: text.clone(),
            plain: text,
        }
    }

    fn collapsed(self) -> Inline {
        Inline {
            plain: collapse_whitespace(&self.plain),
            markdown: collapse_whitespace(&self.markdown),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.plain.trim().is_empty() && self.markdown.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListItem {
    pub content: Inline,
    /// Nested lists
    pub children: Vec<Block>,
}

/// A block-level piece of the document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Heading { level: u8, content: Inline },
    Paragraph(Inline),
    List { ordered: bool, items: Vec<ListItem> },
    Code { language: Option<String>, content: String },
    Quote(Vec<Block>),
    Table { headers: Vec<String>, rows: Vec<Vec<String>> },
    Rule,
}

/// Parses HTML and walks it into blocks
pub fn parse_blocks(html: &str, base_url: &Url) -> Vec<Block> {
    let document = Html::parse_document(html);
    document_blocks(&document, base_url)
}

/// Walks an already parsed document into blocks
pub fn document_blocks(document: &Html, base_url: &Url) -> Vec<Block> {
    let root = Selector::parse("body")
        .ok()
        .and_then(|sel| document.select(&sel).next())
        .unwrap_or_else(|| document.root_element());

    let mut walker = BlockWalker::new(base_url, 0);
    walker.walk(root);
    walker.finish()
}

struct BlockWalker<'u> {
    base_url: &'u Url,
    blocks: Vec<Block>,
    pending: Inline,
    depth: usize,
}

impl<'u> BlockWalker<'u> {
    fn new(base_url: &'u Url, depth: usize) -> Self {
        Self {
            base_url,
            blocks: Vec::new(),
            pending: Inline::default(),
            depth,
        }
    }

    fn finish(mut self) -> Vec<Block> {
        self.flush();
        self.blocks
    }

    /// Turns loose inline content into a paragraph
    fn flush(&mut self) {
        let pending = std::mem::take(&mut self.pending).collapsed();
        if !pending.is_empty() {
            self.blocks.push(Block::Paragraph(pending));
        }
    }

    fn walk(&mut self, element: ElementRef<'_>) {
        for child in element.children() {
            if let Some(text) = child.value().as_text() {
                self.pending.push_text(text);
                continue;
            }
            let Some(child) = ElementRef::wrap(child) else {
                continue;
            };

            let name = child.value().name();
            if SKIPPED_TAGS.contains(&name) {
                continue;
            }

            if self.depth >= MAX_NESTING_DEPTH {
                self.pending.push(Inline::flattened(child));
                self.pending.push_text(" ");
                continue;
            }

            match name {
                "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                    self.flush();
                    let level = name[1..].parse().unwrap_or(1);
                    let content = inline(child, self.base_url, self.depth + 1).collapsed();
                    if !content.is_empty() {
                        self.blocks.push(Block::Heading { level, content });
                    }
                }
                "p" => {
                    self.flush();
                    let content = inline(child, self.base_url, self.depth + 1).collapsed();
                    if !content.is_empty() {
                        self.blocks.push(Block::Paragraph(content));
                    }
                }
                "ul" | "ol" => {
                    self.flush();
                    let list = list(child, self.base_url, self.depth + 1);
                    if let Block::List { items, .. } = &list {
                        if items.is_empty() {
                            continue;
                        }
                    }
                    self.blocks.push(list);
                }
                "pre" => {
                    self.flush();
                    self.blocks.push(code_block(child));
                }
                "blockquote" => {
                    self.flush();
                    let mut inner = BlockWalker::new(self.base_url, self.depth + 1);
                    inner.walk(child);
                    let blocks = inner.finish();
                    if !blocks.is_empty() {
                        self.blocks.push(Block::Quote(blocks));
                    }
                }
                "table" => {
                    self.flush();
                    if let Some(table) = table(child) {
                        self.blocks.push(table);
                    }
                }
                "hr" => {
                    self.flush();
                    self.blocks.push(Block::Rule);
                }
                "br" => self.pending.push_text(" "),
                _ if is_inline(name) => {
                    let content = inline(child, self.base_url, self.depth + 1);
                    self.pending.push(content);
                }
                _ => {
                    // Generic container: its content forms its own blocks
                    self.flush();
                    self.depth += 1;
                    self.walk(child);
                    self.depth -= 1;
                    self.flush();
                }
            }
        }
    }
}

fn is_inline(name: &str) -> bool {
    matches!(
        name,
        "a" | "abbr"
            | "b"
            | "cite"
            | "code"
            | "em"
            | "i"
            | "img"
            | "kbd"
            | "label"
            | "mark"
            | "q"
            | "s"
            | "small"
            | "span"
            | "strong"
            | "sub"
            | "sup"
            | "time"
            | "u"
    )
}

/// Renders an element's inline content
fn inline(element: ElementRef<'_>, base_url: &Url, depth: usize) -> Inline {
    if depth >= MAX_NESTING_DEPTH {
        return Inline::flattened(element);
    }
    let mut out = Inline::default();

    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_text(text);
            continue;
        }
        let Some(child) = ElementRef::wrap(child) else {
            continue;
        };

        let name = child.value().name();
        if SKIPPED_TAGS.contains(&name) || name == "ul" || name == "ol" {
            continue;
        }

        match name {
            "br" => out.push_text(" "),
            "img" => {
                let alt = child.value().attr("alt").unwrap_or("").trim();
                if let Some(src) = child
                    .value()
                    .attr("src")
                    .and_then(|src| resolve_link(src, base_url))
                {
                    out.plain.push_str(alt);
                    out.markdown.push_str(&format!("![{}]({})", alt, src));
                }
            }
            "a" => {
                let text = inline(child, base_url, depth + 1).collapsed();
                match child
                    .value()
                    .attr("href")
                    .and_then(|href| resolve_link(href, base_url))
                {
                    Some(href) if !text.plain.is_empty() => {
                        out.plain.push_str(&text.plain);
                        out.markdown
                            .push_str(&format!("[{}]({})", text.markdown, href));
                    }
                    _ => out.push(text),
                }
            }
            "strong" | "b" => out.push(wrapped(inline(child, base_url, depth + 1), "**")),
            "em" | "i" => out.push(wrapped(inline(child, base_url, depth + 1), "*")),
            "code" => {
                let code = collapse_whitespace(&child.text().collect::<String>());
                if !code.is_empty() {
                    out.plain.push_str(&code);
                    out.markdown.push_str(&format!("`{}`", code));
                }
            }
            _ => out.push(inline(child, base_url, depth + 1)),
        }
    }

    out
}

fn wrapped(content: Inline, marker: &str) -> Inline {
    let content = content.collapsed();
    if content.is_empty() {
        return Inline::default();
    }
    Inline {
        markdown: format!("{}{}{}", marker, content.markdown, marker),
        plain: content.plain,
    }
}

fn list(element: ElementRef<'_>, base_url: &Url, depth: usize) -> Block {
    let ordered = element.value().name() == "ol";
    let mut items = Vec::new();

    for child in element.children().filter_map(ElementRef::wrap) {
        if child.value().name() != "li" {
            continue;
        }

        let content = inline(child, base_url, depth + 1).collapsed();
        let children: Vec<Block> = child
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|e| matches!(e.value().name(), "ul" | "ol"))
            .filter(|_| depth < MAX_NESTING_DEPTH)
            .map(|e| list(e, base_url, depth + 1))
            .collect();

        if content.is_empty() && children.is_empty() {
            continue;
        }
        items.push(ListItem { content, children });
    }

    Block::List { ordered, items }
}

fn code_block(element: ElementRef<'_>) -> Block {
    let language = element
        .children()
        .filter_map(ElementRef::wrap)
        .find(|e| e.value().name() == "code")
        .into_iter()
        .chain(std::iter::once(element))
        .filter_map(|e| e.value().attr("class"))
        .flat_map(str::split_whitespace)
        .find_map(|class| {
            class
                .strip_prefix("language-")
                .or_else(|| class.strip_prefix("lang-"))
                .map(str::to_string)
        });

    let content = element.text().collect::<String>();
    Block::Code {
        language,
        content: content.trim_matches('\n').to_string(),
    }
}

fn table(element: ElementRef<'_>) -> Option<Block> {
    let row_sel = Selector::parse("tr").ok()?;
    let cell_sel = Selector::parse("th, td").ok()?;

    let mut rows: Vec<(bool, Vec<String>)> = element
        .select(&row_sel)
        .map(|row| {
            let is_header = row.select(&cell_sel).all(|c| c.value().name() == "th");
            let cells = row
                .select(&cell_sel)
                .map(|c| collapse_whitespace(&c.text().collect::<String>()))
                .collect();
            (is_header, cells)
        })
        .filter(|(_, cells): &(bool, Vec<String>)| !cells.is_empty())
        .collect();

    if rows.is_empty() {
        return None;
    }

    let headers = if rows[0].0 {
        rows.remove(0).1
    } else {
        Vec::new()
    };

    Some(Block::Table {
        headers,
        rows: rows.into_iter().map(|(_, cells)| cells).collect(),
    })
}
