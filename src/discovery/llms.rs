//! llms.txt parsing

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// One heading-delimited section of an llms.txt file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmsSection {
    /// Heading text without the `#` markup; empty for the preamble
    pub title: String,
    pub body: String,
    /// Absolute URLs found in the body, in order of appearance
    pub links: Vec<String>,
}

/// Parsed machine-readability manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmsTxtData {
    pub source_url: String,
    pub raw: String,
    pub sections: Vec<LlmsSection>,
    pub parsed_at: DateTime<Utc>,
}

fn url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"https?://[^\s<>()\[\]"'`]+"#).expect("URL pattern is valid")
    })
}

/// Collects absolute URLs from a line of text
fn extract_urls(text: &str) -> impl Iterator<Item = String> + '_ {
    url_regex().find_iter(text).filter_map(|m| {
        let url = m
            .as_str()
            .trim_end_matches(|c: char| matches!(c, '.' | ',' | ';' | ':' | '!' | '?'));
        (!url.is_empty()).then(|| url.to_string())
    })
}

#[derive(Default)]
struct SectionBuilder {
    title: String,
    lines: Vec<String>,
    links: Vec<String>,
}

impl SectionBuilder {
    fn titled(title: &str) -> Self {
        Self {
            title: title.to_string(),
            ..Default::default()
        }
    }

    fn push_line(&mut self, line: &str) {
        self.links.extend(extract_urls(line));
        self.lines.push(line.to_string());
    }

    fn finish(self) -> Option<LlmsSection> {
        let body = self.lines.join("\n").trim().to_string();
        if self.title.is_empty() && body.is_empty() {
            return None;
        }
        Some(LlmsSection {
            title: self.title,
            body,
            links: self.links,
        })
    }
}

/// Parses an llms.txt body into ordered sections
///
/// A line starting with `#` opens a new section; every following line is
/// body text until the next heading or the end of input. Text before the
/// first heading becomes an untitled section.
pub fn parse_llms_txt(source_url: &str, raw: &str) -> LlmsTxtData {
    let mut sections = Vec::new();
    let mut current = SectionBuilder::default();

    for line in raw.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with('#') {
            let title = trimmed.trim_start_matches('#').trim();
            let finished = std::mem::replace(&mut current, SectionBuilder::titled(title));
            sections.extend(finished.finish());
        } else {
            current.push_line(line.trim_end());
        }
    }
    sections.extend(current.finish());

    LlmsTxtData {
        source_url: source_url.to_string(),
        raw: raw.to_string(),
        sections,
        parsed_at: Utc::now(),
    }
}
