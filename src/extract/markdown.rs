//! Markdown rendering of content blocks

use crate::extract::blocks::{Block, ListItem};

/// Renders blocks as markdown, separated by blank lines
pub fn blocks_to_markdown(blocks: &[Block]) -> String {
    blocks
        .iter()
        .map(render_block)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn render_block(block: &Block) -> String {
    match block {
        Block::Heading { level, content } => {
            format!("{} {}", "#".repeat(*level as usize), content.markdown)
        }
        Block::Paragraph(content) => content.markdown.clone(),
        Block::List { ordered, items } => {
            let mut lines = Vec::new();
            render_list(*ordered, items, 0, &mut lines);
            lines.join("\n")
        }
        Block::Code { language, content } => format!(
            "```{}\n{}\n```",
            language.as_deref().unwrap_or(""),
            content
        ),
        Block::Quote(inner) => blocks_to_markdown(inner)
            .lines()
            .map(|line| {
                if line.is_empty() {
                    ">".to_string()
                } else {
                    format!("> {}", line)
                }
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Block::Table { headers, rows } => render_table(headers, rows),
        Block::Rule => "---".to_string(),
    }
}

fn render_list(ordered: bool, items: &[ListItem], indent: usize, lines: &mut Vec<String>) {
    let pad = "  ".repeat(indent);
    for (i, item) in items.iter().enumerate() {
        let marker = if ordered {
            format!("{}.", i + 1)
        } else {
            "-".to_string()
        };
        lines.push(format!("{}{} {}", pad, marker, item.content.markdown));

        for child in &item.children {
            if let Block::List { ordered, items } = child {
                render_list(*ordered, items, indent + 1, lines);
            }
        }
    }
}

fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let columns = rows
        .iter()
        .map(Vec::len)
        .chain(std::iter::once(headers.len()))
        .max()
        .unwrap_or(0);
    if columns == 0 {
        return String::new();
    }

    let row_line = |cells: &[String]| {
        let padded: Vec<String> = (0..columns)
            .map(|i| cells.get(i).map(|c| c.replace('|', "\\|")).unwrap_or_default())
            .collect();
        format!("| {} |", padded.join(" | "))
    };

    let mut lines = vec![row_line(headers)];
    lines.push(format!("|{}", " --- |".repeat(columns)));
    lines.extend(rows.iter().map(|row| row_line(row)));
    lines.join("\n")
}
