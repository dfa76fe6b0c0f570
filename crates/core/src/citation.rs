use crate::models::{Document, FileType};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

pub const UNKNOWN_AUTHOR: &str = "Unknown Author";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CitationStyle {
    Apa,
    Mla,
    Chicago,
    Harvard,
}

/// Renders a human-readable source citation for a document. Author names
/// come from heuristics over the text; dates from the ingestion timestamp.
pub fn format_citation(document: &Document, style: CitationStyle) -> String {
    let author = extract_author(&document.text);
    match style {
        CitationStyle::Apa => apa(document, &author),
        CitationStyle::Mla => mla(document, &author),
        CitationStyle::Chicago => chicago(document, &author),
        CitationStyle::Harvard => harvard(document, &author),
    }
}

/// Looks for an explicit attribution line (`Author:`, `By:`, `Written by:`,
/// …), then for a plausible name line near the top of the document, and
/// gives up with [`UNKNOWN_AUTHOR`] otherwise.
pub fn extract_author(content: &str) -> String {
    if content.is_empty() {
        return UNKNOWN_AUTHOR.to_string();
    }

    for pattern in author_patterns() {
        if let Some(capture) = pattern.captures(content).and_then(|found| found.get(1)) {
            let author = capture.as_str().trim();
            if author.len() > 2 && author.len() < 100 {
                return author.to_string();
            }
        }
    }

    // letters, spaces, and light punctuation only: a name line, not prose
    for line in content.lines().take(10) {
        let line = line.trim();
        if line.len() > 2
            && line.len() < 50
            && line
                .chars()
                .all(|c| c.is_alphabetic() || c.is_whitespace() || ".,'\"-".contains(c))
        {
            return line.to_string();
        }
    }

    UNKNOWN_AUTHOR.to_string()
}

fn author_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?i)authors?[\s:]+([A-Za-z\s.,]+)",
            r"(?i)by[\s:]+([A-Za-z\s.,]+)",
            r"(?i)written by[\s:]+([A-Za-z\s.,]+)",
            r"(?i)submitted by[\s:]+([A-Za-z\s.,]+)",
            r"(?i)prepared by[\s:]+([A-Za-z\s.,]+)",
        ]
        .iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect()
    })
}

fn file_tag(file_type: FileType) -> Option<&'static str> {
    match file_type {
        FileType::Pdf => Some("PDF"),
        FileType::Word => Some("DOCX"),
        _ => None,
    }
}

/// "Jane Q Doe" → "Doe, J.Q."
fn last_name_initials(author: &str) -> String {
    let parts: Vec<&str> = author.split_whitespace().collect();
    if parts.len() < 2 || author == UNKNOWN_AUTHOR {
        return author.to_string();
    }

    let initials: String = parts[..parts.len() - 1]
        .iter()
        .filter_map(|name| name.chars().next())
        .map(|initial| format!("{initial}."))
        .collect();
    format!("{}, {}", parts[parts.len() - 1], initials)
}

/// "Jane Q Doe" → "Doe, Jane Q"
fn last_name_first(author: &str) -> String {
    let parts: Vec<&str> = author.split_whitespace().collect();
    if parts.len() < 2 || author == UNKNOWN_AUTHOR {
        return author.to_string();
    }
    format!(
        "{}, {}",
        parts[parts.len() - 1],
        parts[..parts.len() - 1].join(" ")
    )
}

fn apa(document: &Document, author: &str) -> String {
    let mut citation = format!(
        "{} ({}). {}",
        last_name_initials(author),
        document.ingested_at.format("%Y"),
        document.title
    );
    if let Some(tag) = file_tag(document.file_type) {
        citation.push_str(&format!(" [{tag} file]"));
    }
    citation
}

fn mla(document: &Document, author: &str) -> String {
    let mut citation = format!("{}. \"{}\"", last_name_first(author), document.title);
    if let Some(tag) = file_tag(document.file_type) {
        citation.push_str(&format!(", {tag}"));
    }
    citation.push_str(&format!(
        ", {} {}. {}",
        document.ingested_at.format("%d"),
        document.ingested_at.format("%b"),
        document.ingested_at.format("%Y")
    ));
    citation
}

fn chicago(document: &Document, author: &str) -> String {
    let mut citation = format!("{}. \"{}.\"", author, document.title);
    if let Some(tag) = file_tag(document.file_type) {
        citation.push_str(&format!(" {tag} file"));
    }
    citation.push_str(&format!(
        ", {} {}, {}.",
        document.ingested_at.format("%B"),
        document.ingested_at.format("%d"),
        document.ingested_at.format("%Y")
    ));
    citation
}

fn harvard(document: &Document, author: &str) -> String {
    let mut citation = format!(
        "{} {}, '{}'",
        last_name_initials(author),
        document.ingested_at.format("%Y"),
        document.title
    );
    if let Some(tag) = file_tag(document.file_type) {
        citation.push_str(&format!(", {tag} file"));
    }
    citation
}
