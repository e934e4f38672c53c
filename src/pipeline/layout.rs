//! Layout recovery for plain OCR text.
//!
//! Tesseract returns lines of text with column gaps rendered as runs of
//! spaces. Three heuristics turn that into usable Markdown:
//!
//! - [`infer_pipe_tables`]: consecutive column-aligned lines carrying numbers
//!   or ranges become a GFM table;
//! - [`insert_figure_refs`]: the first textual mention of each extracted
//!   figure (`（图3）`, `图 3`) is followed by the cropped image;
//! - [`format_image_paragraphs`]: single-image OCR gets a heading and
//!   dialogue paragraph breaks.

use crate::document::FigureMap;
use crate::error::ConvertError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use tracing::debug;

static RE_COLUMN_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}|\t|\|").unwrap());
static RE_NUMERIC_CELL: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\d～~\-\s]").unwrap());
static RE_TERMINAL_PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[。？！.?!：:]\s*$").unwrap());

/// Longest first line promoted to a heading by [`format_image_paragraphs`].
pub const HEADING_MAX_CHARS: usize = 12;

// ── Tables ───────────────────────────────────────────────────────────────────

/// Rewrite runs of column-aligned rows as pipe tables.
///
/// A line is a row when it splits (on 2+ spaces, tabs or `|`) into at least
/// three cells and one cell carries a digit, range marker or dash. A run of
/// two or more rows becomes a table whose first row is the header; a lone
/// row is emitted as its cells joined by single spaces.
pub fn infer_pipe_tables(text: &str) -> String {
    let mut output: Vec<String> = Vec::new();
    let mut rows: Vec<Vec<String>> = Vec::new();

    for line in text.trim().split('\n') {
        let stripped = line.trim();
        if stripped.is_empty() {
            flush_rows(&mut rows, &mut output);
            output.push(String::new());
            continue;
        }
        let cells: Vec<String> = RE_COLUMN_SPLIT
            .split(stripped)
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(String::from)
            .collect();
        if is_table_row(&cells) {
            rows.push(cells);
        } else {
            flush_rows(&mut rows, &mut output);
            output.push(stripped.to_string());
        }
    }
    flush_rows(&mut rows, &mut output);
    output.join("\n")
}

fn is_table_row(cells: &[String]) -> bool {
    cells.len() >= 3
        && cells
            .iter()
            .any(|c| RE_NUMERIC_CELL.is_match(c) || c.contains(['—', '－']))
}

fn flush_rows(rows: &mut Vec<Vec<String>>, output: &mut Vec<String>) {
    if rows.is_empty() {
        return;
    }
    if rows.len() < 2 {
        output.extend(rows.drain(..).map(|r| r.join(" ")));
        return;
    }

    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    let mut table = Vec::with_capacity(rows.len() + 1);
    for (i, mut row) in rows.drain(..).enumerate() {
        row.resize(width, String::new());
        table.push(format!("| {} |", row.join(" | ")));
        if i == 0 {
            table.push(format!("| {} |", vec!["---"; width].join(" | ")));
        }
    }
    debug!("Inferred {}-column table with {} rows", width, table.len() - 1);
    output.push(table.join("\n"));
}

// ── Figure references ────────────────────────────────────────────────────────

/// Insert `![<marker>N](path)` after the first mention of each figure.
///
/// Mentions look like `（图3）`, `(图 3)` or `图3`; the full number is
/// matched so `图10` never counts as a mention of figure 1. Figures never
/// mentioned are not inserted.
pub fn insert_figure_refs(
    markdown: &str,
    figures: &FigureMap,
    marker: &str,
) -> Result<String, ConvertError> {
    if figures.is_empty() {
        return Ok(markdown.to_string());
    }
    let pattern = format!(r"[（(]?\s*{}\s*(\d+)\s*[)）]?", regex::escape(marker));
    let re = Regex::new(&pattern)
        .map_err(|e| ConvertError::Internal(format!("figure reference pattern: {e}")))?;

    let mut inserted: HashSet<&str> = HashSet::new();
    let mut out = String::with_capacity(markdown.len());
    let mut last = 0;

    for caps in re.captures_iter(markdown) {
        let (Some(whole), Some(number)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let number = number.as_str();
        let Some(path) = figures.get(number) else {
            continue;
        };
        if !inserted.insert(number) {
            continue;
        }
        out.push_str(&markdown[last..whole.end()]);
        out.push_str(&format!("\n\n![{marker}{number}]({path})\n\n"));
        last = whole.end();
    }
    out.push_str(&markdown[last..]);

    debug!("Inserted {} of {} figure reference(s)", inserted.len(), figures.len());
    Ok(out)
}

// ── Single-image paragraphs ──────────────────────────────────────────────────

/// Add Markdown structure to the OCR text of a single image.
///
/// A short first line without terminal punctuation becomes a `##` heading,
/// and a blank line is inserted before each line opening a quotation (`“`).
pub fn format_image_paragraphs(content: &str) -> String {
    if content.trim().is_empty() {
        return content.to_string();
    }
    let lines: Vec<&str> = content.split('\n').collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len() + 2);

    let first = lines[0].trim();
    let start = if !first.is_empty()
        && first.chars().count() <= HEADING_MAX_CHARS
        && !RE_TERMINAL_PUNCT.is_match(first)
    {
        out.push(format!("## {first}"));
        out.push(String::new());
        1
    } else {
        0
    };

    for line in &lines[start..] {
        if line.trim().starts_with('\u{201c}') && out.last().is_some_and(|l| !l.is_empty()) {
            out.push(String::new());
        }
        out.push(line.to_string());
    }
    out.join("\n").trim_end().to_string()
}
