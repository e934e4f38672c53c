//! Markdown normalisation for remote parser output.
//!
//! The parser's Markdown is close to final but carries four kinds of
//! artefact, fixed by four passes run in this order:
//!
//! 1. **Tables** — pipe tables lose merged cells. Each run of `|…|` lines is
//!    replaced by the HTML rebuilt from the next structured table
//!    ([`TableCursor`]), in page order.
//! 2. **Figures** — `<figure>` blocks become a Markdown image followed by an
//!    italic caption.
//! 3. **Labels** — the short text fragments OCR'd from inside a diagram
//!    (one per line under the image) are collapsed into one
//!    `（图中文字：a、b、c）` line.
//! 4. **Images** — remote image references are inlined or downloaded
//!    ([`crate::pipeline::images`]).
//!
//! Every pass is a no-op when its trigger is absent, so a document with no
//! tables, figures or images passes through byte-for-byte.

use crate::document::{ParseResult, Table};
use crate::error::ImageFailure;
use crate::pipeline::images::{resolve_images, ImageFetcher, ImagePolicy};
use crate::pipeline::table::table_to_html;
use crate::progress::ProgressCallback;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::{debug, info};

/// Result of [`normalize`].
#[derive(Debug, Clone, Default)]
pub struct Normalized {
    pub markdown: String,
    pub image_failures: Vec<ImageFailure>,
    pub tables_rebuilt: usize,
    pub images_resolved: usize,
}

/// Run all passes over the parser's Markdown.
pub async fn normalize<F: ImageFetcher>(
    markdown: &str,
    parse_result: Option<&ParseResult>,
    policy: &ImagePolicy,
    fetcher: &F,
    label_max_chars: usize,
    progress: Option<&ProgressCallback>,
) -> Normalized {
    let (md, tables_rebuilt) = match parse_result {
        Some(result) => {
            let mut cursor = TableCursor::new(result.tables_in_page_order());
            let md = substitute_tables(markdown, &mut cursor);
            (md, cursor.consumed())
        }
        None => (markdown.to_string(), 0),
    };
    let md = normalize_figures(&md);
    let md = collapse_figure_labels(&md, label_max_chars);
    let images = resolve_images(&md, policy, fetcher, progress).await;

    info!(
        "Normalised markdown: {} table(s) rebuilt, {} image(s) resolved, {} image failure(s)",
        tables_rebuilt,
        images.resolved,
        images.failures.len()
    );
    Normalized {
        markdown: images.markdown,
        image_failures: images.failures,
        tables_rebuilt,
        images_resolved: images.resolved,
    }
}

// ── Pass 1: tables ───────────────────────────────────────────────────────────

static RE_PIPE_TABLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\|[^\n]+\|\s*\n)+").unwrap());

/// Hands out the document's structured tables one at a time, in page order.
pub struct TableCursor<'a> {
    tables: Vec<&'a Table>,
    next: usize,
}

impl<'a> TableCursor<'a> {
    pub fn new(tables: Vec<&'a Table>) -> Self {
        Self { tables, next: 0 }
    }

    /// Tables handed out so far.
    pub fn consumed(&self) -> usize {
        self.next
    }

    pub fn remaining(&self) -> usize {
        self.tables.len() - self.next
    }
}

impl<'a> Iterator for TableCursor<'a> {
    type Item = &'a Table;

    fn next(&mut self) -> Option<Self::Item> {
        let table = self.tables.get(self.next).copied()?;
        self.next += 1;
        Some(table)
    }
}

/// Replace each maximal run of pipe-table lines with the next table's HTML.
///
/// Runs found after the cursor is exhausted are left as they are.
pub fn substitute_tables(markdown: &str, cursor: &mut TableCursor<'_>) -> String {
    if cursor.remaining() == 0 {
        return markdown.to_string();
    }
    RE_PIPE_TABLE
        .replace_all(markdown, |caps: &Captures<'_>| match cursor.next() {
            Some(table) => format!("{}\n", table_to_html(table)),
            None => {
                debug!("Pipe table without a structured counterpart; kept as is");
                caps[0].to_string()
            }
        })
        .into_owned()
}

// ── Pass 2: figures ──────────────────────────────────────────────────────────

static RE_FIGURE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?is)<figure>\s*(?:!\[\]\(([^)]+)\)|<\s*img[^>]+>)\s*<figcaption>([^<]*)</figcaption>.*?</figure>",
    )
    .unwrap()
});

static RE_SRC_ATTR: Lazy<Regex> = Lazy::new(|| Regex::new(r#"src=["']([^"']+)["']"#).unwrap());

/// Rewrite `<figure>` blocks as `![](path)` plus an italic caption line.
pub fn normalize_figures(markdown: &str) -> String {
    if !RE_FIGURE.is_match(markdown) {
        return markdown.to_string();
    }
    RE_FIGURE
        .replace_all(markdown, |caps: &Captures<'_>| {
            let path = match caps.get(1) {
                Some(p) => p.as_str().trim().to_string(),
                None => RE_SRC_ATTR
                    .captures(&caps[0])
                    .map(|c| c[1].to_string())
                    .unwrap_or_else(|| ".".to_string()),
            };
            let path = relative_path(&path);
            let caption = caps.get(2).map(|c| c.as_str().trim()).unwrap_or_default();
            if caption.is_empty() {
                format!("![]({path})")
            } else {
                format!("![]({path})\n\n*{caption}*")
            }
        })
        .into_owned()
}

/// Prefix bare relative paths with `./`; URLs and absolute paths are kept.
fn relative_path(path: &str) -> String {
    let keep = ["./", "../", "/", "data:", "http://", "https://"];
    if keep.iter().any(|p| path.starts_with(p)) {
        path.to_string()
    } else {
        format!("./{path}")
    }
}

// ── Pass 3: diagram labels ───────────────────────────────────────────────────

static RE_IMAGE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:!\[[^\]]*\]\([^)]*\)|<img\s[^>]*>)\s*$").unwrap()
});

/// Collapse the run of short label lines under each image line into one
/// `（图中文字：a、b、c）` line.
///
/// A label line is non-blank, at most `max_chars` characters, does not start
/// with `#`, `-`, `*` or `<`, and holds no sentence-ending `。！？`. Several
/// labels on one line are split on whitespace. Blank lines inside the run are
/// dropped; blank lines after its last label are kept.
pub fn collapse_figure_labels(markdown: &str, max_chars: usize) -> String {
    let lines: Vec<&str> = markdown.split('\n').collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        out.push(line.to_string());
        i += 1;
        if !RE_IMAGE_LINE.is_match(line) {
            continue;
        }

        let mut labels: Vec<&str> = Vec::new();
        let mut j = i;
        let mut resume = i;
        while j < lines.len() {
            let s = lines[j].trim();
            if s.is_empty() {
                j += 1;
                continue;
            }
            if !is_label(lines[j], s, max_chars) {
                break;
            }
            labels.extend(s.split_whitespace());
            j += 1;
            resume = j;
        }

        if !labels.is_empty() {
            out.push(format!("（图中文字：{}）", labels.join("、")));
            i = resume;
        }
    }
    out.join("\n")
}

fn is_label(line: &str, trimmed: &str, max_chars: usize) -> bool {
    !RE_IMAGE_LINE.is_match(line)
        && !trimmed.starts_with(['#', '-', '*', '<'])
        && !trimmed.contains(['。', '！', '？'])
        && trimmed.chars().count() <= max_chars
}
