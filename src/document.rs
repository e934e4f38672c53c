//! Document model shared by both backends.
//!
//! The remote parser returns a JSON parse result describing each page's text
//! and tables; the local OCR path produces per-page text plus a figure map.
//! Both collapse into a [`BackendResult`] so the finishing stage in
//! [`crate::convert`] never branches on backend identity beyond one `match`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Structured parse result: ordered pages with their text and tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParseResult {
    #[serde(default)]
    pub pages: Vec<Page>,
}

impl ParseResult {
    /// All tables of the document, pages sorted by ascending page number.
    pub fn tables_in_page_order(&self) -> Vec<&Table> {
        self.sorted_pages()
            .into_iter()
            .flat_map(|p| p.tables.iter())
            .collect()
    }

    /// Non-blank page texts joined by blank lines, in page order.
    ///
    /// Used when the backend's markdown rendition is missing or empty.
    pub fn joined_text(&self) -> String {
        self.sorted_pages()
            .into_iter()
            .map(|p| p.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn sorted_pages(&self) -> Vec<&Page> {
        let mut pages: Vec<&Page> = self.pages.iter().collect();
        pages.sort_by_key(|p| p.page_num);
        pages
    }
}

/// One page of a [`ParseResult`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub page_num: usize,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub tables: Vec<Table>,
}

/// A table as a cell list plus a cell-index matrix.
///
/// `matrix[r][c]` holds the index into `cells` of the logical cell covering
/// that grid position; a repeated index over a contiguous rectangle is a
/// merged cell. Rows may be ragged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    #[serde(default)]
    pub cells: Vec<Cell>,
    #[serde(default)]
    pub matrix: Vec<Vec<usize>>,
    /// Backend-provided markdown rendition, used as a fallback.
    #[serde(default)]
    pub markdown: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    #[serde(default)]
    pub text: String,
}

impl Cell {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Axis-aligned box in rendered-page pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: i64,
    pub top: i64,
    pub width: i64,
    pub height: i64,
}

impl BoundingBox {
    pub fn new(left: i64, top: i64, width: i64, height: i64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> i64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> i64 {
        self.top + self.height
    }

    /// Smallest box containing both `self` and `other`.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        let left = self.left.min(other.left);
        let top = self.top.min(other.top);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        BoundingBox::new(left, top, right - left, bottom - top)
    }
}

/// A figure located from its caption on a rendered page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Figure {
    pub caption_number: String,
    /// 1-indexed page the caption was found on.
    pub page: usize,
    pub caption_box: BoundingBox,
    /// Relative path of the cropped image, e.g. `./report_images/fig3.png`.
    pub image_path: String,
}

/// Caption number → relative image path, first occurrence wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FigureMap {
    entries: BTreeMap<String, String>,
}

impl FigureMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a mapping unless `caption_number` is already present.
    ///
    /// Returns `false` when the key existed; the existing path is kept.
    pub fn insert(&mut self, caption_number: impl Into<String>, path: impl Into<String>) -> bool {
        let key = caption_number.into();
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, path.into());
        true
    }

    pub fn contains(&self, caption_number: &str) -> bool {
        self.entries.contains_key(caption_number)
    }

    pub fn get(&self, caption_number: &str) -> Option<&str> {
        self.entries.get(caption_number).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FigureMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = FigureMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

/// Output of the local OCR backend, ready for finishing.
#[derive(Debug, Clone)]
pub struct LocalResult {
    pub markdown: String,
    pub page_count: usize,
    pub figures: FigureMap,
}

/// Output of the remote parser backend, before normalisation.
#[derive(Debug, Clone)]
pub struct RemoteResult {
    pub markdown: String,
    pub parse_result: Option<ParseResult>,
}

/// Result of whichever backend ran.
#[derive(Debug, Clone)]
pub enum BackendResult {
    Local(LocalResult),
    Remote(RemoteResult),
}
