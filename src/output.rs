//! Conversion results, HTML rendering and the per-document assets directory.

use crate::error::{ConvertError, ImageFailure};
use pulldown_cmark::{html, Options, Parser};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Everything a successful conversion produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutput {
    /// Final Markdown body.
    pub markdown: String,
    /// HTML rendering, present when HTML output was requested.
    pub html: Option<String>,
    /// Absolute path of the written artifact, if one was written.
    pub output_path: Option<PathBuf>,
    /// Pages recognised (local OCR path only).
    pub page_count: Option<usize>,
    /// Figures cropped from the pages (local OCR path only).
    pub figure_count: Option<usize>,
    /// Image references that could not be fetched; annotated in place.
    pub image_failures: Vec<ImageFailure>,
    pub stats: ConversionStats,
}

impl ConversionOutput {
    /// The artifact body in the requested format.
    pub fn content(&self) -> &str {
        self.html.as_deref().unwrap_or(&self.markdown)
    }
}

/// Render Markdown to an HTML fragment.
///
/// GFM tables, footnotes and strikethrough are enabled; raw HTML already in
/// the Markdown (rebuilt tables, `<!-- … -->` annotations) passes through.
pub fn markdown_to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let parser = Parser::new_ext(markdown, options);
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

/// Timing and counters for one conversion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionStats {
    /// Backend that produced the content (`remote` / `local`).
    pub backend: String,
    /// Remote task id, when the remote backend ran.
    pub task_id: Option<String>,
    /// Status queries made against the remote task.
    pub polls: u32,
    pub tables_rebuilt: usize,
    pub images_resolved: usize,
    pub total_duration_ms: u64,
    pub backend_duration_ms: u64,
}

/// Directory receiving a document's extracted or downloaded images.
///
/// Named `<stem>_images` next to the output (or input) file and referenced
/// from the Markdown as `./<stem>_images/<file>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetDir {
    dir: PathBuf,
    name: String,
}

impl AssetDir {
    pub fn new(dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            name: name.into(),
        }
    }

    /// Assets directory for a document written to (or read from) `path`.
    pub fn beside(path: &Path) -> Self {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        let name = format!("{stem}_images");
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        Self::new(parent.join(&name), name)
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Create the directory if needed and return its path.
    pub fn ensure(&self) -> Result<&Path, ConvertError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| ConvertError::OutputWriteFailed {
            path: self.dir.clone(),
            source: e,
        })?;
        Ok(&self.dir)
    }

    /// Markdown-relative reference to `file_name` inside this directory.
    pub fn relative(&self, file_name: &str) -> String {
        format!("./{}/{}", self.name, file_name)
    }
}
