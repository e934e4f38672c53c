//! Local OCR through the tesseract command-line tool.
//!
//! Two passes are made per page image: plain text (`stdout`), which keeps
//! tesseract's column spacing for table-layout inference, and TSV, which
//! yields one row per recognised word with its bounding box and its
//! block/paragraph/line position for caption detection.
//!
//! The engine sits behind [`OcrEngine`] so the local pipeline can be driven
//! by canned tokens in tests.

use crate::document::BoundingBox;
use crate::error::ConvertError;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// One recognised word.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrToken {
    pub text: String,
    pub bbox: BoundingBox,
    pub line: LineKey,
}

impl OcrToken {
    pub fn new(text: impl Into<String>, bbox: BoundingBox, line: LineKey) -> Self {
        Self {
            text: text.into(),
            bbox,
            line,
        }
    }
}

/// Identifies a text line. tesseract numbers lines per paragraph, so the
/// full block/paragraph/line triple is needed to tell lines apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LineKey {
    pub block: u32,
    pub paragraph: u32,
    pub line: u32,
}

impl LineKey {
    pub fn new(block: u32, paragraph: u32, line: u32) -> Self {
        Self {
            block,
            paragraph,
            line,
        }
    }
}

/// Text recognition over a page image on disk.
#[allow(async_fn_in_trait)]
pub trait OcrEngine {
    /// Recognised text with the engine's own line layout.
    async fn recognize_text(&self, image: &Path) -> Result<String, ConvertError>;

    /// Word-level tokens with bounding boxes, in reading order.
    async fn recognize_tokens(&self, image: &Path) -> Result<Vec<OcrToken>, ConvertError>;
}

/// The tesseract CLI.
#[derive(Debug, Clone)]
pub struct Tesseract {
    binary: String,
    lang: String,
}

impl Tesseract {
    pub fn new(binary: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            lang: lang.into(),
        }
    }

    async fn run(&self, image: &Path, extra: &[&str]) -> Result<String, ConvertError> {
        let output = Command::new(&self.binary)
            .arg(image)
            .arg("stdout")
            .args(["-l", &self.lang])
            .args(extra)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| ConvertError::ToolUnavailable {
                tool: self.binary.clone(),
                detail: e.to_string(),
                hint: format!(
                    "Install tesseract with the '{}' language data (e.g. apt-get install tesseract-ocr tesseract-ocr-chi-sim).",
                    self.lang
                ),
            })?;

        if !output.status.success() {
            return Err(ConvertError::ToolFailed {
                tool: self.binary.clone(),
                diagnostics: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl OcrEngine for Tesseract {
    async fn recognize_text(&self, image: &Path) -> Result<String, ConvertError> {
        let text = self.run(image, &[]).await?;
        debug!("tesseract text: {} chars from {}", text.len(), image.display());
        Ok(text)
    }

    async fn recognize_tokens(&self, image: &Path) -> Result<Vec<OcrToken>, ConvertError> {
        let tsv = self.run(image, &["tsv"]).await?;
        let tokens = parse_tsv(&tsv);
        debug!("tesseract tsv: {} tokens from {}", tokens.len(), image.display());
        Ok(tokens)
    }
}

/// Parse tesseract TSV output into word tokens.
///
/// Columns: `level page_num block_num par_num line_num word_num left top
/// width height conf text`. Only word rows (level 5) with non-blank text are
/// kept; malformed rows are skipped.
pub fn parse_tsv(tsv: &str) -> Vec<OcrToken> {
    tsv.lines()
        .skip_while(|l| l.starts_with("level"))
        .filter_map(parse_tsv_row)
        .collect()
}

fn parse_tsv_row(row: &str) -> Option<OcrToken> {
    let cols: Vec<&str> = row.splitn(12, '\t').collect();
    if cols.len() < 12 || cols[0] != "5" {
        return None;
    }
    let text = cols[11].trim();
    if text.is_empty() {
        return None;
    }
    let num = |i: usize| cols[i].trim().parse::<i64>().ok();
    let line = LineKey::new(
        num(2)? as u32,
        num(3)? as u32,
        num(4)? as u32,
    );
    let bbox = BoundingBox::new(num(6)?, num(7)?, num(8)?, num(9)?);
    Some(OcrToken::new(text, bbox, line))
}
