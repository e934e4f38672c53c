//! Input resolution: classify the user-supplied reference and produce a
//! file on disk that the backends can read.
//!
//! Accepted inputs are PDF, PNG/JPEG, MOBI/EPUB paths, and inlined images
//! (`data:image/...;base64,` URIs or bare base64 strings). Ebooks are
//! converted to PDF and inlined images are decoded to a temporary file; the
//! temporaries are owned by [`ResolvedInput`] and removed when it is dropped,
//! on success and failure alike.

use crate::config::ConversionConfig;
use crate::error::ConvertError;
use crate::pipeline::ebook::{ebook_to_pdf, ConvertedPdf};
use crate::pipeline::encode::decode_base64_payload;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, info};

static RE_BARE_BASE64: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9+/]+=*$").unwrap());

/// Bare base64 strings shorter than this are treated as paths.
const MIN_BARE_BASE64_LEN: usize = 50;

/// What the input reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Pdf,
    Image,
    Mobi,
    Epub,
}

impl InputKind {
    pub fn is_ebook(&self) -> bool {
        matches!(self, InputKind::Mobi | InputKind::Epub)
    }
}

/// `true` for `data:image…` URIs and long bare base64 strings.
pub fn is_inline_image(input: &str) -> bool {
    let s = input.trim();
    s.starts_with("data:image") || (s.len() > MIN_BARE_BASE64_LEN && RE_BARE_BASE64.is_match(s))
}

/// Classify `input` by payload shape, then by extension (case-insensitive).
pub fn detect_input_kind(input: &str) -> Option<InputKind> {
    if is_inline_image(input) {
        return Some(InputKind::Image);
    }
    let ext = Path::new(input.trim())
        .extension()?
        .to_str()?
        .to_ascii_lowercase();
    match ext.as_str() {
        "pdf" => Some(InputKind::Pdf),
        "png" | "jpg" | "jpeg" => Some(InputKind::Image),
        "mobi" => Some(InputKind::Mobi),
        "epub" => Some(InputKind::Epub),
        _ => None,
    }
}

/// Document type the backends receive after resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Image,
}

/// Temporaries backing a [`ResolvedInput`]; only their `Drop` matters.
#[derive(Debug)]
#[allow(dead_code)]
enum Scratch {
    None,
    Ebook(ConvertedPdf),
    Decoded(NamedTempFile),
}

/// A readable document on disk, plus any temporaries backing it.
#[derive(Debug)]
pub struct ResolvedInput {
    pub kind: DocumentKind,
    /// File the backends read.
    pub path: PathBuf,
    /// Name reported to the remote parser.
    pub file_name: String,
    /// The caller's file, when the input was a path.
    pub source: Option<PathBuf>,
    _scratch: Scratch,
}

impl ResolvedInput {
    /// Short label for logs and errors.
    pub fn label(&self) -> String {
        match &self.source {
            Some(p) => p.display().to_string(),
            None => "<inline image>".to_string(),
        }
    }
}

/// Resolve `input` into a document on disk.
pub async fn resolve_input(
    input: &str,
    config: &ConversionConfig,
) -> Result<ResolvedInput, ConvertError> {
    let kind = detect_input_kind(input).ok_or_else(|| ConvertError::UnsupportedInput {
        input: truncate(input),
    })?;

    if is_inline_image(input) {
        return decode_inline(input);
    }

    let path = PathBuf::from(input.trim());
    if !path.is_file() {
        return Err(ConvertError::FileNotFound { path });
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());

    match kind {
        InputKind::Mobi | InputKind::Epub => {
            let pdf = ebook_to_pdf(
                &config.ebook_convert_bin,
                &path,
                Duration::from_secs(config.ebook_convert_timeout_secs),
            )
            .await?;
            let pdf_name = pdf
                .path()
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "document.pdf".to_string());
            info!("Ebook {} resolved to {}", file_name, pdf.path().display());
            Ok(ResolvedInput {
                kind: DocumentKind::Pdf,
                path: pdf.path().to_path_buf(),
                file_name: pdf_name,
                source: Some(path),
                _scratch: Scratch::Ebook(pdf),
            })
        }
        InputKind::Pdf => {
            check_pdf_magic(&path)?;
            debug!("Resolved local PDF: {}", path.display());
            Ok(ResolvedInput {
                kind: DocumentKind::Pdf,
                path: path.clone(),
                file_name,
                source: Some(path),
                _scratch: Scratch::None,
            })
        }
        InputKind::Image => Ok(ResolvedInput {
            kind: DocumentKind::Image,
            path: path.clone(),
            file_name,
            source: Some(path),
            _scratch: Scratch::None,
        }),
    }
}

/// Decode an inlined image into a temporary file.
fn decode_inline(input: &str) -> Result<ResolvedInput, ConvertError> {
    let bytes = decode_base64_payload(input)?;
    let format = image::guess_format(&bytes).map_err(|e| ConvertError::UndecodableImage {
        detail: format!("not a recognised image: {e}"),
    })?;
    let ext = format.extensions_str().first().copied().unwrap_or("png");

    let mut file = tempfile::Builder::new()
        .prefix("ebook2md-inline-")
        .suffix(&format!(".{ext}"))
        .tempfile()
        .map_err(|e| ConvertError::Internal(format!("tempfile: {e}")))?;
    file.write_all(&bytes)
        .and_then(|_| file.flush())
        .map_err(|e| ConvertError::Internal(format!("tempfile write: {e}")))?;

    debug!("Inline image decoded to {}", file.path().display());
    Ok(ResolvedInput {
        kind: DocumentKind::Image,
        path: file.path().to_path_buf(),
        file_name: format!("image.{ext}"),
        source: None,
        _scratch: Scratch::Decoded(file),
    })
}

/// Reject files that do not start with `%PDF`.
fn check_pdf_magic(path: &Path) -> Result<(), ConvertError> {
    use std::io::Read;
    let mut magic = [0u8; 4];
    let read = std::fs::File::open(path).and_then(|mut f| f.read_exact(&mut magic));
    match read {
        Ok(()) if &magic == b"%PDF" => Ok(()),
        Ok(()) | Err(_) => Err(ConvertError::UnsupportedInput {
            input: format!("{} (missing %PDF header)", path.display()),
        }),
    }
}

fn truncate(input: &str) -> String {
    match input.char_indices().nth(80) {
        Some((at, _)) => format!("{}…", &input[..at]),
        None => input.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::encode::{encode_png, to_data_uri};
    use image::{DynamicImage, Rgb, RgbImage};

    fn png_bytes() -> Vec<u8> {
        encode_png(&DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([0, 0, 0])))).unwrap()
    }

    #[test]
    fn detects_by_extension() {
        assert_eq!(detect_input_kind("a/b/Book.PDF"), Some(InputKind::Pdf));
        assert_eq!(detect_input_kind("scan.jpeg"), Some(InputKind::Image));
        assert_eq!(detect_input_kind("novel.mobi"), Some(InputKind::Mobi));
        assert_eq!(detect_input_kind("novel.epub"), Some(InputKind::Epub));
        assert_eq!(detect_input_kind("notes.docx"), None);
        assert_eq!(detect_input_kind("README"), None);
        assert!(InputKind::Epub.is_ebook());
    }

    #[test]
    fn detects_inline_payloads() {
        assert!(is_inline_image("data:image/png;base64,AAAA"));
        assert!(is_inline_image(&"QUJD".repeat(20)));
        assert!(!is_inline_image("QUJD"));
        assert!(!is_inline_image("/tmp/some/file.png"));
    }

    #[tokio::test]
    async fn unsupported_extension_is_rejected() {
        let err = resolve_input("notes.docx", &ConversionConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::UnsupportedInput { .. }));
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let err = resolve_input("/definitely/missing/doc.pdf", &ConversionConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn non_pdf_content_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.pdf");
        std::fs::write(&path, b"<html>").unwrap();
        let err = resolve_input(path.to_str().unwrap(), &ConversionConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::UnsupportedInput { .. }));
    }

    #[tokio::test]
    async fn inline_image_is_decoded_and_cleaned_up() {
        let uri = to_data_uri(&png_bytes(), "image/png");
        let resolved = resolve_input(&uri, &ConversionConfig::default()).await.unwrap();
        assert_eq!(resolved.kind, DocumentKind::Image);
        assert!(resolved.source.is_none());
        assert_eq!(resolved.file_name, "image.png");
        let path = resolved.path.clone();
        assert!(path.is_file());
        drop(resolved);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn inline_garbage_is_undecodable() {
        let payload = "A".repeat(64);
        let err = resolve_input(&payload, &ConversionConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::UndecodableImage { .. }), "{err}");
    }
}
