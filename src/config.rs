//! Configuration types for document-to-Markdown conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. Every heuristic constant the
//! reconstruction pipeline relies on (figure height allowance, crop margins,
//! label length threshold, poll cadence) lives here as a named field so it can
//! be tuned and tested without touching the algorithms that consume it.

use crate::error::ConvertError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default remote API host.
pub const DEFAULT_API_BASE: &str = "https://aip.baidubce.com";

/// Configuration for one conversion.
///
/// # Example
/// ```rust
/// use edgequake_ebook2md::{ConversionConfig, OcrBackend};
///
/// let config = ConversionConfig::builder()
///     .backend(OcrBackend::Local)
///     .ocr_lang("chi_sim+eng")
///     .build()
///     .unwrap();
/// assert_eq!(config.backend, OcrBackend::Local);
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Which backend recognises the document. Default: [`OcrBackend::Remote`].
    pub backend: OcrBackend,

    /// Final artifact format. Default: Markdown.
    pub output_format: OutputFormat,

    /// Destination file. When `None` the result is only returned in memory;
    /// assets (cropped figures, downloaded images) are then placed next to
    /// the input document.
    pub output_path: Option<PathBuf>,

    /// Embed remote images as data URIs (`true`, default) or download them
    /// into a `<stem>_images/` directory next to the output.
    pub inline_images: bool,

    /// API key / secret key pair for the remote backend.
    pub credentials: Option<Credentials>,

    /// Base URL of the remote API. Default: [`DEFAULT_API_BASE`].
    pub api_base: String,

    /// Poll cadence and wall-clock budget for the remote task.
    pub poll: PollPolicy,

    /// Zoom factor used when rasterising PDF pages for local OCR. Default: 2.0.
    ///
    /// Tesseract accuracy on CJK text drops sharply below ~150 DPI; a 2× zoom
    /// of a 72 pt/in page gives 144 DPI, which is the smallest scale that
    /// still reads captions reliably.
    pub render_scale: f32,

    /// Geometry used to crop figures above their captions.
    pub figure_layout: FigureLayout,

    /// Longest line (in characters) still treated as a diagram label when
    /// collapsing label runs under an image. Default: 28.
    pub label_max_chars: usize,

    /// Tesseract language pack(s). Default: `chi_sim`.
    pub ocr_lang: String,

    /// Tesseract binary. Default: `tesseract`.
    pub tesseract_bin: String,

    /// Calibre converter binary. Default: `ebook-convert`.
    pub ebook_convert_bin: String,

    /// Upper bound on a single `ebook-convert` run in seconds. Default: 300.
    pub ebook_convert_timeout_secs: u64,

    /// Per-request HTTP timeout in seconds. Default: 120.
    pub http_timeout_secs: u64,

    /// Explicit pdfium shared library. Falls back to `PDFIUM_LIB_PATH`, then
    /// the system library search path.
    pub pdfium_lib_path: Option<PathBuf>,

    /// Optional progress observer.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            backend: OcrBackend::default(),
            output_format: OutputFormat::default(),
            output_path: None,
            inline_images: true,
            credentials: None,
            api_base: DEFAULT_API_BASE.to_string(),
            poll: PollPolicy::default(),
            render_scale: 2.0,
            figure_layout: FigureLayout::default(),
            label_max_chars: 28,
            ocr_lang: "chi_sim".to_string(),
            tesseract_bin: "tesseract".to_string(),
            ebook_convert_bin: "ebook-convert".to_string(),
            ebook_convert_timeout_secs: 300,
            http_timeout_secs: 120,
            pdfium_lib_path: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("backend", &self.backend)
            .field("output_format", &self.output_format)
            .field("output_path", &self.output_path)
            .field("inline_images", &self.inline_images)
            .field("credentials", &self.credentials)
            .field("api_base", &self.api_base)
            .field("poll", &self.poll)
            .field("render_scale", &self.render_scale)
            .field("figure_layout", &self.figure_layout)
            .field("label_max_chars", &self.label_max_chars)
            .field("ocr_lang", &self.ocr_lang)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn backend(mut self, backend: OcrBackend) -> Self {
        self.config.backend = backend;
        self
    }

    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.output_format = format;
        self
    }

    pub fn output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.output_path = Some(path.into());
        self
    }

    pub fn inline_images(mut self, v: bool) -> Self {
        self.config.inline_images = v;
        self
    }

    pub fn credentials(mut self, api_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        self.config.credentials = Some(Credentials {
            api_key: api_key.into(),
            secret_key: secret_key.into(),
        });
        self
    }

    pub fn api_base(mut self, base: impl Into<String>) -> Self {
        self.config.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn poll(mut self, policy: PollPolicy) -> Self {
        self.config.poll = policy;
        self
    }

    pub fn render_scale(mut self, scale: f32) -> Self {
        self.config.render_scale = scale.clamp(0.5, 8.0);
        self
    }

    pub fn figure_layout(mut self, layout: FigureLayout) -> Self {
        self.config.figure_layout = layout;
        self
    }

    pub fn label_max_chars(mut self, n: usize) -> Self {
        self.config.label_max_chars = n;
        self
    }

    pub fn ocr_lang(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr_lang = lang.into();
        self
    }

    pub fn tesseract_bin(mut self, bin: impl Into<String>) -> Self {
        self.config.tesseract_bin = bin.into();
        self
    }

    pub fn ebook_convert_bin(mut self, bin: impl Into<String>) -> Self {
        self.config.ebook_convert_bin = bin.into();
        self
    }

    pub fn ebook_convert_timeout_secs(mut self, secs: u64) -> Self {
        self.config.ebook_convert_timeout_secs = secs;
        self
    }

    pub fn http_timeout_secs(mut self, secs: u64) -> Self {
        self.config.http_timeout_secs = secs;
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, ConvertError> {
        let c = &self.config;
        if c.poll.interval.is_zero() {
            return Err(ConvertError::InvalidConfig(
                "Poll interval must be greater than zero".into(),
            ));
        }
        if c.poll.max_wait < c.poll.interval {
            return Err(ConvertError::InvalidConfig(format!(
                "Max wait ({:?}) must be at least one poll interval ({:?})",
                c.poll.max_wait, c.poll.interval
            )));
        }
        if c.figure_layout.marker.trim().is_empty() {
            return Err(ConvertError::InvalidConfig(
                "Figure caption marker must not be empty".into(),
            ));
        }
        if c.ocr_lang.trim().is_empty() {
            return Err(ConvertError::InvalidConfig("OCR language must not be empty".into()));
        }
        Ok(self.config)
    }
}

// ── Enums & small structs ────────────────────────────────────────────────

/// Which recognition backend processes the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OcrBackend {
    /// Remote asynchronous document parser (tables, figures, layout). (default)
    #[default]
    Remote,
    /// Local tesseract OCR with heuristic figure extraction.
    Local,
}

/// Format of the final artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputFormat {
    #[default]
    Markdown,
    /// Markdown rendered to HTML.
    Html,
}

impl OutputFormat {
    /// File extension (without dot) for written artifacts.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Markdown => "md",
            OutputFormat::Html => "html",
        }
    }
}

/// Remote API credentials. The secret is never printed by `Debug`.
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub secret_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Cadence and budget of the remote status-poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Pause between status queries. Default: 5 s (the backend recommends
    /// polling 5–10 s after submission).
    pub interval: Duration,
    /// Wall-clock budget before giving up. Default: 120 s.
    pub max_wait: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_wait: Duration::from_secs(120),
        }
    }
}

/// Geometry of the caption-anchored figure crop.
///
/// Without a layout model, the crop relies on the convention that a figure's
/// caption sits directly below the image: the region extends upward from the
/// caption by a fixed allowance and sideways by a small margin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FigureLayout {
    /// Caption marker glyph. Default: `图`.
    pub marker: String,
    /// Vertical allowance above the caption, in PDF points (scaled by the
    /// render zoom). Default: 260.
    pub figure_height_pt: f32,
    /// Horizontal padding on both sides of the caption, in pixels. Default: 20.
    pub side_margin_px: i64,
    /// Padding below the caption, in pixels. Default: 10.
    pub bottom_margin_px: i64,
}

impl Default for FigureLayout {
    fn default() -> Self {
        Self {
            marker: "图".to_string(),
            figure_height_pt: 260.0,
            side_margin_px: 20,
            bottom_margin_px: 10,
        }
    }
}
