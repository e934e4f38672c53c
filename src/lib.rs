//! # edgequake-ebook2md
//!
//! Convert PDF, PNG/JPEG, EPUB and MOBI documents to Markdown (or HTML).
//!
//! ## Why this crate?
//!
//! Document-parsing services and OCR engines return lossy structure: tables
//! as flattened cell lists with an index matrix, figures as bare captions,
//! image links that expire. This crate reconstructs a coherent document from
//! that output: spanning HTML tables, cropped figures linked from the text
//! that mentions them, and self-contained image references.
//!
//! ## Pipeline Overview
//!
//! ```text
//! input
//!  │
//!  ├─ 1. Resolve   path / inlined image; EPUB & MOBI → PDF (ebook-convert)
//!  ├─ 2. Backend   remote parse task (submit → poll → download)
//!  │               or local OCR (pdfium render → tesseract → figure crops)
//!  ├─ 3. Rebuild   tables, figures, labels, image references
//!  └─ 4. Output    Markdown / HTML, optionally written atomically to disk
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_ebook2md::{convert, ConversionConfig, OcrBackend};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::builder()
//!         .backend(OcrBackend::Local)
//!         .ocr_lang("chi_sim+eng")
//!         .build()?;
//!     let output = convert("book.epub", &config).await?;
//!     println!("{}", output.markdown);
//!     eprintln!("figures: {:?}", output.figure_count);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `ebook2md` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-ebook2md = { version = "0.1", default-features = false }
//! ```
//!
//! ## External tools
//!
//! | Tool | Needed for |
//! |------|------------|
//! | `ebook-convert` (Calibre) | EPUB / MOBI input |
//! | `tesseract` + language data | `OcrBackend::Local` |
//! | pdfium shared library | `OcrBackend::Local` on PDFs (`PDFIUM_LIB_PATH`) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod document;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    ConversionConfig, ConversionConfigBuilder, Credentials, FigureLayout, OcrBackend,
    OutputFormat, PollPolicy,
};
pub use convert::{convert, convert_sync, convert_to_file, convert_with, Backends, DefaultBackends};
pub use document::{BackendResult, Figure, FigureMap, ParseResult};
pub use error::{ConvertError, ImageFailure};
pub use output::{markdown_to_html, ConversionOutput, ConversionStats};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
