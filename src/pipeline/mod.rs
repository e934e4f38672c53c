//! Pipeline stages for document-to-Markdown conversion.
//!
//! Each submodule implements one transformation step and is tested on its
//! own. Backends sit behind traits ([`ocr::OcrEngine`],
//! [`remote::DocumentParser`], [`images::ImageFetcher`]) so every stage can
//! run against in-memory doubles.
//!
//! ## Data Flow
//!
//! ```text
//!               ┌─ remote ──▶ normalize (table · figures · labels · images)
//! input ──(ebook)┤
//!               └─ render ──▶ ocr ──▶ figures ──▶ layout
//! ```
//!
//! 1. [`input`]     — classify the input, decode inlined images
//! 2. [`ebook`]     — MOBI/EPUB → PDF via `ebook-convert`
//! 3. [`remote`]    — submit, poll and download the remote parse task
//! 4. [`normalize`] — ordered Markdown passes over the remote result, using
//!    [`table`] for spanning HTML tables and [`images`] for image references
//! 5. [`render`]    — rasterise pages with pdfium (`spawn_blocking`)
//! 6. [`ocr`]       — tesseract text and word boxes
//! 7. [`figures`]   — caption-anchored figure crops
//! 8. [`layout`]    — pipe-table inference, figure references, paragraphs
//!
//! [`encode`] holds the base64 / data-URI / PNG helpers shared by several
//! stages.

pub mod ebook;
pub mod encode;
pub mod figures;
pub mod images;
pub mod input;
pub mod layout;
pub mod normalize;
pub mod ocr;
pub mod remote;
pub mod render;
pub mod table;
