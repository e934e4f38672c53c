//! PDF rasterisation for local OCR: every page is rendered with pdfium at a
//! fixed zoom and written as a PNG that tesseract can read.
//!
//! pdfium keeps thread-local state and is CPU-bound, so the whole document is
//! rendered inside `tokio::task::spawn_blocking`. The renderer sits behind
//! [`PageRenderer`] so the local pipeline can run on synthetic pages.

use crate::error::ConvertError;
use crate::pipeline::encode::encode_png;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming the pdfium shared library (file or directory).
pub const PDFIUM_LIB_ENV: &str = "PDFIUM_LIB_PATH";

/// One rasterised page.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// 1-indexed page number.
    pub page_num: usize,
    pub image: DynamicImage,
    /// PNG copy of `image` handed to the OCR engine.
    pub png_path: PathBuf,
}

/// Rasterises a PDF into page images.
#[allow(async_fn_in_trait)]
pub trait PageRenderer {
    /// Render every page, in page order, writing one PNG per page into
    /// `out_dir`.
    async fn render(&self, pdf: &Path, out_dir: &Path) -> Result<Vec<RenderedPage>, ConvertError>;
}

/// The pdfium renderer.
#[derive(Debug, Clone)]
pub struct PdfiumRenderer {
    scale: f32,
    lib_path: Option<PathBuf>,
}

impl PdfiumRenderer {
    pub fn new(scale: f32, lib_path: Option<PathBuf>) -> Self {
        Self { scale, lib_path }
    }
}

impl PageRenderer for PdfiumRenderer {
    async fn render(&self, pdf: &Path, out_dir: &Path) -> Result<Vec<RenderedPage>, ConvertError> {
        render_pages(pdf, self.scale, self.lib_path.as_deref(), out_dir).await
    }
}

/// Render every page of `pdf` at `scale` and write `page_NNNN.png` files
/// into `out_dir`.
pub async fn render_pages(
    pdf: &Path,
    scale: f32,
    lib_path: Option<&Path>,
    out_dir: &Path,
) -> Result<Vec<RenderedPage>, ConvertError> {
    let pdf = pdf.to_path_buf();
    let lib_path = lib_path.map(Path::to_path_buf);
    let out_dir = out_dir.to_path_buf();

    tokio::task::spawn_blocking(move || {
        render_pages_blocking(&pdf, scale, lib_path.as_deref(), &out_dir)
    })
    .await
    .map_err(|e| ConvertError::Internal(format!("Render task panicked: {}", e)))?
}

fn render_pages_blocking(
    pdf: &Path,
    scale: f32,
    lib_path: Option<&Path>,
    out_dir: &Path,
) -> Result<Vec<RenderedPage>, ConvertError> {
    let pdfium = bind_pdfium(lib_path)?;

    let document = pdfium
        .load_pdf_from_file(pdf, None)
        .map_err(|e| ConvertError::RasterisationFailed {
            page: 0,
            detail: format!("cannot open {}: {:?}", pdf.display(), e),
        })?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} pages, rendering at {}x", total_pages, scale);

    let render_config = PdfRenderConfig::new().scale_page_by_factor(scale);
    let mut rendered = Vec::with_capacity(total_pages);

    for idx in 0..total_pages {
        let page_num = idx + 1;
        let page = pages
            .get(idx as u16)
            .map_err(|e| ConvertError::RasterisationFailed {
                page: page_num,
                detail: format!("{:?}", e),
            })?;

        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            ConvertError::RasterisationFailed {
                page: page_num,
                detail: format!("{:?}", e),
            }
        })?;
        let image = bitmap.as_image();

        let png_path = out_dir.join(format!("page_{page_num:04}.png"));
        let png = encode_png(&image).map_err(|e| ConvertError::RasterisationFailed {
            page: page_num,
            detail: format!("PNG encoding failed: {e}"),
        })?;
        std::fs::write(&png_path, png).map_err(|source| ConvertError::OutputWriteFailed {
            path: png_path.clone(),
            source,
        })?;

        debug!(
            "Rendered page {} → {}x{} px",
            page_num,
            image.width(),
            image.height()
        );
        rendered.push(RenderedPage {
            page_num,
            image,
            png_path,
        });
    }

    Ok(rendered)
}

/// Bind pdfium from, in order: the configured path, [`PDFIUM_LIB_ENV`], the
/// system library search path. A directory is searched for the platform's
/// library file name.
pub fn bind_pdfium(lib_path: Option<&Path>) -> Result<Pdfium, ConvertError> {
    let explicit = lib_path
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(PDFIUM_LIB_ENV).map(PathBuf::from));

    let bindings = match &explicit {
        Some(path) => {
            let file = if path.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(path)
            } else {
                path.clone()
            };
            debug!("Binding pdfium from {}", file.display());
            Pdfium::bind_to_library(&file)
        }
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| ConvertError::ToolUnavailable {
        tool: "pdfium".into(),
        detail: format!("{:?}", e),
        hint: format!(
            "Install the pdfium shared library or point {PDFIUM_LIB_ENV} at it (file or directory)."
        ),
    })?;

    Ok(Pdfium::new(bindings))
}
