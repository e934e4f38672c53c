//! Conversion entry points.
//!
//! [`convert`] wires the production backends (remote parser, tesseract,
//! pdfium, HTTP image fetcher) from the configuration; [`convert_with`] takes them
//! explicitly so tests and embedders can substitute their own. Both run the
//! same flow:
//!
//! ```text
//! resolve input ──▶ backend (remote | local) ──▶ BackendResult ──▶ finish
//!                                                                   │
//!                      normalise (remote) · HTML · write artifact ◀─┘
//! ```

use crate::config::{ConversionConfig, OcrBackend, OutputFormat};
use crate::document::{BackendResult, FigureMap, LocalResult, RemoteResult};
use crate::error::ConvertError;
use crate::output::{markdown_to_html, AssetDir, ConversionOutput, ConversionStats};
use crate::pipeline::images::{HttpImageFetcher, ImageFetcher, ImagePolicy};
use crate::pipeline::input::{self, DocumentKind, ResolvedInput};
use crate::pipeline::ocr::{OcrEngine, Tesseract};
use crate::pipeline::remote::{self, BaiduParser, DocumentParser};
use crate::pipeline::render::{PageRenderer, PdfiumRenderer};
use crate::pipeline::{figures, layout, normalize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// The collaborators a conversion talks to.
///
/// `parser` is optional because the remote backend needs credentials; a
/// remote conversion without one fails with
/// [`ConvertError::MissingCredentials`].
#[derive(Debug)]
pub struct Backends<P, O, F, R = PdfiumRenderer> {
    pub parser: Option<P>,
    pub ocr: O,
    pub fetcher: F,
    pub renderer: R,
}

/// Backends used by [`convert`].
pub type DefaultBackends = Backends<BaiduParser, Tesseract, HttpImageFetcher, PdfiumRenderer>;

impl DefaultBackends {
    /// Build the production backends described by `config`.
    pub fn from_config(config: &ConversionConfig) -> Result<Self, ConvertError> {
        let parser = config
            .credentials
            .clone()
            .map(|c| BaiduParser::new(&config.api_base, c, config.http_timeout_secs))
            .transpose()?;
        Ok(Self {
            parser,
            ocr: Tesseract::new(&config.tesseract_bin, &config.ocr_lang),
            fetcher: HttpImageFetcher::new(config.http_timeout_secs)?,
            renderer: PdfiumRenderer::new(config.render_scale, config.pdfium_lib_path.clone()),
        })
    }
}

/// Convert a document (path or inlined image) to Markdown.
///
/// When `config.output_path` is set the artifact is also written there; see
/// [`convert_to_file`].
///
/// # Errors
/// Any fatal [`ConvertError`]. Image references that cannot be fetched are
/// not fatal; they are reported in [`ConversionOutput::image_failures`].
pub async fn convert(
    input_str: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, ConvertError> {
    let backends = DefaultBackends::from_config(config)?;
    convert_with(input_str, config, &backends).await
}

/// [`convert`] with caller-supplied backends.
pub async fn convert_with<P, O, F, R>(
    input_str: impl AsRef<str>,
    config: &ConversionConfig,
    backends: &Backends<P, O, F, R>,
) -> Result<ConversionOutput, ConvertError>
where
    P: DocumentParser,
    O: OcrEngine,
    F: ImageFetcher,
    R: PageRenderer,
{
    let total_start = Instant::now();
    let input_str = input_str.as_ref();

    // ── Step 1: Resolve input ────────────────────────────────────────────
    let resolved = input::resolve_input(input_str, config).await?;
    let label = resolved.label();
    info!("Starting conversion: {} ({:?} backend)", label, config.backend);
    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_start(&label);
    }

    let output_path = config
        .output_path
        .as_deref()
        .map(|p| coerce_output_path(p, config.output_format));
    let assets = asset_dir(output_path.as_deref(), &resolved);

    // ── Step 2: Run the backend ──────────────────────────────────────────
    let backend_start = Instant::now();
    let mut stats = ConversionStats::default();
    let result = match config.backend {
        OcrBackend::Local => {
            stats.backend = "local".into();
            BackendResult::Local(
                run_local(&resolved, config, &backends.ocr, &backends.renderer, &assets).await?,
            )
        }
        OcrBackend::Remote => {
            stats.backend = "remote".into();
            let parser = backends
                .parser
                .as_ref()
                .ok_or(ConvertError::MissingCredentials)?;
            BackendResult::Remote(run_remote(&resolved, config, parser, &mut stats).await?)
        }
    };
    stats.backend_duration_ms = backend_start.elapsed().as_millis() as u64;

    // ── Step 3: Finish ───────────────────────────────────────────────────
    let mut output = finish(result, config, &backends.fetcher, &assets, &label, stats).await?;

    // ── Step 4: Write artifact ───────────────────────────────────────────
    if let Some(path) = output_path {
        output.output_path = Some(write_output(&path, output.content()).await?);
        info!("Wrote {}", path.display());
    }

    output.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
    info!(
        "Conversion complete: {} chars, {}ms total",
        output.markdown.len(),
        output.stats.total_duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_complete(output.markdown.len());
    }
    Ok(output)
}

/// Convert a document and write the artifact to `output_path`.
///
/// The extension is coerced to `.md`/`.html` when it is neither, parent
/// directories are created, and the file is written atomically (temp file
/// + rename).
pub async fn convert_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, ConvertError> {
    let mut config = config.clone();
    config.output_path = Some(output_path.as_ref().to_path_buf());
    convert(input_str, &config).await
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    input_str: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, ConvertError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ConvertError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(input_str, config))
}

// ── Backends ─────────────────────────────────────────────────────────────

async fn run_local<O: OcrEngine, R: PageRenderer>(
    resolved: &ResolvedInput,
    config: &ConversionConfig,
    ocr: &O,
    renderer: &R,
    assets: &AssetDir,
) -> Result<LocalResult, ConvertError> {
    let progress = config.progress_callback.as_ref();

    if resolved.kind == DocumentKind::Image {
        let text = ocr.recognize_text(&resolved.path).await?;
        if let Some(cb) = progress {
            cb.on_page_recognized(1, 1);
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(ConvertError::NoContent {
                input: resolved.label(),
            });
        }
        return Ok(LocalResult {
            markdown: layout::format_image_paragraphs(text),
            page_count: 1,
            figures: FigureMap::new(),
        });
    }

    let scratch = tempfile::TempDir::new()
        .map_err(|e| ConvertError::Internal(format!("tempdir: {e}")))?;
    let pages = renderer.render(&resolved.path, scratch.path()).await?;
    let total = pages.len();

    // Text first: an empty document never gets as far as writing figures.
    let mut texts = Vec::with_capacity(total);
    for page in &pages {
        let text = ocr.recognize_text(&page.png_path).await?;
        debug!("Page {}/{}: {} chars", page.page_num, total, text.len());
        texts.push(text);
        if let Some(cb) = progress {
            cb.on_page_recognized(page.page_num, total);
        }
    }
    let joined = texts.join("\n\n");
    if joined.trim().is_empty() {
        return Err(ConvertError::NoContent {
            input: resolved.label(),
        });
    }

    let mut figure_map = FigureMap::new();
    for page in pages {
        let tokens = ocr.recognize_tokens(&page.png_path).await?;
        let assets = assets.clone();
        let layout = config.figure_layout.clone();
        let scale = config.render_scale;
        let mut map = std::mem::take(&mut figure_map);

        figure_map = tokio::task::spawn_blocking(move || {
            figures::extract_page_figures(
                page.page_num,
                &page.image,
                &tokens,
                &assets,
                &layout,
                scale,
                &mut map,
            )
            .map(|_| map)
        })
        .await
        .map_err(|e| ConvertError::Internal(format!("Figure task panicked: {}", e)))??;
    }
    info!("Extracted {} figure(s) from {} page(s)", figure_map.len(), total);

    let markdown = layout::infer_pipe_tables(&joined);
    let markdown =
        layout::insert_figure_refs(&markdown, &figure_map, &config.figure_layout.marker)?;

    Ok(LocalResult {
        markdown: markdown.trim().to_string(),
        page_count: total,
        figures: figure_map,
    })
}

async fn run_remote<P: DocumentParser>(
    resolved: &ResolvedInput,
    config: &ConversionConfig,
    parser: &P,
    stats: &mut ConversionStats,
) -> Result<RemoteResult, ConvertError> {
    let bytes = tokio::fs::read(&resolved.path)
        .await
        .map_err(|e| ConvertError::Internal(format!("read {}: {e}", resolved.path.display())))?;

    match resolved.kind {
        DocumentKind::Image => {
            let text = parser.recognize_image(&bytes).await?;
            let text = text.trim();
            if text.is_empty() {
                return Err(ConvertError::NoContent {
                    input: resolved.label(),
                });
            }
            Ok(RemoteResult {
                markdown: layout::format_image_paragraphs(text),
                parse_result: None,
            })
        }
        DocumentKind::Pdf => {
            let run = remote::run_task(
                parser,
                &bytes,
                &resolved.file_name,
                &config.poll,
                config.progress_callback.as_ref(),
            )
            .await?;
            stats.task_id = Some(run.outcome.task_id.clone());
            stats.polls = run.polls;
            remote::fetch_remote_result(parser, &run.outcome, &resolved.label()).await
        }
    }
}

// ── Finishing ────────────────────────────────────────────────────────────

async fn finish<F: ImageFetcher>(
    result: BackendResult,
    config: &ConversionConfig,
    fetcher: &F,
    assets: &AssetDir,
    label: &str,
    mut stats: ConversionStats,
) -> Result<ConversionOutput, ConvertError> {
    let (markdown, image_failures, page_count, figure_count) = match result {
        BackendResult::Remote(remote) => {
            let policy = if config.inline_images {
                ImagePolicy::Inline
            } else {
                ImagePolicy::LocalDir(assets.clone())
            };
            let normalized = normalize::normalize(
                &remote.markdown,
                remote.parse_result.as_ref(),
                &policy,
                fetcher,
                config.label_max_chars,
                config.progress_callback.as_ref(),
            )
            .await;
            stats.tables_rebuilt = normalized.tables_rebuilt;
            stats.images_resolved = normalized.images_resolved;
            (normalized.markdown, normalized.image_failures, None, None)
        }
        BackendResult::Local(local) => (
            local.markdown,
            Vec::new(),
            Some(local.page_count),
            Some(local.figures.len()),
        ),
    };

    if markdown.trim().is_empty() {
        return Err(ConvertError::NoContent {
            input: label.to_string(),
        });
    }

    let html = match config.output_format {
        OutputFormat::Html => Some(markdown_to_html(&markdown)),
        OutputFormat::Markdown => None,
    };

    Ok(ConversionOutput {
        markdown,
        html,
        output_path: None,
        page_count,
        figure_count,
        image_failures,
        stats,
    })
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Keep `.md`/`.html` (any case); otherwise switch to the format's extension.
pub fn coerce_output_path(path: &Path, format: OutputFormat) -> PathBuf {
    let keep = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| matches!(e.to_ascii_lowercase().as_str(), "md" | "html"))
        .unwrap_or(false);
    if keep {
        path.to_path_buf()
    } else {
        path.with_extension(format.extension())
    }
}

/// Assets live next to the output file, else next to the input file.
fn asset_dir(output_path: Option<&Path>, resolved: &ResolvedInput) -> AssetDir {
    let anchor = output_path
        .or(resolved.source.as_deref())
        .unwrap_or_else(|| Path::new("document"));
    AssetDir::beside(anchor)
}

/// Write `content` to `path` atomically and return its absolute path.
async fn write_output(path: &Path, content: &str) -> Result<PathBuf, ConvertError> {
    let write_err = |source| ConvertError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = path.with_extension(format!("{ext}.tmp"));
    tokio::fs::write(&tmp_path, content).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;

    Ok(std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf()))
}
