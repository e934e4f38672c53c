//! Image reference resolution: remote image URLs → data URIs or local files.
//!
//! The remote parser's Markdown points at images hosted on its own storage,
//! behind URLs that expire. Each `<img src="…">` tag (and each Markdown image
//! whose target is an `http(s)` URL) is fetched once and rewritten either as
//! an inline `data:` URI or as a file in the document's assets directory.
//!
//! A failed fetch never aborts the document: the original reference is kept,
//! an HTML comment records the reason, and an [`ImageFailure`] is returned.

use crate::error::{ConvertError, ImageFailure};
use crate::output::AssetDir;
use crate::pipeline::encode::to_data_uri;
use crate::progress::ProgressCallback;
use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;
use std::time::Duration;
use tracing::{debug, info, warn};

/// `<img … src=… …>` (quoted or bare `src`, any other attributes) or
/// `![alt](url "title")`. Exactly one of groups 1–4 holds the URL.
static RE_IMAGE_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)<img\s(?:[^>]*?\s)?src\s*=\s*(?:"([^"]+)"|'([^']+)'|([^"'\s>]+))[^>]*>|!\[[^\]\n]*\]\((https?://[^)\s]+)(?:\s+"[^"\n]*")?\)"#,
    )
    .unwrap()
});

// ── Type sniffing ────────────────────────────────────────────────────────────

/// Image container detected from leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
    Gif,
    Bmp,
    Webp,
}

impl ImageKind {
    /// Detect the format from magic bytes; unknown data is treated as JPEG.
    pub fn sniff(raw: &[u8]) -> Self {
        if raw.starts_with(&[0xFF, 0xD8]) {
            ImageKind::Jpeg
        } else if raw.starts_with(b"\x89PNG\r\n\x1a\n") {
            ImageKind::Png
        } else if raw.starts_with(b"GIF87a") || raw.starts_with(b"GIF89a") {
            ImageKind::Gif
        } else if raw.starts_with(b"BM") {
            ImageKind::Bmp
        } else if raw.len() > 12 && raw.starts_with(b"RIFF") && &raw[8..12] == b"WEBP" {
            ImageKind::Webp
        } else {
            ImageKind::Jpeg
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            ImageKind::Jpeg => "image/jpeg",
            ImageKind::Png => "image/png",
            ImageKind::Gif => "image/gif",
            ImageKind::Bmp => "image/bmp",
            ImageKind::Webp => "image/webp",
        }
    }

    /// File extension including the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            ImageKind::Jpeg => ".jpg",
            ImageKind::Png => ".png",
            ImageKind::Gif => ".gif",
            ImageKind::Bmp => ".bmp",
            ImageKind::Webp => ".webp",
        }
    }
}

// ── Fetching ─────────────────────────────────────────────────────────────────

/// Retrieves the raw bytes behind an image URL.
///
/// The error is a human-readable reason; it ends up in the Markdown comment
/// and in [`ImageFailure::reason`].
#[allow(async_fn_in_trait)]
pub trait ImageFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, String>;
}

/// Plain HTTP GET through a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpImageFetcher {
    client: reqwest::Client,
}

impl HttpImageFetcher {
    pub fn new(timeout_secs: u64) -> Result<Self, ConvertError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ConvertError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, String> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                "request timed out".to_string()
            } else {
                e.to_string()
            }
        })?;
        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status()));
        }
        let bytes = response.bytes().await.map_err(|e| e.to_string())?;
        Ok(bytes.to_vec())
    }
}

// ── Resolution ───────────────────────────────────────────────────────────────

/// Where fetched images end up.
#[derive(Debug, Clone)]
pub enum ImagePolicy {
    /// Embed as `data:<mime>;base64,…`.
    Inline,
    /// Write `{n}{ext}` files into the assets directory and link them.
    LocalDir(AssetDir),
}

/// Markdown with image references rewritten, plus what went wrong.
#[derive(Debug, Clone, Default)]
pub struct ResolvedImages {
    pub markdown: String,
    pub failures: Vec<ImageFailure>,
    /// References successfully rewritten.
    pub resolved: usize,
}

/// Rewrite every remote image reference in `markdown` according to `policy`.
///
/// Only the URL is replaced: the `src` value of an `<img>` tag, the target of
/// a Markdown image. References are processed in document order; local files
/// are numbered sequentially from 0 across successful fetches. Text between
/// references is copied unchanged, so a document without remote images is
/// returned as is.
pub async fn resolve_images<F: ImageFetcher>(
    markdown: &str,
    policy: &ImagePolicy,
    fetcher: &F,
    progress: Option<&ProgressCallback>,
) -> ResolvedImages {
    let refs: Vec<ImageRef> = RE_IMAGE_REF
        .captures_iter(markdown)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let url = (1..=4).find_map(|i| caps.get(i))?;
            Some(ImageRef {
                whole: whole.range(),
                url_span: url.range(),
                url: url.as_str().trim().to_string(),
            })
        })
        .filter(|r| is_remote(&r.url))
        .collect();

    if refs.is_empty() {
        return ResolvedImages {
            markdown: markdown.to_string(),
            ..Default::default()
        };
    }
    info!("Resolving {} image reference(s)", refs.len());

    let mut out = String::with_capacity(markdown.len());
    let mut failures = Vec::new();
    let mut resolved = 0;
    let mut next_index = 0usize;
    let mut last = 0;

    for ImageRef { whole, url_span, url } in refs {
        out.push_str(&markdown[last..whole.start]);
        let original = &markdown[whole.clone()];
        last = whole.end;

        match materialise(&url, policy, fetcher, &mut next_index).await {
            Ok(target) => {
                debug!("Image {url} → {}", preview(&target));
                out.push_str(&markdown[whole.start..url_span.start]);
                out.push_str(&target);
                out.push_str(&markdown[url_span.end..whole.end]);
                resolved += 1;
                if let Some(cb) = progress {
                    cb.on_image_resolved(&url, true);
                }
            }
            Err(reason) => {
                warn!("Image download failed for {url}: {reason}");
                out.push_str(original);
                out.push_str(&format!("  <!-- image download failed: {reason} -->"));
                if let Some(cb) = progress {
                    cb.on_image_resolved(&url, false);
                }
                failures.push(ImageFailure { url, reason });
            }
        }
    }
    out.push_str(&markdown[last..]);

    ResolvedImages {
        markdown: out,
        failures,
        resolved,
    }
}

/// One remote reference: the whole tag or link, and the URL inside it.
struct ImageRef {
    whole: Range<usize>,
    url_span: Range<usize>,
    url: String,
}

/// Fetch one image and return the new link target.
async fn materialise<F: ImageFetcher>(
    url: &str,
    policy: &ImagePolicy,
    fetcher: &F,
    next_index: &mut usize,
) -> Result<String, String> {
    let raw = fetcher.fetch(url).await?;
    let kind = ImageKind::sniff(&raw);
    match policy {
        ImagePolicy::Inline => Ok(to_data_uri(&raw, kind.mime())),
        ImagePolicy::LocalDir(assets) => {
            let file_name = format!("{}{}", *next_index, kind.extension());
            *next_index += 1;
            let dir = assets.ensure().map_err(|e| e.to_string())?;
            tokio::fs::write(dir.join(&file_name), &raw)
                .await
                .map_err(|e| e.to_string())?;
            Ok(assets.relative(&file_name))
        }
    }
}

fn is_remote(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn preview(target: &str) -> &str {
    match target.char_indices().nth(48) {
        Some((at, _)) => &target[..at],
        None => target,
    }
}
