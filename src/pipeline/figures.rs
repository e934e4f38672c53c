//! Figure location and extraction for the local OCR path.
//!
//! The local pipeline has no layout model, so figures are found through
//! their captions: a caption such as `图 3` sits directly below its image.
//! Scanning the OCR tokens for caption markers gives the caption box; the
//! crop then extends upward by a fixed allowance ([`FigureLayout`]).
//!
//! Caption numbers are unique per document: the first page that mentions
//! `图 3` as a caption owns figure 3, later mentions are ignored.

use crate::config::FigureLayout;
use crate::document::{BoundingBox, Figure, FigureMap};
use crate::error::ConvertError;
use crate::output::AssetDir;
use crate::pipeline::ocr::OcrToken;
use image::DynamicImage;
use tracing::{debug, info};

/// A caption found in one page's tokens.
#[derive(Debug, Clone, PartialEq)]
pub struct Caption {
    pub number: String,
    pub bbox: BoundingBox,
}

/// Pixel rectangle to crop, already clamped to the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl CropRegion {
    pub fn width(&self) -> u32 {
        self.right - self.left
    }

    pub fn height(&self) -> u32 {
        self.bottom - self.top
    }
}

/// Find caption markers in one page's tokens, in reading order.
///
/// Two shapes are recognised:
/// * the marker as its own token followed, on the same line, by a purely
///   numeric token; the caption box is the union of both tokens;
/// * a single token starting with the marker and carrying the number
///   (`图3`, `图 3：`), matched with `marker\s*(\d+)`.
pub fn locate_captions(tokens: &[OcrToken], marker: &str) -> Vec<Caption> {
    let mut captions = Vec::new();

    for (i, token) in tokens.iter().enumerate() {
        let text = token.text.trim();
        if text == marker {
            let number_token = tokens[i + 1..]
                .iter()
                .take_while(|t| t.line == token.line)
                .find(|t| is_numeric(t.text.trim()));
            if let Some(num) = number_token {
                captions.push(Caption {
                    number: num.text.trim().to_string(),
                    bbox: token.bbox.union(&num.bbox),
                });
            }
        } else if text.starts_with(marker) && text.len() > marker.len() {
            if let Some(number) = inline_caption_number(text, marker) {
                captions.push(Caption {
                    number,
                    bbox: token.bbox,
                });
            }
        }
    }
    captions
}

/// First `marker\s*(\d+)` occurrence in `text`.
fn inline_caption_number(text: &str, marker: &str) -> Option<String> {
    text.match_indices(marker).find_map(|(at, _)| {
        let digits: String = text[at + marker.len()..]
            .trim_start()
            .chars()
            .take_while(char::is_ascii_digit)
            .collect();
        (!digits.is_empty()).then_some(digits)
    })
}

fn is_numeric(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

/// Compute the crop for a caption on a `page_width × page_height` image.
///
/// Returns `None` when clamping leaves an empty rectangle.
pub fn crop_region(
    caption: &BoundingBox,
    page_width: u32,
    page_height: u32,
    layout: &FigureLayout,
    render_scale: f32,
) -> Option<CropRegion> {
    let allowance = (layout.figure_height_pt * render_scale).round() as i64;
    let (w, h) = (i64::from(page_width), i64::from(page_height));

    let top = (caption.top - allowance).clamp(0, h);
    let left = (caption.left - layout.side_margin_px).clamp(0, w);
    let right = (caption.right() + layout.side_margin_px).clamp(0, w);
    let bottom = (caption.bottom() + layout.bottom_margin_px).clamp(0, h);

    if right <= left || bottom <= top {
        return None;
    }
    Some(CropRegion {
        left: left as u32,
        top: top as u32,
        right: right as u32,
        bottom: bottom as u32,
    })
}

/// Locate, crop and save the figures of one page.
///
/// New figures are recorded in `figures`; captions whose number is already
/// mapped are skipped. Returns the figures created on this page.
pub fn extract_page_figures(
    page_num: usize,
    image: &DynamicImage,
    tokens: &[OcrToken],
    assets: &AssetDir,
    layout: &FigureLayout,
    render_scale: f32,
    figures: &mut FigureMap,
) -> Result<Vec<Figure>, ConvertError> {
    let mut created = Vec::new();

    for caption in locate_captions(tokens, &layout.marker) {
        if figures.contains(&caption.number) {
            debug!("Page {page_num}: figure {} already captured", caption.number);
            continue;
        }
        let Some(region) = crop_region(
            &caption.bbox,
            image.width(),
            image.height(),
            layout,
            render_scale,
        ) else {
            debug!("Page {page_num}: empty crop for figure {}", caption.number);
            continue;
        };

        let file_name = format!("fig{}.png", caption.number);
        let path = assets.ensure()?.join(&file_name);
        image
            .crop_imm(region.left, region.top, region.width(), region.height())
            .save(&path)
            .map_err(|e| ConvertError::OutputWriteFailed {
                path: path.clone(),
                source: std::io::Error::other(e.to_string()),
            })?;

        let rel = assets.relative(&file_name);
        info!("Page {page_num}: figure {} → {}", caption.number, rel);
        figures.insert(caption.number.clone(), rel.clone());
        created.push(Figure {
            caption_number: caption.number,
            page: page_num,
            caption_box: caption.bbox,
            image_path: rel,
        });
    }

    Ok(created)
}
