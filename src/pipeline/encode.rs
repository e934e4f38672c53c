//! Base64 helpers: data-URI construction and inlined-payload decoding.
//!
//! The remote parser takes documents as base64 form fields, resolved images
//! are embedded as `data:` URIs, and callers may hand in an image as a
//! base64 string or a `data:image/...;base64,` URI instead of a path.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use crate::error::ConvertError;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// `data:<mime>;base64,<payload>` for `raw`.
pub fn to_data_uri(raw: &[u8], mime: &str) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(raw))
}

/// Plain base64 of `raw`, as submitted in form bodies.
pub fn encode_bytes(raw: &[u8]) -> String {
    STANDARD.encode(raw)
}

/// Decode an inlined image payload.
///
/// Accepts a `data:image/...;base64,` URI or a bare base64 string;
/// surrounding whitespace and embedded line breaks are ignored.
pub fn decode_base64_payload(payload: &str) -> Result<Vec<u8>, ConvertError> {
    let trimmed = payload.trim();
    let body = match trimmed.strip_prefix("data:") {
        Some(rest) => rest
            .split_once(',')
            .map(|(_, data)| data)
            .ok_or_else(|| ConvertError::UndecodableImage {
                detail: "data URI has no ',' separator".into(),
            })?,
        None => trimmed,
    };
    let compact: String = body.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| ConvertError::UndecodableImage {
            detail: e.to_string(),
        })?;
    debug!("Decoded inlined image payload → {} bytes", bytes.len());
    Ok(bytes)
}

/// PNG-encode a rendered page or crop.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}
