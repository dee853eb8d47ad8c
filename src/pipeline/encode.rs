//! Image encoding: pages and scanned image files → base64 `ImageData`.
//!
//! Vision APIs accept images as base64 data embedded in the request body.
//! Rendered PDF pages are re-encoded as PNG (lossless, so small Thai
//! diacritics stay crisp). Image files that are already PNG or JPEG are sent
//! as-is after a format sniff.

use crate::error::FileError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use tracing::debug;

/// Encode a rasterised page as a base64 PNG ready for the vision API.
///
/// `detail: "high"` asks tiling models for the full tile budget; without it
/// fine print on deed stamps is lost.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded page → {} bytes base64", b64.len());

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

/// Wrap the bytes of a PNG or JPEG file without re-encoding.
///
/// The format is sniffed from the content, not the file name, so a `.jpg`
/// that is really a PNG is still labelled correctly.
pub fn encode_image_file(bytes: &[u8]) -> Result<ImageData, FileError> {
    let format = image::guess_format(bytes).map_err(|e| FileError::Unreadable {
        detail: format!("not a recognised image: {e}"),
    })?;

    let mime = match format {
        ImageFormat::Png => "image/png",
        ImageFormat::Jpeg => "image/jpeg",
        other => {
            return Err(FileError::Unreadable {
                detail: format!("image content is {other:?}, expected PNG or JPEG"),
            })
        }
    };

    let b64 = STANDARD.encode(bytes);
    debug!("Encoded {} file → {} bytes base64", mime, b64.len());
    Ok(ImageData::new(b64, mime).with_detail("high"))
}
