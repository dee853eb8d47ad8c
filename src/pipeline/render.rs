//! PDF rasterisation: render every page of a deed PDF via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and does CPU-heavy work. `tokio::task::spawn_blocking` moves it onto
//! the blocking pool so Tokio workers never stall during rendering.
//!
//! ## Why cap pixels as well as DPI?
//!
//! Scanned deeds come in odd physical sizes. Scaling by `dpi / 72` gives a
//! consistent text size; `max_rendered_pixels` then caps the longest edge so
//! an oversized scan cannot blow up memory or the request body.

use crate::error::FileError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// Environment variable naming an explicit libpdfium to load.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// PDF points per inch.
const POINTS_PER_INCH: f32 = 72.0;

/// Rasterise every page of `pdf_path`, in page order.
///
/// # Errors
/// [`FileError::Unreadable`] when pdfium cannot open the file (corrupt,
/// password-protected, not a PDF, or libpdfium missing), [`FileError::RenderFailed`] when a
/// single page fails to render.
pub async fn render_pages(
    pdf_path: &Path,
    dpi: u32,
    max_pixels: u32,
) -> Result<Vec<DynamicImage>, FileError> {
    let path = pdf_path.to_path_buf();

    tokio::task::spawn_blocking(move || render_pages_blocking(&path, dpi, max_pixels))
        .await
        .map_err(|e| FileError::Unreadable {
            detail: format!("render task panicked: {e}"),
        })?
}

/// Load libpdfium from `PDFIUM_LIB_PATH` when set, else from the system paths.
fn bind_pdfium() -> Result<Pdfium, FileError> {
    let bindings = match std::env::var(PDFIUM_LIB_PATH_ENV) {
        Ok(path) if !path.is_empty() => Pdfium::bind_to_library(&path),
        _ => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| FileError::Unreadable {
        detail: format!(
            "pdfium library unavailable ({:?}); install libpdfium or set {}",
            e, PDFIUM_LIB_PATH_ENV
        ),
    })?;
    Ok(Pdfium::new(bindings))
}

fn render_pages_blocking(
    pdf_path: &Path,
    dpi: u32,
    max_pixels: u32,
) -> Result<Vec<DynamicImage>, FileError> {
    let pdfium = bind_pdfium()?;

    let document = pdfium.load_pdf_from_file(pdf_path, None).map_err(|e| {
        let err_str = format!("{:?}", e);
        let detail = if err_str.to_lowercase().contains("password") {
            "PDF is password-protected".to_string()
        } else {
            format!("cannot open PDF: {err_str}")
        };
        FileError::Unreadable { detail }
    })?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} pages", total_pages);

    if total_pages == 0 {
        return Err(FileError::Unreadable {
            detail: "PDF has no pages".to_string(),
        });
    }

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(dpi as f32 / POINTS_PER_INCH)
        .set_maximum_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut images = Vec::with_capacity(total_pages);
    for (idx, page) in pages.iter().enumerate() {
        let bitmap =
            page.render_with_config(&render_config)
                .map_err(|e| FileError::RenderFailed {
                    page: idx + 1,
                    detail: format!("{:?}", e),
                })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );
        images.push(image);
    }

    Ok(images)
}
