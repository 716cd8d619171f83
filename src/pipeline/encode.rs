//! Image encoding: rendered pages → PNG bytes, page images → base64.
//!
//! PDF pages come out of pdfium as `DynamicImage`s and are stored as PNG:
//! lossless compression keeps small comment text crisp, where JPEG artefacts
//! around glyphs measurably hurt the model's reading. Screenshots are never
//! re-encoded; their original bytes and MIME type go to the model as-is.

use super::rasterize::PageImage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a rendered page as PNG bytes.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    debug!(
        "Encoded {}x{} page → {} bytes PNG",
        img.width(),
        img.height(),
        buf.len()
    );
    Ok(buf)
}

/// Base64 of the page bytes, for JSON request bodies.
pub fn to_base64(page: &PageImage) -> String {
    STANDARD.encode(&page.data)
}

/// Wrap a page as an `edgequake_llm` image attachment.
///
/// `detail: "high"` keeps OpenAI-class models on the tiled high-resolution
/// path; in low-detail mode usernames and like counts are unreadable.
pub fn to_image_data(page: &PageImage) -> ImageData {
    ImageData::new(to_base64(page), page.mime_type.clone()).with_detail("high")
}
