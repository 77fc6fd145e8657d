//! Image encoding: `DynamicImage` → PNG bytes, and page bytes → base64.
//!
//! PNG is lossless, so rendered text stays crisp. The OCR endpoints accept
//! images as base64 `data:` URIs embedded in the JSON request body.

use crate::document::PageImage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a rasterised page as PNG.
pub fn encode_png(img: &DynamicImage) -> Result<PageImage, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    debug!("Encoded {}x{} page → {} bytes PNG", img.width(), img.height(), buf.len());
    Ok(PageImage::png(buf))
}

/// Base64 payload of a page image.
pub fn to_base64(image: &PageImage) -> String {
    STANDARD.encode(&image.bytes)
}

/// `data:` URI for the `image_url` field of a chat-completions request.
pub fn to_data_uri(image: &PageImage) -> String {
    format!("data:{};base64,{}", image.mime_type, to_base64(image))
}
