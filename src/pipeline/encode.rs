//! Image encoding: `DynamicImage` → PNG bytes for the model request.
//!
//! PNG is lossless, so box numbers and fine print survive; JPEG artefacts
//! around small digits measurably hurt extraction. Base64 wrapping happens in
//! each backend since their request bodies differ.

use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode one rasterised page as PNG.
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
