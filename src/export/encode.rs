//! JPEG encoding of snapshots and page images.
//!
//! Pages are embedded in the PDF as DCT streams, so the encoder output goes
//! into the document unchanged. JPEG has no alpha channel; images are
//! flattened to RGB first.

use crate::error::IntakeError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use tracing::debug;

/// Encode `img` as a baseline JPEG at `quality` (1–100).
pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, IntakeError> {
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100))
        .encode_image(&rgb)
        .map_err(|e| IntakeError::ExportFailed {
            detail: format!("JPEG encoding failed: {e}"),
        })?;
    debug!(
        "Encoded {}x{} image → {} bytes JPEG",
        img.width(),
        img.height(),
        buf.len()
    );
    Ok(buf)
}

/// `data:image/jpeg;base64,...` for inline previews.
pub fn jpeg_data_uri(jpeg: &[u8]) -> String {
    format!("data:image/jpeg;base64,{}", STANDARD.encode(jpeg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn encode_transparent_image() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 0])));
        let jpeg = encode_jpeg(&img, 95).expect("encode should succeed");
        // SOI marker
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&jpeg).expect("valid jpeg");
        assert_eq!((decoded.width(), decoded.height()), (10, 10));
    }

    #[test]
    fn data_uri_is_base64() {
        let uri = jpeg_data_uri(&[0xFF, 0xD8, 0xFF]);
        assert_eq!(uri, "data:image/jpeg;base64,/9j/");
    }
}
