//! Slice one tall snapshot into page-sized bands.
//!
//! With `r = W / page.width`, a page holds `page.height * r` source pixels.
//! An image whose scaled height fits on one page yields exactly one page;
//! otherwise bands of that many pixels are cut top to bottom, the last one
//! possibly shorter. Band boundaries are rounded from exact `f64` offsets so
//! coverage has no gap or overlap and the pixel heights sum to `H`.

use crate::config::PageGeometry;
use crate::error::IntakeError;
use image::DynamicImage;
use tracing::debug;

/// One horizontal band of the source image, in source pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    pub y: u32,
    pub height: u32,
    /// Height on the page in points (`height / r`).
    pub rendered_height: f64,
}

/// A page image plus its placement size in points.
#[derive(Debug, Clone)]
pub struct PageImage {
    pub image: DynamicImage,
    pub width: f64,
    pub height: f64,
}

/// Compute the bands for a `width`×`height` image. Both dimensions must be
/// non-zero, and the page must have a finite, positive size.
pub fn plan_bands(width: u32, height: u32, page: PageGeometry) -> Result<Vec<Band>, IntakeError> {
    page.check()?;
    let ratio = width as f64 / page.width;
    let rendered_total = height as f64 / ratio;

    if rendered_total <= page.height {
        return Ok(vec![Band {
            y: 0,
            height,
            rendered_height: rendered_total,
        }]);
    }

    let per_page = page.height * ratio;
    if !per_page.is_finite() || per_page <= 0.0 {
        return Err(IntakeError::InvalidConfig(format!(
            "page of {}x{} pt cannot hold a band of a {width} px wide image",
            page.width, page.height
        )));
    }
    let mut bands = Vec::new();
    let mut offset = 0.0_f64;
    loop {
        let start = offset.round() as u32;
        if start >= height {
            break;
        }
        let end = ((offset + per_page).round() as u32).min(height);
        if end > start {
            let h = end - start;
            bands.push(Band {
                y: start,
                height: h,
                rendered_height: h as f64 / ratio,
            });
        }
        offset += per_page;
    }
    Ok(bands)
}

/// Cut `image` into page images sized for `page`.
pub fn paginate(image: &DynamicImage, page: PageGeometry) -> Result<Vec<PageImage>, IntakeError> {
    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
        return Err(IntakeError::InvalidImage { width, height });
    }

    let bands = plan_bands(width, height, page)?;
    debug!(
        "Paginating {}x{} snapshot into {} page(s)",
        width,
        height,
        bands.len()
    );

    Ok(bands
        .into_iter()
        .map(|band| {
            let slice = if band.y == 0 && band.height == height {
                image.clone()
            } else {
                image.crop_imm(0, band.y, width, band.height)
            };
            PageImage {
                image: slice,
                width: page.width,
                height: band.rendered_height,
            }
        })
        .collect())
}
