//! Image decoding and resizing

use crate::error::SegmentError;
use image::imageops::{self, FilterType};
use image::RgbImage;
use std::path::Path;
use tracing::debug;

/// Decode an image file into 8-bit RGB
pub fn load_image(path: &Path) -> Result<RgbImage, SegmentError> {
    if !path.is_file() {
        return Err(SegmentError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Input image not found: {:?}", path),
        )));
    }

    let image = image::open(path)?.to_rgb8();
    debug!("Loaded {:?} ({}x{})", path, image.width(), image.height());
    Ok(image)
}

/// Resize to `width`, keeping the aspect ratio. The height is truncated,
/// so very wide images can end up too flat to keep.
pub fn resize_to_width(image: &RgbImage, width: u32) -> Result<RgbImage, SegmentError> {
    let (orig_w, orig_h) = image.dimensions();
    if orig_w == 0 || orig_h == 0 {
        return Err(SegmentError::Processing("Input image is empty".to_string()));
    }
    if width == 0 {
        return Err(SegmentError::invalid("resize_width", "must be at least 1"));
    }

    let ratio = width as f64 / orig_w as f64;
    let height = (orig_h as f64 * ratio) as u32;
    if height == 0 {
        return Err(SegmentError::invalid(
            "resize_width",
            format!("{} would shrink a {}x{} image to zero height", width, orig_w, orig_h),
        ));
    }

    if (width, height) == (orig_w, orig_h) {
        return Ok(image.clone());
    }

    debug!("Resizing {}x{} -> {}x{}", orig_w, orig_h, width, height);
    Ok(imageops::resize(image, width, height, FilterType::Triangle))
}
