//! Utility functions for tensor preparation

use crate::error::SegmentError;
use image::RgbImage;

/// Per-channel pixel mean the SAM encoder was trained with (0-255 scale)
pub const PIXEL_MEAN: [f32; 3] = [123.675, 116.28, 103.53];
/// Per-channel pixel std the SAM encoder was trained with (0-255 scale)
pub const PIXEL_STD: [f32; 3] = [58.395, 57.12, 57.375];

/// Convert an RGB image to a normalized `[3, size, size]` CHW tensor.
///
/// The image sits in the top-left corner; the remaining area is zero,
/// which is padding applied after normalization.
pub fn rgb_to_padded_chw(image: &RgbImage, size: u32) -> Result<Vec<f32>, SegmentError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(SegmentError::Processing("Image dimensions cannot be zero".to_string()));
    }
    if width > size || height > size {
        return Err(SegmentError::Processing(format!(
            "Image {}x{} does not fit the {}x{} input",
            width, height, size, size
        )));
    }

    let plane = (size as usize)
        .checked_mul(size as usize)
        .ok_or_else(|| SegmentError::Processing("Tensor size would overflow".to_string()))?;
    let mut chw = vec![0.0f32; plane * 3];

    for (x, y, pixel) in image.enumerate_pixels() {
        let offset = y as usize * size as usize + x as usize;
        for c in 0..3 {
            chw[c * plane + offset] = pixel[c] as f32;
        }
    }

    apply_sam_normalization(&mut chw, plane, width, height, size);
    Ok(chw)
}

/// Normalize the `width x height` top-left region of each CHW plane in place.
/// Non-finite results are replaced with 0.
fn apply_sam_normalization(data: &mut [f32], plane: usize, width: u32, height: u32, size: u32) {
    for c in 0..3 {
        let mean = PIXEL_MEAN[c];
        let std = PIXEL_STD[c];
        for y in 0..height as usize {
            let row = c * plane + y * size as usize;
            for value in &mut data[row..row + width as usize] {
                let v = (*value - mean) / std;
                *value = if v.is_finite() { v } else { 0.0 };
            }
        }
    }
}
