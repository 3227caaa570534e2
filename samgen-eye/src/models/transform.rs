//! Resizing images and prompts to the encoder's longest side

use image::imageops::{self, FilterType};
use image::RgbImage;

/// SAM encoder input resolution
pub const ENCODER_INPUT_SIZE: u32 = 1024;

/// Scales images so the longest side matches a target length, and maps
/// point coordinates into the resized frame.
#[derive(Debug, Clone, Copy)]
pub struct ResizeLongestSide {
    target_length: u32,
}

impl ResizeLongestSide {
    pub fn new(target_length: u32) -> Self {
        Self { target_length }
    }

    pub fn target_length(&self) -> u32 {
        self.target_length
    }

    /// `(width, height)` after scaling, rounding half up
    pub fn preprocess_shape(&self, width: u32, height: u32) -> (u32, u32) {
        let longest = width.max(height).max(1) as f64;
        let scale = self.target_length as f64 / longest;
        let new_w = (width as f64 * scale + 0.5) as u32;
        let new_h = (height as f64 * scale + 0.5) as u32;
        (new_w.max(1), new_h.max(1))
    }

    /// Bilinear resize to the preprocess shape
    pub fn apply_image(&self, image: &RgbImage) -> RgbImage {
        let (w, h) = self.preprocess_shape(image.width(), image.height());
        if (w, h) == image.dimensions() {
            return image.clone();
        }
        imageops::resize(image, w, h, FilterType::Triangle)
    }

    /// Map a point from an image of `orig` size into the resized frame
    pub fn apply_coords(&self, point: (f32, f32), orig: (u32, u32)) -> (f32, f32) {
        let (new_w, new_h) = self.preprocess_shape(orig.0, orig.1);
        let sx = new_w as f32 / orig.0.max(1) as f32;
        let sy = new_h as f32 / orig.1.max(1) as f32;
        (point.0 * sx, point.1 * sy)
    }
}

impl Default for ResizeLongestSide {
    fn default() -> Self {
        Self::new(ENCODER_INPUT_SIZE)
    }
}
