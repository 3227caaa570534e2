//! Shared fixtures for samgen-eye integration tests

#![allow(dead_code)]

use image::{Rgb, RgbImage};
use samgen_eye::{MaskLogits, MaskPredictor, SegmentError};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Segments by color: a point selects every pixel sharing its color.
/// Stands in for the ONNX model so tests need no weights.
pub struct ColorPredictor {
    image: Option<RgbImage>,
    pub embeds: Arc<AtomicUsize>,
    pub predicted_iou: f32,
}

impl ColorPredictor {
    pub fn new() -> Self {
        Self {
            image: None,
            embeds: Arc::new(AtomicUsize::new(0)),
            predicted_iou: 0.95,
        }
    }
}

impl MaskPredictor for ColorPredictor {
    fn set_image(&mut self, image: &RgbImage) -> Result<(), SegmentError> {
        self.embeds.fetch_add(1, Ordering::SeqCst);
        self.image = Some(image.clone());
        Ok(())
    }

    fn predict_point(&mut self, point: (f32, f32)) -> Result<Vec<MaskLogits>, SegmentError> {
        let image = self
            .image
            .as_ref()
            .ok_or_else(|| SegmentError::Processing("no image".to_string()))?;

        let x = (point.0 as u32).min(image.width() - 1);
        let y = (point.1 as u32).min(image.height() - 1);
        let target = *image.get_pixel(x, y);

        let logits = image
            .pixels()
            .map(|p| if *p == target { 10.0 } else { -10.0 })
            .collect();

        Ok(vec![MaskLogits {
            logits,
            predicted_iou: self.predicted_iou,
        }])
    }
}

pub const RED: Rgb<u8> = Rgb([220, 30, 30]);
pub const BLUE: Rgb<u8> = Rgb([30, 30, 220]);

/// 64x48 black image with a red square at (8,8)-(24,24) and a blue
/// square at (40,24)-(56,40)
pub fn two_squares() -> RgbImage {
    let mut image = RgbImage::new(64, 48);
    for y in 8..24 {
        for x in 8..24 {
            image.put_pixel(x, y, RED);
        }
    }
    for y in 24..40 {
        for x in 40..56 {
            image.put_pixel(x, y, BLUE);
        }
    }
    image
}

pub fn save(image: &RgbImage, dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    image.save(&path).unwrap();
    path
}
