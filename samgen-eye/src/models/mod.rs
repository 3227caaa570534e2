//! Model management and inference

pub mod manager;
pub mod sam;
pub mod transform;

use crate::error::SegmentError;
use image::RgbImage;

pub use manager::ModelManager;
pub use sam::SamOnnx;
pub use transform::ResizeLongestSide;

/// One candidate mask for a point prompt
#[derive(Debug, Clone)]
pub struct MaskLogits {
    /// Row-major logits at the resolution of the image passed to `set_image`
    pub logits: Vec<f32>,
    /// Model's own estimate of the mask's IoU with the true object
    pub predicted_iou: f32,
}

/// A promptable segmentation model.
///
/// `set_image` runs the heavy image encoder once; `predict_point` then
/// decodes masks for single foreground points against that embedding.
#[cfg_attr(test, mockall::automock)]
pub trait MaskPredictor: Send {
    fn set_image(&mut self, image: &RgbImage) -> Result<(), SegmentError>;

    /// Multimask output for a foreground point given in pixel coordinates
    /// of the current image
    fn predict_point(&mut self, point: (f32, f32)) -> Result<Vec<MaskLogits>, SegmentError>;
}
