//! samgen-eye: automatic mask generation with Segment Anything
//!
//! Loads the SAM image encoder and prompt decoder once, prompts them with a
//! grid of points over the image (and optionally over overlapping crops),
//! filters and deduplicates the resulting masks, and writes each surviving
//! mask as a white-on-black image.

pub mod config;
pub mod error;
pub mod image_io;
pub mod models;
pub mod output;
pub mod predictor;
pub mod processing;
mod utils;

pub use config::{ExecutionProvider, ModelConfig, PredictionParams, SegmentConfig};
pub use error::SegmentError;
pub use models::{MaskLogits, MaskPredictor};
pub use output::MaskWriter;
pub use predictor::SegmentPredictor;
pub use processing::{AutomaticMaskGenerator, MaskAnnotation};
