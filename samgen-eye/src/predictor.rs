//! Load-once, predict-many entry point

use crate::config::{PredictionParams, SegmentConfig};
use crate::error::SegmentError;
use crate::image_io::{load_image, resize_to_width};
use crate::models::{MaskPredictor, SamOnnx};
use crate::output::MaskWriter;
use crate::processing::{AutomaticMaskGenerator, MaskAnnotation};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tracing::info;

/// Holds a loaded model and turns images into mask files
pub struct SegmentPredictor {
    config: SegmentConfig,
    model: Mutex<Box<dyn MaskPredictor>>,
}

impl SegmentPredictor {
    /// Load the ONNX model once; every `predict` call reuses it
    pub fn setup(config: SegmentConfig) -> Result<Self, SegmentError> {
        config.validate()?;
        let model = SamOnnx::load(&config)?;
        info!("Segment predictor ready ({:?})", config.model.device);
        Ok(Self::with_model(config, Box::new(model)))
    }

    /// Use an already constructed model
    pub fn with_model(config: SegmentConfig, model: Box<dyn MaskPredictor>) -> Self {
        Self {
            config,
            model: Mutex::new(model),
        }
    }

    pub fn config(&self) -> &SegmentConfig {
        &self.config
    }

    /// Segment everything in `image_path` and write one image per mask.
    ///
    /// Returns the written paths in the generator's output order.
    pub fn predict(
        &self,
        image_path: &Path,
        params: &PredictionParams,
    ) -> Result<Vec<PathBuf>, SegmentError> {
        let annotations = self.generate(image_path, params)?;
        MaskWriter::new(&self.config.output_dir)
            .with_manifest(self.config.write_manifest)
            .write_all(&annotations)
    }

    /// Segment everything in `image_path` without writing anything
    pub fn generate(
        &self,
        image_path: &Path,
        params: &PredictionParams,
    ) -> Result<Vec<MaskAnnotation>, SegmentError> {
        params.validate()?;

        let image = load_image(image_path)?;
        let image = resize_to_width(&image, params.resize_width)?;
        info!(
            "Segmenting {:?} at {}x{}",
            image_path,
            image.width(),
            image.height()
        );

        // Predictions share one embedding cache, so they run one at a time
        let mut model = self.model.lock();
        let mut generator = AutomaticMaskGenerator::new(&mut **model, params)?;
        generator.generate(&image)
    }
}
