//! SAM (Segment Anything Model) on ONNX Runtime

use crate::config::{ExecutionProvider, ModelConfig, SegmentConfig, TensorNames};
use crate::error::SegmentError;
use crate::models::transform::{ResizeLongestSide, ENCODER_INPUT_SIZE};
use crate::models::{MaskLogits, MaskPredictor};
use crate::utils::rgb_to_padded_chw;
use image::RgbImage;
use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

/// Side length of the low-resolution mask prompt the decoder accepts
const MASK_INPUT_SIZE: usize = 256;

/// Decoders exported with all mask tokens return the single-mask output first
const MULTIMASK_WITH_SINGLE: usize = 4;

/// Cached encoder output for the current image
struct ImageEmbedding {
    tensor: Tensor<f32>,
    /// (width, height) of the image the embedding was computed from
    orig_size: (u32, u32),
}

/// SAM split into an image encoder and a prompt decoder session
pub struct SamOnnx {
    encoder: Session,
    decoder: Session,
    names: TensorNames,
    transform: ResizeLongestSide,
    embedding: Option<ImageEmbedding>,
}

impl SamOnnx {
    /// Load encoder and decoder from the paths in `config`
    pub fn load(config: &SegmentConfig) -> Result<Self, SegmentError> {
        Self::new(&config.encoder_path(), &config.decoder_path(), &config.model)
    }

    pub fn new(
        encoder_path: &Path,
        decoder_path: &Path,
        model: &ModelConfig,
    ) -> Result<Self, SegmentError> {
        let encoder = build_session(encoder_path, model)?;
        info!("SAM encoder loaded from {:?}", encoder_path);

        let decoder = build_session(decoder_path, model)?;
        info!("SAM decoder loaded from {:?}", decoder_path);

        Ok(Self {
            encoder,
            decoder,
            names: model.tensor_names.clone(),
            transform: ResizeLongestSide::new(ENCODER_INPUT_SIZE),
            embedding: None,
        })
    }

    fn embedding(&self) -> Result<&ImageEmbedding, SegmentError> {
        self.embedding
            .as_ref()
            .ok_or_else(|| SegmentError::Processing("No image set before prompting".to_string()))
    }
}

impl MaskPredictor for SamOnnx {
    fn set_image(&mut self, image: &RgbImage) -> Result<(), SegmentError> {
        let started = Instant::now();
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(SegmentError::Processing("Cannot embed an empty image".to_string()));
        }

        let resized = self.transform.apply_image(image);
        let size = self.transform.target_length();
        let chw = rgb_to_padded_chw(&resized, size)?;

        let input = Tensor::from_array(([1usize, 3, size as usize, size as usize], chw))
            .map_err(|e| SegmentError::Ort(format!("Failed to create image tensor: {}", e)))?;

        let outputs = self
            .encoder
            .run(ort::inputs![self.names.encoder_input.as_str() => input])
            .map_err(|e| SegmentError::Ort(format!("SAM encoder failed: {}", e)))?;

        let output = outputs.get(self.names.encoder_output.as_str()).ok_or_else(|| {
            SegmentError::Model(format!("Encoder has no output '{}'", self.names.encoder_output))
        })?;
        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| SegmentError::Ort(format!("Failed to extract embeddings: {}", e)))?;

        let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
        let dims: [usize; 4] = dims.as_slice().try_into().map_err(|_| {
            SegmentError::Model(format!("Expected 4-D image embeddings, got {:?}", dims))
        })?;

        let tensor = Tensor::from_array((dims, data.to_vec()))
            .map_err(|e| SegmentError::Ort(format!("Failed to store embeddings: {}", e)))?;
        drop(outputs);

        self.embedding = Some(ImageEmbedding {
            tensor,
            orig_size: (width, height),
        });

        debug!(
            "Embedded {}x{} image in {:?}",
            width,
            height,
            started.elapsed()
        );
        Ok(())
    }

    fn predict_point(&mut self, point: (f32, f32)) -> Result<Vec<MaskLogits>, SegmentError> {
        let (width, height) = self.embedding()?.orig_size;
        let (px, py) = self.transform.apply_coords(point, (width, height));

        // A padding point labelled -1 stands in for the absent box prompt
        let coords = Tensor::from_array(([1usize, 2, 2], vec![px, py, 0.0, 0.0]))
            .map_err(|e| SegmentError::Ort(format!("Failed to create point tensor: {}", e)))?;
        let labels = Tensor::from_array(([1usize, 2], vec![1.0f32, -1.0]))
            .map_err(|e| SegmentError::Ort(format!("Failed to create label tensor: {}", e)))?;
        let mask_input = Tensor::from_array((
            [1usize, 1, MASK_INPUT_SIZE, MASK_INPUT_SIZE],
            vec![0.0f32; MASK_INPUT_SIZE * MASK_INPUT_SIZE],
        ))
        .map_err(|e| SegmentError::Ort(format!("Failed to create mask tensor: {}", e)))?;
        let has_mask = Tensor::from_array(([1usize], vec![0.0f32]))
            .map_err(|e| SegmentError::Ort(format!("Failed to create flag tensor: {}", e)))?;
        let orig_size = Tensor::from_array(([2usize], vec![height as f32, width as f32]))
            .map_err(|e| SegmentError::Ort(format!("Failed to create size tensor: {}", e)))?;

        let embedding = self
            .embedding
            .as_ref()
            .ok_or_else(|| SegmentError::Processing("No image set before prompting".to_string()))?;
        let names = &self.names;

        let outputs = self
            .decoder
            .run(ort::inputs![
                names.image_embeddings.as_str() => embedding.tensor.view(),
                names.point_coords.as_str() => coords,
                names.point_labels.as_str() => labels,
                names.mask_input.as_str() => mask_input,
                names.has_mask_input.as_str() => has_mask,
                names.orig_im_size.as_str() => orig_size,
            ])
            .map_err(|e| SegmentError::Ort(format!("SAM decoder failed: {}", e)))?;

        let masks = outputs
            .get(names.masks.as_str())
            .ok_or_else(|| SegmentError::Model(format!("Decoder has no output '{}'", names.masks)))?;
        let (mask_shape, mask_data) = masks
            .try_extract_tensor::<f32>()
            .map_err(|e| SegmentError::Ort(format!("Failed to extract masks: {}", e)))?;

        let scores = outputs.get(names.iou_predictions.as_str()).ok_or_else(|| {
            SegmentError::Model(format!("Decoder has no output '{}'", names.iou_predictions))
        })?;
        let (_, iou_data) = scores
            .try_extract_tensor::<f32>()
            .map_err(|e| SegmentError::Ort(format!("Failed to extract IoU scores: {}", e)))?;

        let dims: Vec<usize> = mask_shape.iter().map(|&d| d.max(0) as usize).collect();
        if dims.len() != 4 || dims[2] != height as usize || dims[3] != width as usize {
            return Err(SegmentError::Model(format!(
                "Decoder returned masks of shape {:?} for a {}x{} image",
                dims, width, height
            )));
        }

        let num_masks = dims[1];
        let plane = dims[2] * dims[3];
        if mask_data.len() < num_masks * plane || iou_data.len() < num_masks {
            return Err(SegmentError::Model("Decoder output is truncated".to_string()));
        }

        let first = if num_masks == MULTIMASK_WITH_SINGLE { 1 } else { 0 };
        let candidates = (first..num_masks)
            .map(|m| MaskLogits {
                logits: mask_data[m * plane..(m + 1) * plane].to_vec(),
                predicted_iou: iou_data[m],
            })
            .collect();

        Ok(candidates)
    }
}

fn build_session(path: &Path, model: &ModelConfig) -> Result<Session, SegmentError> {
    if !path.exists() {
        return Err(SegmentError::Model(format!(
            "Model file not found: {:?} (run `samgen download` or set the path in the config)",
            path
        )));
    }

    let builder = Session::builder()
        .map_err(|e| SegmentError::Ort(format!("Failed to create session builder: {}", e)))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| SegmentError::Ort(format!("Failed to set optimization level: {}", e)))?
        .with_intra_threads(model.intra_threads)
        .map_err(|e| SegmentError::Ort(format!("Failed to set thread count: {}", e)))?;

    let builder = match model.device {
        ExecutionProvider::Cpu => builder
            .with_execution_providers([CPUExecutionProvider::default().build()]),
        ExecutionProvider::Cuda => builder.with_execution_providers([CUDAExecutionProvider::default()
            .build()
            .error_on_failure()]),
    }
    .map_err(|e| SegmentError::Ort(format!("Failed to register {:?} provider: {}", model.device, e)))?;

    builder
        .commit_from_file(path)
        .map_err(|e| SegmentError::Ort(format!("Failed to load model {:?}: {}", path, e)))
}
