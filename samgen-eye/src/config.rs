//! Configuration for samgen-eye

use crate::error::SegmentError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Largest accepted resize width
const MAX_RESIZE_WIDTH: u32 = 16_384;
/// Largest accepted grid density
const MAX_POINTS_PER_SIDE: u32 = 256;
/// Each crop layer quadruples the number of crops
const MAX_CROP_LAYERS: u32 = 4;

/// Tuning parameters for a single prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionParams {
    /// Width the input image is resized to before inference
    pub resize_width: u32,
    /// Number of points sampled along one side of the image
    pub points_per_side: u32,
    /// Number of point prompts run before filtering
    pub points_per_batch: u32,
    /// Filtering threshold in [0,1] on the model's predicted mask quality
    pub pred_iou_thresh: f32,
    /// Filtering threshold in [0,1] on mask stability under cutoff changes
    pub stability_score_thresh: f32,
    /// Amount the cutoff is shifted when computing the stability score
    pub stability_score_offset: f32,
    /// Box IoU cutoff for non-maximal suppression within a crop
    pub box_nms_thresh: f32,
    /// Number of extra crop layers; layer i has (2^i)^2 crops
    pub crop_n_layers: u32,
    /// Box IoU cutoff for non-maximal suppression between crops
    pub crop_nms_thresh: f32,
    /// Fraction of the image length that first-layer crops overlap by
    pub crop_overlap_ratio: f32,
    /// Points per side in layer n are divided by this factor^n
    pub crop_n_points_downscale_factor: u32,
    /// Disconnected regions and holes below this area are cleaned up
    pub min_mask_region_area: u32,
}

impl Default for PredictionParams {
    fn default() -> Self {
        Self {
            resize_width: 1024,
            points_per_side: 32,
            points_per_batch: 64,
            pred_iou_thresh: 0.88,
            stability_score_thresh: 0.95,
            stability_score_offset: 1.0,
            box_nms_thresh: 0.7,
            crop_n_layers: 0,
            crop_nms_thresh: 0.7,
            crop_overlap_ratio: 512.0 / 1500.0,
            crop_n_points_downscale_factor: 1,
            min_mask_region_area: 0,
        }
    }
}

impl PredictionParams {
    /// Validate parameter ranges
    pub fn validate(&self) -> Result<(), SegmentError> {
        if self.resize_width == 0 || self.resize_width > MAX_RESIZE_WIDTH {
            return Err(SegmentError::invalid(
                "resize_width",
                format!("must be between 1 and {}", MAX_RESIZE_WIDTH),
            ));
        }
        if self.points_per_side == 0 || self.points_per_side > MAX_POINTS_PER_SIDE {
            return Err(SegmentError::invalid(
                "points_per_side",
                format!("must be between 1 and {}", MAX_POINTS_PER_SIDE),
            ));
        }
        if self.points_per_batch == 0 {
            return Err(SegmentError::invalid("points_per_batch", "must be at least 1"));
        }

        let unit_thresholds = [
            ("pred_iou_thresh", self.pred_iou_thresh),
            ("stability_score_thresh", self.stability_score_thresh),
            ("box_nms_thresh", self.box_nms_thresh),
            ("crop_nms_thresh", self.crop_nms_thresh),
        ];
        for (name, value) in unit_thresholds {
            if !(0.0..=1.0).contains(&value) {
                return Err(SegmentError::invalid(name, format!("{} is outside [0, 1]", value)));
            }
        }

        if !self.stability_score_offset.is_finite() || self.stability_score_offset < 0.0 {
            return Err(SegmentError::invalid(
                "stability_score_offset",
                "must be finite and non-negative",
            ));
        }
        if !(0.0..1.0).contains(&self.crop_overlap_ratio) {
            return Err(SegmentError::invalid(
                "crop_overlap_ratio",
                format!("{} is outside [0, 1)", self.crop_overlap_ratio),
            ));
        }
        if self.crop_n_layers > MAX_CROP_LAYERS {
            return Err(SegmentError::invalid(
                "crop_n_layers",
                format!("must be at most {}", MAX_CROP_LAYERS),
            ));
        }
        if self.crop_n_points_downscale_factor == 0 {
            return Err(SegmentError::invalid(
                "crop_n_points_downscale_factor",
                "must be at least 1",
            ));
        }

        Ok(())
    }
}

/// Execution provider for the ONNX sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProvider {
    Cpu,
    Cuda,
}

impl std::str::FromStr for ExecutionProvider {
    type Err = SegmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(ExecutionProvider::Cpu),
            "cuda" | "gpu" => Ok(ExecutionProvider::Cuda),
            other => Err(SegmentError::Config(format!("Unknown device: {}", other))),
        }
    }
}

/// Tensor names used by the exported encoder and decoder graphs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TensorNames {
    pub encoder_input: String,
    pub encoder_output: String,
    pub image_embeddings: String,
    pub point_coords: String,
    pub point_labels: String,
    pub mask_input: String,
    pub has_mask_input: String,
    pub orig_im_size: String,
    pub masks: String,
    pub iou_predictions: String,
}

impl Default for TensorNames {
    fn default() -> Self {
        Self {
            encoder_input: "input_image".to_string(),
            encoder_output: "image_embeddings".to_string(),
            image_embeddings: "image_embeddings".to_string(),
            point_coords: "point_coords".to_string(),
            point_labels: "point_labels".to_string(),
            mask_input: "mask_input".to_string(),
            has_mask_input: "has_mask_input".to_string(),
            orig_im_size: "orig_im_size".to_string(),
            masks: "masks".to_string(),
            iou_predictions: "iou_predictions".to_string(),
        }
    }
}

/// Model files and runtime settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Encoder graph; relative paths resolve against `SegmentConfig::model_dir`
    pub encoder_path: PathBuf,
    /// Decoder graph; relative paths resolve against `SegmentConfig::model_dir`
    pub decoder_path: PathBuf,
    pub encoder_url: Option<String>,
    pub decoder_url: Option<String>,
    /// Hex SHA-256 of the encoder file, verified after download when set
    pub encoder_checksum: Option<String>,
    pub decoder_checksum: Option<String>,
    pub device: ExecutionProvider,
    pub intra_threads: usize,
    pub tensor_names: TensorNames,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            encoder_path: PathBuf::from("sam_vit_h_encoder.onnx"),
            decoder_path: PathBuf::from("sam_vit_h_decoder.onnx"),
            encoder_url: None,
            decoder_url: None,
            encoder_checksum: None,
            decoder_checksum: None,
            device: ExecutionProvider::Cpu,
            intra_threads: num_cpus::get(),
            tensor_names: TensorNames::default(),
        }
    }
}

/// Segmentation service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentConfig {
    pub model: ModelConfig,
    /// Directory that downloaded and relative model files live in
    pub model_dir: PathBuf,
    /// Directory mask images are written to
    pub output_dir: PathBuf,
    /// Write `masks.json` with per-mask metadata next to the images
    pub write_manifest: bool,
    pub log_level: String,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        let model_dir = dirs::home_dir()
            .map(|mut p| {
                p.push(".samgen");
                p.push("models");
                p
            })
            .unwrap_or_else(|| PathBuf::from("./models"));

        Self {
            model: ModelConfig::default(),
            model_dir,
            output_dir: PathBuf::from("output_masks"),
            write_manifest: false,
            log_level: "info".to_string(),
        }
    }
}

impl SegmentConfig {
    /// Load configuration from a JSON, TOML or YAML file
    pub fn from_file(path: &Path) -> Result<Self, SegmentError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SegmentError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_str(&content)
    }

    /// Load configuration from a string in any supported format
    pub fn from_str(content: &str) -> Result<Self, SegmentError> {
        let json_err = match serde_json::from_str::<SegmentConfig>(content) {
            Ok(config) => return Ok(config),
            Err(e) => e,
        };

        // Well-formed JSON with bad values is a broken JSON config, not another format
        if json_err.is_data() {
            return Err(SegmentError::Config(format!(
                "Invalid JSON configuration: {}",
                json_err
            )));
        }

        let toml_err = match toml::from_str::<SegmentConfig>(content) {
            Ok(config) => return Ok(config),
            Err(e) => e,
        };

        let yaml_err = match serde_yaml::from_str::<SegmentConfig>(content) {
            Ok(config) => return Ok(config),
            Err(e) => e,
        };

        Err(SegmentError::Config(format!(
            "Unknown configuration format (JSON: {}; TOML: {}; YAML: {})",
            json_err,
            toml_err.message(),
            yaml_err
        )))
    }

    /// Apply `SAMGEN_*` environment overrides
    pub fn apply_env(&mut self) -> Result<(), SegmentError> {
        if let Ok(dir) = std::env::var("SAMGEN_MODEL_DIR") {
            self.model_dir = PathBuf::from(dir);
        }
        if let Ok(path) = std::env::var("SAMGEN_ENCODER") {
            self.model.encoder_path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("SAMGEN_DECODER") {
            self.model.decoder_path = PathBuf::from(path);
        }
        if let Ok(dir) = std::env::var("SAMGEN_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Ok(device) = std::env::var("SAMGEN_DEVICE") {
            self.model.device = device.parse()?;
        }
        if let Ok(level) = std::env::var("SAMGEN_LOG_LEVEL") {
            self.log_level = level;
        }
        Ok(())
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> Result<Self, SegmentError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Encoder path with `model_dir` applied to relative paths
    pub fn encoder_path(&self) -> PathBuf {
        self.resolve(&self.model.encoder_path)
    }

    /// Decoder path with `model_dir` applied to relative paths
    pub fn decoder_path(&self) -> PathBuf {
        self.resolve(&self.model.decoder_path)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.model_dir.join(path)
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), SegmentError> {
        if self.model.encoder_path.as_os_str().is_empty() {
            return Err(SegmentError::Config("Encoder path must be set".to_string()));
        }
        if self.model.decoder_path.as_os_str().is_empty() {
            return Err(SegmentError::Config("Decoder path must be set".to_string()));
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(SegmentError::Config("Output directory must be set".to_string()));
        }
        if self.model.intra_threads == 0 {
            return Err(SegmentError::Config("intra_threads must be at least 1".to_string()));
        }
        for checksum in [&self.model.encoder_checksum, &self.model.decoder_checksum]
            .into_iter()
            .flatten()
        {
            if checksum.len() != 64 || !checksum.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(SegmentError::Config(format!(
                    "Checksum must be 64 hex characters: {}",
                    checksum
                )));
            }
        }
        Ok(())
    }
}
