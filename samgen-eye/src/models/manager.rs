//! Model manager with auto-download functionality

use crate::config::SegmentConfig;
use crate::error::SegmentError;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Largest model file accepted from a download
const MAX_MODEL_SIZE: usize = 4_000_000_000;
/// Anything smaller is an error page, not a graph
const MIN_MODEL_SIZE: usize = 1024;
const DOWNLOAD_TIMEOUT_SECS: u64 = 3600;

/// Resolved encoder and decoder files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFiles {
    pub encoder: PathBuf,
    pub decoder: PathBuf,
}

/// Locates model files and downloads the missing ones
pub struct ModelManager {
    config: Arc<SegmentConfig>,
}

impl ModelManager {
    pub fn new(config: Arc<SegmentConfig>) -> Self {
        Self { config }
    }

    /// Ensure model directory exists
    pub fn ensure_model_dir(&self) -> Result<PathBuf, SegmentError> {
        let model_dir = &self.config.model_dir;
        if !model_dir.exists() {
            fs::create_dir_all(model_dir).map_err(|e| {
                SegmentError::Io(std::io::Error::new(
                    e.kind(),
                    format!("Failed to create model directory {:?}: {}", model_dir, e),
                ))
            })?;
            info!("Created model directory: {:?}", model_dir);
        }
        Ok(model_dir.clone())
    }

    /// Encoder and decoder paths, downloading either one when it is missing
    /// and a URL is configured
    pub async fn resolve(&self) -> Result<ModelFiles, SegmentError> {
        let model = &self.config.model;
        let encoder = self
            .resolve_one(
                &self.config.encoder_path(),
                model.encoder_url.as_deref(),
                model.encoder_checksum.as_deref(),
            )
            .await?;
        let decoder = self
            .resolve_one(
                &self.config.decoder_path(),
                model.decoder_url.as_deref(),
                model.decoder_checksum.as_deref(),
            )
            .await?;
        Ok(ModelFiles { encoder, decoder })
    }

    async fn resolve_one(
        &self,
        path: &Path,
        url: Option<&str>,
        checksum: Option<&str>,
    ) -> Result<PathBuf, SegmentError> {
        if path.exists() {
            return Ok(path.to_path_buf());
        }

        let url = url.ok_or_else(|| {
            SegmentError::Model(format!("Model file {:?} is missing and no URL is configured", path))
        })?;

        let escapes = path
            .components()
            .any(|c| matches!(c, Component::ParentDir));
        if escapes || !path.starts_with(&self.config.model_dir) {
            return Err(SegmentError::Model(format!(
                "Downloads only go into the model directory, not {:?}",
                path
            )));
        }

        self.download_to(path, url, checksum.unwrap_or("")).await
    }

    /// Download model if not present
    pub async fn ensure_model(
        &self,
        model_name: &str,
        url: &str,
        checksum: &str,
    ) -> Result<PathBuf, SegmentError> {
        if model_name.is_empty() || model_name.len() > 255 {
            return Err(SegmentError::Model("Invalid model name".to_string()));
        }

        if model_name.contains("..") || model_name.contains('/') || model_name.contains('\\') {
            return Err(SegmentError::Model(
                "Model name contains invalid characters".to_string(),
            ));
        }

        let model_path = self.config.model_dir.join(model_name);
        self.download_to(&model_path, url, checksum).await
    }

    /// Fetch `url` into exactly `model_path` unless the file already exists
    async fn download_to(
        &self,
        model_path: &Path,
        url: &str,
        checksum: &str,
    ) -> Result<PathBuf, SegmentError> {
        if url.is_empty() || url.len() > 2048 {
            return Err(SegmentError::Model("Invalid URL".to_string()));
        }

        if !url.starts_with("https://") {
            return Err(SegmentError::Model(
                "Only HTTPS URLs are allowed for model downloads".to_string(),
            ));
        }

        if model_path.exists() {
            info!("Model already exists at {:?}", model_path);
            return Ok(model_path.to_path_buf());
        }

        self.ensure_model_dir()?;
        if let Some(parent) = model_path.parent() {
            fs::create_dir_all(parent)?;
        }

        info!("Downloading model {:?} from {}", model_path, url);

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
            .build()?;

        let response = client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(SegmentError::Model(format!(
                "Failed to download model: HTTP {}",
                response.status()
            )));
        }

        if let Some(content_length) = response.content_length() {
            if content_length > MAX_MODEL_SIZE as u64 {
                return Err(SegmentError::Model(format!(
                    "Model too large: {} bytes (max {} bytes)",
                    content_length, MAX_MODEL_SIZE
                )));
            }
        }

        let bytes = response.bytes().await?;

        if bytes.len() > MAX_MODEL_SIZE {
            return Err(SegmentError::Model(format!(
                "Downloaded model too large: {} bytes (max {} bytes)",
                bytes.len(),
                MAX_MODEL_SIZE
            )));
        }

        if bytes.len() < MIN_MODEL_SIZE {
            return Err(SegmentError::Model(
                "Downloaded file too small, likely corrupted".to_string(),
            ));
        }

        if !checksum.is_empty() {
            let computed = sha256_hex(&bytes);
            if !computed.eq_ignore_ascii_case(checksum) {
                return Err(SegmentError::Model(format!(
                    "Checksum mismatch for {:?}: expected {}, got {}",
                    model_path, checksum, computed
                )));
            }
            info!("Verified checksum for {:?}", model_path);
        } else {
            warn!(
                "Downloaded {} bytes for {:?} without checksum verification",
                bytes.len(),
                model_path
            );
        }

        // Write to a temp file first so a partial download never looks like a model
        let temp_path = model_path.with_extension("tmp");
        fs::write(&temp_path, &bytes)?;

        if let Err(e) = fs::rename(&temp_path, model_path) {
            let _ = fs::remove_file(&temp_path);
            return Err(SegmentError::Io(e));
        }

        info!("Model saved to {:?}", model_path);
        Ok(model_path.to_path_buf())
    }
}

/// Lowercase hex SHA-256 digest
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager_in(dir: &Path) -> ModelManager {
        let mut config = SegmentConfig::default();
        config.model_dir = dir.to_path_buf();
        ModelManager::new(Arc::new(config))
    }

    #[test]
    fn test_model_manager_ensure_model_dir() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("a").join("b");
        let manager = manager_in(&nested);

        let result = manager.ensure_model_dir();
        assert!(result.is_ok());
        assert!(nested.exists());

        // Should be idempotent
        assert!(manager.ensure_model_dir().is_ok());
    }

    #[tokio::test]
    async fn test_model_manager_ensure_model_invalid_name() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager_in(temp_dir.path());

        let result = manager.ensure_model("", "https://example.com/model.onnx", "").await;
        assert!(result.is_err());

        let result = manager.ensure_model("../evil", "https://example.com/model.onnx", "").await;
        assert!(result.is_err());

        let result = manager.ensure_model("model/name", "https://example.com/model.onnx", "").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_model_manager_ensure_model_invalid_url() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager_in(temp_dir.path());

        let result = manager.ensure_model("model.onnx", "", "").await;
        assert!(result.is_err());

        let result = manager.ensure_model("model.onnx", "http://example.com/model.onnx", "").await;
        assert!(result.is_err());

        let result = manager.ensure_model("model.onnx", "ftp://example.com/model.onnx", "").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_ensure_model_existing_file_skips_download() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager_in(temp_dir.path());
        let existing = temp_dir.path().join("enc.onnx");
        fs::write(&existing, b"graph").unwrap();

        let path = manager
            .ensure_model("enc.onnx", "https://invalid.invalid/enc.onnx", "")
            .await
            .unwrap();
        assert_eq!(path, existing);
    }

    #[tokio::test]
    async fn test_resolve_uses_existing_files() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager_in(temp_dir.path());
        fs::write(temp_dir.path().join("sam_vit_h_encoder.onnx"), b"e").unwrap();
        fs::write(temp_dir.path().join("sam_vit_h_decoder.onnx"), b"d").unwrap();

        let files = manager.resolve().await.unwrap();
        assert_eq!(files.encoder, temp_dir.path().join("sam_vit_h_encoder.onnx"));
        assert_eq!(files.decoder, temp_dir.path().join("sam_vit_h_decoder.onnx"));
    }

    #[tokio::test]
    async fn test_resolve_missing_without_url() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager_in(temp_dir.path());

        match manager.resolve().await {
            Err(SegmentError::Model(msg)) => assert!(msg.contains("no URL")),
            other => panic!("Expected Model error, got {:?}", other),
        }
    }

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
