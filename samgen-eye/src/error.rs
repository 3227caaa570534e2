//! Error types for samgen-eye

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SegmentError {
    #[error("Model error: {0}")]
    Model(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("ONNX Runtime error: {0}")]
    Ort(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl SegmentError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        SegmentError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

impl From<ort::Error> for SegmentError {
    fn from(err: ort::Error) -> Self {
        SegmentError::Ort(err.to_string())
    }
}

impl From<serde_json::Error> for SegmentError {
    fn from(err: serde_json::Error) -> Self {
        SegmentError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_error_display() {
        let err = SegmentError::Model("Test error".to_string());
        assert!(err.to_string().contains("Model error"));
        assert!(err.to_string().contains("Test error"));
    }

    #[test]
    fn test_segment_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let err: SegmentError = io_err.into();
        match err {
            SegmentError::Io(_) => {}
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_invalid_parameter_names_the_field() {
        let err = SegmentError::invalid("points_per_side", "must be at least 1");
        let msg = err.to_string();
        assert!(msg.contains("points_per_side"));
        assert!(msg.contains("must be at least 1"));
    }

    #[test]
    fn test_serialization_from_json() {
        let json_err = serde_json::from_str::<u32>("not json").unwrap_err();
        let err: SegmentError = json_err.into();
        assert!(matches!(err, SegmentError::Serialization(_)));
    }
}
