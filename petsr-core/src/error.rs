//! Error types for petsr
//!
//! Error taxonomy covering the dataset catalog, image decoding,
//! tensor shapes, configuration and the prefetch pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Primary error type for all petsr operations
#[derive(Debug, Error)]
pub enum PipelineError {
    // ========== Catalog Errors ==========

    /// Dataset directory or one of its required parts is missing
    #[error("Dataset not found at {path}: {reason}")]
    DatasetNotFound { path: PathBuf, reason: String },

    /// Annotation line could not be parsed
    #[error("Malformed annotation {file}:{line}: {reason}")]
    AnnotationParse { file: PathBuf, line: usize, reason: String },

    /// Split size differs from the published count
    #[error("Split {split} has {actual} records, expected {expected}")]
    CountMismatch { split: String, expected: usize, actual: usize },

    /// Unknown split name
    #[error("Unknown split: {name}")]
    UnknownSplit { name: String },

    // ========== Image Errors ==========

    /// Image file could not be read
    #[error("Failed to read image {path}: {source}")]
    ImageRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Image bytes could not be decoded
    #[error("Failed to decode image {name}: {reason}")]
    ImageDecode { name: String, reason: String },

    /// Image could not be written
    #[error("Failed to write image {path}: {reason}")]
    ImageWrite { path: PathBuf, reason: String },

    /// Image not present in an in-memory source
    #[error("Image not found in source: {name}")]
    ImageNotFound { name: String },

    // ========== Shape Errors ==========

    /// Tensors in a batch disagree on shape
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch { expected: Vec<usize>, actual: Vec<usize> },

    /// Requested size cannot be produced
    #[error("Invalid size: {reason}")]
    InvalidSize { reason: String },

    // ========== Config Errors ==========

    /// Configuration value out of range
    #[error("Invalid config: {reason}")]
    InvalidConfig { reason: String },

    /// Configuration file could not be loaded
    #[error("Failed to load config {path}: {reason}")]
    ConfigLoad { path: PathBuf, reason: String },

    // ========== Pipeline Errors ==========

    /// Stream ended (only reachable with repeat disabled)
    #[error("Data exhausted")]
    DataExhausted,

    /// Device transfer failed or returned a different batch
    #[error("Device transfer to {device} failed: {reason}")]
    DeviceTransfer { device: String, reason: String },

    /// Internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl PipelineError {
    /// Returns true if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::ImageRead { .. })
    }

    /// Returns true if this error points at bad data on disk
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            PipelineError::AnnotationParse { .. }
                | PipelineError::ImageDecode { .. }
                | PipelineError::CountMismatch { .. }
        )
    }
}

/// Result type alias for petsr operations
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let read = PipelineError::ImageRead {
            path: PathBuf::from("images/a.jpg"),
            source: std::io::Error::new(std::io::ErrorKind::Interrupted, "eintr"),
        };
        assert!(read.is_retryable());
        assert!(!read.is_data_error());

        let decode = PipelineError::ImageDecode {
            name: "Abyssinian_1".into(),
            reason: "truncated".into(),
        };
        assert!(decode.is_data_error());
        assert!(!decode.is_retryable());
        assert!(!PipelineError::DataExhausted.is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = PipelineError::CountMismatch {
            split: "test".into(),
            expected: 3669,
            actual: 10,
        };
        assert_eq!(err.to_string(), "Split test has 10 records, expected 3669");
    }
}
