//! Error types for cutout pipeline operations

use thiserror::Error;

/// Result type alias for cutout pipeline operations
pub type Result<T> = std::result::Result<T, CutoutError>;

/// Error kinds raised by the pipeline stages and their surrounding services
#[derive(Error, Debug)]
pub enum CutoutError {
    /// Preprocessor was handed an image with a zero dimension
    #[error("Invalid image at stage 'preprocessing': dimensions {width}x{height} must both be positive")]
    InvalidImage { width: u32, height: u32 },

    /// The session's declared output was missing or exposed no readable data
    #[error("Inference output error: {0}")]
    InferenceOutput(String),

    /// Failure reported by the external inference session, passed through as-is
    #[error("Inference error: {0}")]
    Inference(String),

    /// Caller-imposed inference timeout expired
    #[error("Inference timed out after {timeout_ms}ms")]
    InferenceTimeout { timeout_ms: u64 },

    /// Mask shape descriptor is neither `[1, 1, H, W]` nor `[1, H, W]`
    #[error("Unsupported mask rank {rank} at stage 'mask geometry' (dims: {dims:?}); expected rank 3 or 4")]
    UnsupportedMaskRank { rank: usize, dims: Vec<usize> },

    /// A buffer's length does not match the shape it is declared against
    #[error("Dimension mismatch at stage '{stage}': expected {expected} values, got {actual}")]
    DimensionMismatch {
        stage: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Working surface for compositing could not be allocated
    #[error("Drawing surface unavailable for {width}x{height} image")]
    SurfaceUnavailable { width: u32, height: u32 },

    /// PNG encoding of the composite failed
    #[error("PNG encoding failed: {0}")]
    Encode(String),

    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// No inference session has been installed (or a reload is in progress)
    #[error("Inference session is not ready")]
    SessionNotReady,

    /// Upload is not one of the accepted formats
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Upload exceeds a size or dimension ceiling
    #[error("Upload rejected: {0}")]
    UploadRejected(String),
}

impl CutoutError {
    /// Create a new inference output error
    pub fn inference_output<S: Into<String>>(msg: S) -> Self {
        Self::InferenceOutput(msg.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new unsupported format error
    pub fn unsupported_format<S: Into<String>>(format: S) -> Self {
        Self::UnsupportedFormat(format.into())
    }

    /// Create a new upload rejection
    pub fn upload_rejected<S: Into<String>>(msg: S) -> Self {
        Self::UploadRejected(msg.into())
    }

    /// Create a new encode error
    pub fn encode<S: Into<String>>(msg: S) -> Self {
        Self::Encode(msg.into())
    }

    /// Create a dimension mismatch error for the named stage
    #[must_use]
    pub fn dimension_mismatch(stage: &'static str, expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch {
            stage,
            expected,
            actual,
        }
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create inference error with backend context
    pub fn inference_error_with_backend(backend: &str, operation: &str, error: &str) -> Self {
        Self::Inference(format!(
            "{} failed using '{}' backend: {}",
            operation, backend, error
        ))
    }

    /// Pipeline stage (or service) the error originated from
    #[must_use]
    pub fn stage(&self) -> &'static str {
        match self {
            Self::InvalidImage { .. } => "preprocessing",
            Self::InferenceOutput(_) | Self::Inference(_) | Self::InferenceTimeout { .. } => {
                "inference"
            },
            Self::UnsupportedMaskRank { .. } => "mask geometry",
            Self::DimensionMismatch { stage, .. } => *stage,
            Self::SurfaceUnavailable { .. } | Self::Encode(_) => "compositing",
            Self::SessionNotReady => "session",
            Self::UnsupportedFormat(_) | Self::UploadRejected(_) => "upload validation",
            Self::Io(_) | Self::Image(_) => "image io",
            Self::InvalidConfig(_) => "configuration",
        }
    }

    /// Whether retrying (with the same or a new image) can succeed
    ///
    /// Contract errors (bad shapes, bad ranks, non-positive dimensions) are
    /// never retryable; failures of the external session or the compositor are.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::InferenceOutput(_)
                | Self::Inference(_)
                | Self::InferenceTimeout { .. }
                | Self::SurfaceUnavailable { .. }
                | Self::Encode(_)
                | Self::SessionNotReady
                | Self::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_error_creation() {
        let err = CutoutError::invalid_config("test config error");
        assert!(matches!(err, CutoutError::InvalidConfig(_)));

        let err = CutoutError::unsupported_format("image/gif");
        assert!(matches!(err, CutoutError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_error_display_carries_dimensions() {
        let err = CutoutError::InvalidImage {
            width: 0,
            height: 480,
        };
        assert!(err.to_string().contains("0x480"));

        let err = CutoutError::UnsupportedMaskRank {
            rank: 2,
            dims: vec![320, 320],
        };
        let message = err.to_string();
        assert!(message.contains("rank 2"));
        assert!(message.contains("[320, 320]"));

        let err = CutoutError::dimension_mismatch("feather", 100, 99);
        assert_eq!(
            err.to_string(),
            "Dimension mismatch at stage 'feather': expected 100 values, got 99"
        );
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(
            CutoutError::InvalidImage {
                width: 0,
                height: 0
            }
            .stage(),
            "preprocessing"
        );
        assert_eq!(CutoutError::inference_output("x").stage(), "inference");
        assert_eq!(
            CutoutError::dimension_mismatch("resample", 4, 3).stage(),
            "resample"
        );
        assert_eq!(CutoutError::encode("x").stage(), "compositing");
    }

    #[test]
    fn test_retry_policy() {
        assert!(CutoutError::inference_output("missing").is_retryable());
        assert!(CutoutError::InferenceTimeout { timeout_ms: 10 }.is_retryable());
        assert!(CutoutError::SurfaceUnavailable {
            width: 1,
            height: 1
        }
        .is_retryable());
        assert!(!CutoutError::UnsupportedMaskRank {
            rank: 5,
            dims: vec![1, 1, 1, 1, 1]
        }
        .is_retryable());
        assert!(!CutoutError::dimension_mismatch("feather", 1, 2).is_retryable());
        assert!(!CutoutError::InvalidImage {
            width: 0,
            height: 1
        }
        .is_retryable());
    }

    #[test]
    fn test_file_io_error_context() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = CutoutError::file_io_error("write output", Path::new("/out/a.png"), &io_error);
        let message = err.to_string();
        assert!(message.contains("write output"));
        assert!(message.contains("/out/a.png"));
    }
}
