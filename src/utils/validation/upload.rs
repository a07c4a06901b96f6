//! Upload validation
//!
//! Checks an encoded upload against the accepted formats and the configured
//! byte and pixel ceilings before anything is decoded in full.

use crate::{
    config::UploadLimits,
    error::{CutoutError, Result},
};
use image::{ImageFormat, ImageReader};
use std::io::Cursor;

/// Facts gathered about an accepted upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadInfo {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    pub byte_len: usize,
}

/// Validator for uploaded image bytes
#[derive(Debug, Clone, Default)]
pub struct UploadValidator {
    limits: UploadLimits,
}

impl UploadValidator {
    #[must_use]
    pub fn new(limits: UploadLimits) -> Self {
        Self { limits }
    }

    #[must_use]
    pub fn limits(&self) -> &UploadLimits {
        &self.limits
    }

    /// Validate encoded image bytes
    ///
    /// Checks run in order: format, byte size, dimensions. Dimensions come
    /// from the image header only.
    ///
    /// # Errors
    /// - `UnsupportedFormat` if the content is not JPEG, PNG or WebP
    /// - `UploadRejected` if a ceiling is exceeded or a dimension is zero
    pub fn validate(&self, bytes: &[u8]) -> Result<UploadInfo> {
        let format = Self::validate_format(bytes)?;

        if bytes.len() > self.limits.max_bytes {
            return Err(CutoutError::upload_rejected(format!(
                "file is {} bytes, maximum is {} bytes ({:.0} MB)",
                bytes.len(),
                self.limits.max_bytes,
                self.limits.max_bytes as f64 / (1024.0 * 1024.0)
            )));
        }

        let (width, height) = ImageReader::with_format(Cursor::new(bytes), format)
            .into_dimensions()
            .map_err(|e| CutoutError::upload_rejected(format!("unreadable image header: {}", e)))?;

        self.validate_dimensions(width, height)?;

        Ok(UploadInfo {
            format,
            width,
            height,
            byte_len: bytes.len(),
        })
    }

    /// Sniff the content format from the leading bytes
    pub fn validate_format(bytes: &[u8]) -> Result<ImageFormat> {
        let format = image::guess_format(bytes)
            .map_err(|_| CutoutError::unsupported_format("unrecognized image data"))?;

        match format {
            ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::WebP => Ok(format),
            other => Err(CutoutError::unsupported_format(format!(
                "{:?} (accepted: JPEG, PNG, WebP)",
                other
            ))),
        }
    }

    /// Check pixel dimensions against the ceiling
    pub fn validate_dimensions(&self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(CutoutError::upload_rejected(format!(
                "image has zero dimension: {}x{}",
                width, height
            )));
        }

        let max = self.limits.max_dimension;
        if width > max || height > max {
            return Err(CutoutError::upload_rejected(format!(
                "resolution {}x{} exceeds maximum {}x{} px",
                width, height, max, max
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};

    fn encode(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
        let image = DynamicImage::ImageRgb8(RgbImage::new(width, height));
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), format)
            .unwrap();
        bytes
    }

    #[test]
    fn test_accepts_png_and_jpeg() {
        let validator = UploadValidator::default();

        let info = validator.validate(&encode(40, 30, ImageFormat::Png)).unwrap();
        assert_eq!(info.format, ImageFormat::Png);
        assert_eq!((info.width, info.height), (40, 30));

        let info = validator.validate(&encode(8, 8, ImageFormat::Jpeg)).unwrap();
        assert_eq!(info.format, ImageFormat::Jpeg);
    }

    #[test]
    fn test_rejects_unknown_content() {
        let err = UploadValidator::default().validate(b"GIF89a not really").unwrap_err();
        assert!(matches!(err, CutoutError::UnsupportedFormat(_)));

        let err = UploadValidator::default().validate(b"plain text").unwrap_err();
        assert!(matches!(err, CutoutError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_rejects_oversized_bytes() {
        let validator = UploadValidator::new(UploadLimits {
            max_bytes: 16,
            max_dimension: 5000,
        });
        let err = validator.validate(&encode(20, 20, ImageFormat::Png)).unwrap_err();
        assert!(matches!(err, CutoutError::UploadRejected(_)));
    }

    #[test]
    fn test_rejects_oversized_dimensions() {
        let validator = UploadValidator::new(UploadLimits {
            max_bytes: 1024 * 1024,
            max_dimension: 50,
        });
        assert!(validator.validate(&encode(50, 50, ImageFormat::Png)).is_ok());

        let err = validator.validate(&encode(51, 10, ImageFormat::Png)).unwrap_err();
        assert!(err.to_string().contains("51x10"));
    }

    #[test]
    fn test_default_dimension_ceiling() {
        let validator = UploadValidator::default();
        assert!(validator.validate_dimensions(5000, 5000).is_ok());
        assert!(validator.validate_dimensions(5001, 10).is_err());
        assert!(validator.validate_dimensions(0, 10).is_err());
    }
}
