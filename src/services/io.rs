//! Image I/O operations service
//!
//! This module separates file I/O operations from the pipeline,
//! making the system more testable and maintainable.

use crate::{
    error::{CutoutError, Result},
    types::CompositeResult,
};
use image::DynamicImage;
use std::path::{Path, PathBuf};

/// Service for handling image file input/output operations
pub struct ImageIOService;

impl ImageIOService {
    /// Load an image from a file path
    ///
    /// Falls back to content sniffing when the extension is wrong or missing.
    ///
    /// # Examples
    /// ```rust,no_run
    /// use imgly_cutout::services::ImageIOService;
    ///
    /// let image = ImageIOService::load_image("input.jpg")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
        let path_ref = path.as_ref();

        if !path_ref.exists() {
            return Err(CutoutError::file_io_error(
                "read image file",
                path_ref,
                &std::io::Error::new(std::io::ErrorKind::NotFound, "file does not exist"),
            ));
        }

        match image::open(path_ref) {
            Ok(img) => Ok(img),
            Err(e) => {
                log::debug!(
                    "Extension-based loading failed for {}: {}. Attempting content-based detection.",
                    path_ref.display(),
                    e
                );
                let data = Self::read_bytes(path_ref)?;
                Self::load_from_bytes(&data)
            },
        }
    }

    /// Read a file fully into memory
    pub fn read_bytes<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
        let path_ref = path.as_ref();
        std::fs::read(path_ref).map_err(|e| CutoutError::file_io_error("read image data", path_ref, &e))
    }

    /// Decode an image from bytes, detecting the format from content
    pub fn load_from_bytes(bytes: &[u8]) -> Result<DynamicImage> {
        Ok(image::load_from_memory(bytes)?)
    }

    /// Write an encoded composite, creating parent directories as needed
    pub fn write_png<P: AsRef<Path>>(path: P, result: &CompositeResult) -> Result<()> {
        let path_ref = path.as_ref();

        if let Some(parent) = path_ref.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                CutoutError::file_io_error("create output directory", parent, &e)
            })?;
        }

        result.save_png(path_ref)?;
        log::debug!(
            "Wrote {}x{} PNG to {}",
            result.dimensions().0,
            result.dimensions().1,
            path_ref.display()
        );
        Ok(())
    }

    /// Download-style file name: always ends in `.png`
    ///
    /// A name already ending in `.png` is kept; otherwise the last extension
    /// is replaced (`photo.jpg` -> `photo.png`, `scan` -> `scan.png`).
    #[must_use]
    pub fn png_file_name(name: &str) -> String {
        if name.ends_with(".png") {
            return name.to_string();
        }
        let stem = match name.rfind('.') {
            Some(index) if index + 1 < name.len() => name.get(..index).unwrap_or(name),
            _ => name,
        };
        format!("{stem}.png")
    }

    /// Resolve where the cutout of `input` should be written
    ///
    /// - `output` is an existing directory: `<output>/<png name of input>`
    /// - `output` is a file path: that path with a `.png` name
    /// - no `output`: next to the input, suffixed `_cutout` if the PNG name
    ///   would overwrite the input itself
    #[must_use]
    pub fn output_path_for(input: &Path, output: Option<&Path>) -> PathBuf {
        let input_name = input
            .file_name()
            .map_or_else(|| "output".to_string(), |n| n.to_string_lossy().into_owned());
        let png_name = Self::png_file_name(&input_name);

        match output {
            Some(dir) if dir.is_dir() => dir.join(png_name),
            Some(file) => {
                let name = file
                    .file_name()
                    .map_or_else(|| png_name.clone(), |n| Self::png_file_name(&n.to_string_lossy()));
                file.with_file_name(name)
            },
            None => {
                let candidate = input.with_file_name(&png_name);
                if candidate == input {
                    Self::cutout_variant(&candidate, 1)
                } else {
                    candidate
                }
            },
        }
    }

    /// Alternative name for a PNG target that is already taken
    ///
    /// `cat.png` becomes `cat_cutout.png` for `attempt` 1 and
    /// `cat_cutout_<attempt>.png` after that.
    #[must_use]
    pub fn cutout_variant(target: &Path, attempt: usize) -> PathBuf {
        let stem = target
            .file_stem()
            .map_or_else(|| "output".to_string(), |s| s.to_string_lossy().into_owned());
        let name = if attempt <= 1 {
            format!("{stem}_cutout.png")
        } else {
            format!("{stem}_cutout_{attempt}.png")
        };
        target.with_file_name(name)
    }

    /// Check if a file path has an accepted upload extension
    pub fn is_supported_format<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                matches!(
                    ext.to_lowercase().as_str(),
                    "jpg" | "jpeg" | "png" | "webp"
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{services::Compositor, types::AlphaBuffer};
    use image::{Rgb, RgbImage};

    #[test]
    fn test_png_file_name() {
        assert_eq!(ImageIOService::png_file_name("photo.jpg"), "photo.png");
        assert_eq!(ImageIOService::png_file_name("photo.png"), "photo.png");
        assert_eq!(ImageIOService::png_file_name("photo.PNG"), "photo.png");
        assert_eq!(ImageIOService::png_file_name("archive.tar.webp"), "archive.tar.png");
        assert_eq!(ImageIOService::png_file_name("scan"), "scan.png");
    }

    #[test]
    fn test_output_path_next_to_input() {
        let out = ImageIOService::output_path_for(Path::new("/photos/cat.jpeg"), None);
        assert_eq!(out, PathBuf::from("/photos/cat.png"));

        let out = ImageIOService::output_path_for(Path::new("/photos/cat.png"), None);
        assert_eq!(out, PathBuf::from("/photos/cat_cutout.png"));
    }

    #[test]
    fn test_cutout_variant_names() {
        let target = Path::new("/photos/cat.png");
        assert_eq!(
            ImageIOService::cutout_variant(target, 1),
            PathBuf::from("/photos/cat_cutout.png")
        );
        assert_eq!(
            ImageIOService::cutout_variant(target, 3),
            PathBuf::from("/photos/cat_cutout_3.png")
        );
    }

    #[test]
    fn test_output_path_into_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out = ImageIOService::output_path_for(Path::new("in/dog.webp"), Some(dir.path()));
        assert_eq!(out, dir.path().join("dog.png"));
    }

    #[test]
    fn test_output_path_explicit_file() {
        let out = ImageIOService::output_path_for(
            Path::new("in/dog.webp"),
            Some(Path::new("/tmp/nonexistent-dir/result.jpg")),
        );
        assert_eq!(out, PathBuf::from("/tmp/nonexistent-dir/result.png"));
    }

    #[test]
    fn test_write_png_creates_parent_dirs_and_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(6, 4, Rgb([1, 2, 3])));
        let result = Compositor::composite(&image, &AlphaBuffer::filled(6, 4, 1.0)).unwrap();

        let path = dir.path().join("nested/deeper/out.png");
        ImageIOService::write_png(&path, &result).unwrap();

        let loaded = ImageIOService::load_image(&path).unwrap();
        assert_eq!((loaded.width(), loaded.height()), (6, 4));
    }

    #[test]
    fn test_load_missing_file() {
        let err = ImageIOService::load_image("/definitely/not/here.jpg").unwrap_err();
        assert!(matches!(err, CutoutError::Io(_)));
    }

    #[test]
    fn test_load_with_wrong_extension_uses_content() {
        let dir = tempfile::tempdir().unwrap();
        let image = DynamicImage::ImageRgb8(RgbImage::new(3, 3));
        let path = dir.path().join("actually_png.jpg");
        image.save_with_format(&path, image::ImageFormat::Png).unwrap();

        let loaded = ImageIOService::load_image(&path).unwrap();
        assert_eq!(loaded.width(), 3);
    }

    #[test]
    fn test_supported_extensions() {
        assert!(ImageIOService::is_supported_format("a.JPG"));
        assert!(ImageIOService::is_supported_format("a.webp"));
        assert!(!ImageIOService::is_supported_format("a.gif"));
        assert!(!ImageIOService::is_supported_format("noext"));
    }
}
