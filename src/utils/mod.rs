//! Pure pixel-pipeline stages and input validation

pub mod feather;
pub mod mask;
pub mod preprocessing;
pub mod validation;

pub use feather::{feather, feather_buffer};
pub use mask::{mask_size, mask_to_alpha, resample, MaskSize};
pub use preprocessing::{ImagePreprocessor, LetterboxGeometry, PreprocessingOptions};
pub use validation::{UploadInfo, UploadValidator};
