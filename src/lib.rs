#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # IMG.LY Cutout Library
//!
//! Turns a photo into a PNG with a transparent background. A salient-object
//! segmentation model predicts a soft foreground mask at a fixed 320×320
//! resolution; the mask is stretched back to the photo's native size, its
//! edges are feathered, and it becomes the alpha channel of the output.
//!
//! ## Pipeline
//!
//! 1. **Preprocess**: letterbox the image into a `[1, 3, 320, 320]` planar tensor
//! 2. **Infer**: run an [`InferenceSession`] and read its first output as the mask
//! 3. **Resolve**: read the mask grid size from its shape (`[1, 1, H, W]` or `[1, H, W]`)
//! 4. **Resample**: bilinear, half-pixel centers, to the source resolution
//! 5. **Feather**: separable box blur of the alpha buffer
//! 6. **Composite**: apply alpha to the original pixels and encode PNG
//!
//! Output dimensions always equal the source dimensions.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use imgly_cutout::{CutoutProcessor, PipelineConfig, RunOutcome};
//! use imgly_cutout::backends::TractSession;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let session = TractSession::from_file("models/u2netp.onnx")?;
//! let config = PipelineConfig::builder().feather_radius(2.0).build()?;
//! let processor = CutoutProcessor::with_session(config, Arc::new(session))?;
//!
//! if let RunOutcome::Completed(result) = processor.process_file("photo.jpg").await? {
//!     result.composite.save_png("photo.png")?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `onnx` (default): ONNX Runtime backend with GPU acceleration support
//! - `tract` (default): Pure Rust backend
//! - `cli` (default): Command-line interface and tracing subscriber setup
//! - `webp-support` (default): WebP uploads
//! - `tracing-json`, `tracing-files`: extra CLI log outputs
//!
//! ### Library-Only Usage
//!
//! ```toml
//! [dependencies]
//! imgly-cutout = { version = "0.1", default-features = false, features = ["tract"] }
//! ```

pub mod backends;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod inference;
pub mod processor;
pub mod services;
pub mod session;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;
pub mod utils;

use std::sync::Arc;

// Public API exports
pub use backends::{MockFailure, MockMask, MockSession, MockSessionBuilder};
#[cfg(feature = "onnx")]
pub use backends::{OnnxSession, OnnxSessionLoader};
#[cfg(feature = "tract")]
pub use backends::{TractSession, TractSessionLoader};
pub use config::{
    ExecutionProvider, PipelineConfig, PipelineConfigBuilder, UploadLimits,
    DEFAULT_FEATHER_RADIUS, MODEL_INPUT_SIZE,
};
pub use error::{CutoutError, Result};
pub use inference::{infer, DenseOutput, InferenceSession, OutputTensor, SessionOutput};
pub use processor::{CutoutProcessor, RunOutcome, RunTicket};
pub use services::{
    Compositor, ConsoleProgressReporter, ImageIOService, NoOpProgressReporter, ProcessingStage,
    ProgressReporter, ProgressTracker, ProgressUpdate,
};
pub use session::{SessionLoader, SessionSlot, SessionState};
pub use types::{
    AlphaBuffer, CompositeResult, CutoutResult, InferenceOutcome, MaskTensor, ProcessingTimings,
    Tensor,
};
pub use utils::{
    feather, feather_buffer, mask_size, mask_to_alpha, resample, ImagePreprocessor,
    LetterboxGeometry, MaskSize, PreprocessingOptions, UploadInfo, UploadValidator,
};

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, TracingConfig, TracingFormat, TracingOutput};

/// Cut out the subject of an uploaded image
///
/// Validates the upload against `config.validation`, decodes it and runs
/// the full pipeline once against `session`.
///
/// # Examples
///
/// ```rust,no_run
/// use imgly_cutout::{cutout_from_bytes, MockSession, PipelineConfig};
/// use std::sync::Arc;
///
/// # async fn example(upload: Vec<u8>) -> anyhow::Result<()> {
/// let session = Arc::new(MockSession::uniform(1.0));
/// let result = cutout_from_bytes(&upload, session, &PipelineConfig::default()).await?;
/// std::fs::write("cutout.png", result.composite.png_bytes())?;
/// # Ok(())
/// # }
/// ```
pub async fn cutout_from_bytes(
    bytes: &[u8],
    session: Arc<dyn InferenceSession>,
    config: &PipelineConfig,
) -> Result<CutoutResult> {
    let processor = CutoutProcessor::with_session(config.clone(), session)?;
    completed(processor.process_bytes(bytes).await?)
}

/// Cut out the subject of an already decoded image
///
/// No upload validation is applied; the caller owns the image.
pub async fn cutout_from_image(
    image: &image::DynamicImage,
    session: Arc<dyn InferenceSession>,
    config: &PipelineConfig,
) -> Result<CutoutResult> {
    let processor = CutoutProcessor::with_session(config.clone(), session)?;
    completed(processor.process_image(image).await?)
}

// A private single-use processor never sees a newer ticket
fn completed(outcome: RunOutcome) -> Result<CutoutResult> {
    outcome
        .into_result()
        .ok_or_else(|| CutoutError::inference("run was superseded"))
}
