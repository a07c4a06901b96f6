//! Configuration types for cutout pipeline runs

use crate::error::{CutoutError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Fixed spatial size of the model input tensor (`S` in `[1, 3, S, S]`)
pub const MODEL_INPUT_SIZE: u32 = 320;

/// Default edge feather radius in pixels
pub const DEFAULT_FEATHER_RADIUS: f32 = 2.0;

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon acceleration
    #[serde(rename = "coreml")]
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

impl std::str::FromStr for ExecutionProvider {
    type Err = CutoutError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda),
            "coreml" => Ok(Self::CoreMl),
            other => Err(CutoutError::invalid_config(format!(
                "Unknown execution provider '{}'. Valid options: auto, cpu, cuda, coreml",
                other
            ))),
        }
    }
}

/// Ceilings applied to uploads before they enter the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadLimits {
    /// Maximum encoded size in bytes
    pub max_bytes: usize,
    /// Maximum width and height in pixels
    pub max_dimension: u32,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_bytes: 15 * 1024 * 1024,
            max_dimension: 5000,
        }
    }
}

/// Configuration for a cutout pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Edge feather radius in pixels (0 disables smoothing)
    pub feather_radius: f32,

    /// Timeout applied around the inference step (None = wait indefinitely)
    pub inference_timeout_ms: Option<u64>,

    /// Latency budget for the inference step. Only reported on the result,
    /// exceeding it is not an error.
    pub latency_budget_ms: Option<u64>,

    /// Upload ceilings enforced by the bytes/file entry points
    pub validation: UploadLimits,

    /// Execution provider for the ONNX backend
    pub execution_provider: ExecutionProvider,

    /// Number of intra-op threads for inference (0 = auto)
    pub intra_threads: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            feather_radius: DEFAULT_FEATHER_RADIUS,
            inference_timeout_ms: None,
            latency_budget_ms: None,
            validation: UploadLimits::default(),
            execution_provider: ExecutionProvider::default(),
            intra_threads: 0, // Auto-detect optimal intra-op threads
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration builder for fluent API construction
    ///
    /// # Examples
    ///
    /// ```rust
    /// use imgly_cutout::PipelineConfig;
    ///
    /// let config = PipelineConfig::builder()
    ///     .feather_radius(3.0)
    ///     .inference_timeout_ms(10_000)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.feather_radius, 3.0);
    /// ```
    #[must_use]
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Load a configuration from a JSON file. Missing fields take their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| CutoutError::file_io_error("read config file", path, &e))?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            CutoutError::invalid_config(format!(
                "Failed to parse config '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - Feather radius negative or not finite
    /// - Zero timeout or zero upload ceilings
    pub fn validate(&self) -> Result<()> {
        if !self.feather_radius.is_finite() || self.feather_radius < 0.0 {
            return Err(CutoutError::invalid_config(format!(
                "Invalid feather radius: {} (must be a finite value >= 0)",
                self.feather_radius
            )));
        }

        if self.inference_timeout_ms == Some(0) {
            return Err(CutoutError::invalid_config(
                "Inference timeout must be greater than 0ms",
            ));
        }

        if self.validation.max_bytes == 0 || self.validation.max_dimension == 0 {
            return Err(CutoutError::invalid_config(
                "Upload limits must be greater than 0",
            ));
        }

        Ok(())
    }
}

/// Builder for `PipelineConfig`
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// Set the edge feather radius
    #[must_use]
    pub fn feather_radius(mut self, radius: f32) -> Self {
        self.config.feather_radius = radius;
        self
    }

    /// Set the inference timeout
    #[must_use]
    pub fn inference_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.config.inference_timeout_ms = Some(timeout_ms);
        self
    }

    /// Set the inference latency budget
    #[must_use]
    pub fn latency_budget_ms(mut self, budget_ms: u64) -> Self {
        self.config.latency_budget_ms = Some(budget_ms);
        self
    }

    /// Set upload ceilings
    #[must_use]
    pub fn upload_limits(mut self, limits: UploadLimits) -> Self {
        self.config.validation = limits;
        self
    }

    /// Set execution provider
    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.execution_provider = provider;
        self
    }

    /// Set number of intra-op threads
    #[must_use]
    pub fn intra_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    /// Returns `CutoutError::InvalidConfig` if validation fails
    pub fn build(self) -> Result<PipelineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
