//! Core data types flowing through the cutout pipeline

use crate::error::{CutoutError, Result};
use chrono::{DateTime, Utc};
use ndarray::Array4;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Normalized model input in planar NCHW layout, shape `[1, 3, S, S]`
///
/// Backed by a standard-layout `Array4`, so the flat view is channel-major:
/// all red values, then all green, then all blue.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    array: Array4<f32>,
}

impl Tensor {
    /// Build a tensor from flat planar data and an explicit shape
    ///
    /// # Errors
    /// `DimensionMismatch` if `data.len()` differs from the shape's product
    pub fn from_planar(shape: [usize; 4], data: Vec<f32>) -> Result<Self> {
        let expected = shape.iter().product();
        let actual = data.len();
        let array = Array4::from_shape_vec((shape[0], shape[1], shape[2], shape[3]), data)
            .map_err(|_| CutoutError::dimension_mismatch("tensor", expected, actual))?;
        Ok(Self { array })
    }

    /// Wrap an existing array
    #[must_use]
    pub fn from_array(array: Array4<f32>) -> Self {
        Self {
            array: array.as_standard_layout().into_owned(),
        }
    }

    /// Declared shape
    #[must_use]
    pub fn shape(&self) -> [usize; 4] {
        let (n, c, h, w) = self.array.dim();
        [n, c, h, w]
    }

    /// Number of values
    #[must_use]
    pub fn len(&self) -> usize {
        self.array.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.array.is_empty()
    }

    /// Flat planar view of the values
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        self.array
            .as_slice()
            .unwrap_or_default()
    }

    /// Borrow as an ndarray view
    #[must_use]
    pub fn array(&self) -> &Array4<f32> {
        &self.array
    }

    /// Take the underlying array
    #[must_use]
    pub fn into_array(self) -> Array4<f32> {
        self.array
    }
}

/// Raw model output: flat values plus a rank 3 or rank 4 shape descriptor
///
/// Values are expected, but not guaranteed, to lie in `[0, 1]`. The data is
/// not checked against `dims` here; the resampler checks it before reading.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MaskTensor {
    pub data: Vec<f32>,
    pub dims: Vec<usize>,
}

impl MaskTensor {
    #[must_use]
    pub fn new(data: Vec<f32>, dims: Vec<usize>) -> Self {
        Self { data, dims }
    }

    /// Product of the declared dims
    #[must_use]
    pub fn declared_len(&self) -> usize {
        self.dims.iter().product()
    }
}

/// Per-pixel alpha values in `[0, 1]`, row-major (`index = y * width + x`)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AlphaBuffer {
    data: Vec<f32>,
    width: u32,
    height: u32,
}

impl AlphaBuffer {
    /// Wrap existing values, clamping them into `[0, 1]`
    ///
    /// # Errors
    /// `DimensionMismatch` if `data.len() != width * height`
    pub fn new(data: Vec<f32>, width: u32, height: u32) -> Result<Self> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(CutoutError::dimension_mismatch(
                "alpha buffer",
                expected,
                data.len(),
            ));
        }
        let data = data.into_iter().map(|v| v.clamp(0.0, 1.0)).collect();
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Buffer where every pixel has the same alpha
    #[must_use]
    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        Self {
            data: vec![value.clamp(0.0, 1.0); width as usize * height as usize],
            width,
            height,
        }
    }

    /// Construct from values the caller has already sized, without clamping
    pub(crate) fn from_clamped(data: Vec<f32>, width: u32, height: u32) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize);
        Self {
            data,
            width,
            height,
        }
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Alpha at `(x, y)`, `None` outside the buffer
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }
}

/// Encoded PNG whose dimensions equal the original input image
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeResult {
    png: Vec<u8>,
    width: u32,
    height: u32,
}

impl CompositeResult {
    pub(crate) fn new(png: Vec<u8>, width: u32, height: u32) -> Self {
        Self { png, width, height }
    }

    /// Encoded PNG byte stream
    #[must_use]
    pub fn png_bytes(&self) -> &[u8] {
        &self.png
    }

    #[must_use]
    pub fn into_png_bytes(self) -> Vec<u8> {
        self.png
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Write the PNG to disk
    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, &self.png)
            .map_err(|e| CutoutError::file_io_error("write PNG", path, &e))
    }
}

/// Mask returned by the inference adapter with the measured session latency
#[derive(Debug, Clone)]
pub struct InferenceOutcome {
    pub mask: MaskTensor,
    /// Time spent inside the session's `run`, in milliseconds (never negative)
    pub elapsed_ms: f64,
}

/// Per-stage timings for a pipeline run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingTimings {
    pub decode_ms: u64,
    pub preprocessing_ms: u64,
    pub inference_ms: u64,
    pub resample_ms: u64,
    pub feather_ms: u64,
    pub composite_ms: u64,
    pub total_ms: u64,
}

impl ProcessingTimings {
    /// Percentage of total time spent in each stage
    #[must_use]
    pub fn breakdown_percentages(&self) -> Vec<(&'static str, f64)> {
        if self.total_ms == 0 {
            return Vec::new();
        }
        let total = self.total_ms as f64;
        vec![
            ("decode", self.decode_ms as f64 / total * 100.0),
            ("preprocessing", self.preprocessing_ms as f64 / total * 100.0),
            ("inference", self.inference_ms as f64 / total * 100.0),
            ("resample", self.resample_ms as f64 / total * 100.0),
            ("feather", self.feather_ms as f64 / total * 100.0),
            ("composite", self.composite_ms as f64 / total * 100.0),
        ]
    }
}

/// Everything produced by one completed pipeline run
#[derive(Debug, Clone)]
pub struct CutoutResult {
    /// PNG with the feathered alpha channel applied
    pub composite: CompositeResult,
    /// Feathered alpha at the original resolution
    pub alpha: AlphaBuffer,
    /// Raw session latency in milliseconds
    pub inference_ms: f64,
    /// Whether inference met the configured latency budget (None if no budget)
    pub within_latency_budget: Option<bool>,
    pub timings: ProcessingTimings,
    pub completed_at: DateTime<Utc>,
}

impl CutoutResult {
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.composite.dimensions()
    }

    /// One-line timing summary for logs
    #[must_use]
    pub fn timing_summary(&self) -> String {
        let t = &self.timings;
        let mut summary = format!(
            "total {}ms (preprocess {}ms, inference {:.1}ms, resample {}ms, feather {}ms, composite {}ms)",
            t.total_ms,
            t.preprocessing_ms,
            self.inference_ms,
            t.resample_ms,
            t.feather_ms,
            t.composite_ms
        );
        if self.within_latency_budget == Some(false) {
            summary.push_str(" [over latency budget]");
        }
        summary
    }
}
