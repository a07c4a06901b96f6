//! Tract session backend
//!
//! Pure Rust ONNX inference with no native runtime dependency. The input
//! fact is pinned to `[1, 3, S, S]` so the graph can be fully optimized.

use crate::{
    config::MODEL_INPUT_SIZE,
    error::{CutoutError, Result},
    inference::{DenseOutput, InferenceSession, SessionOutput},
    session::SessionLoader,
    types::Tensor as ImageTensor,
};
use async_trait::async_trait;
use log;
use std::{collections::HashMap, path::PathBuf, sync::Arc};
use tract_onnx::prelude::*;

/// Type alias for the complex Tract model type to reduce complexity warnings
type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

fn tract_error(operation: &str, error: impl std::fmt::Display) -> CutoutError {
    CutoutError::inference_error_with_backend("tract", operation, &error.to_string())
}

/// Tract session for a segmentation model
pub struct TractSession {
    model: Arc<TractModel>,
    input_names: Vec<String>,
    output_names: Vec<String>,
}

impl std::fmt::Debug for TractSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TractSession")
            .field("input_names", &self.input_names)
            .field("output_names", &self.output_names)
            .finish_non_exhaustive()
    }
}

impl TractSession {
    /// Load, optimize and plan an ONNX model file
    ///
    /// # Errors
    /// Model parsing, shape inference or optimization failures
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let model_data = std::fs::read(path)
            .map_err(|e| CutoutError::file_io_error("read model file", path, &e))?;
        let session = Self::from_memory(&model_data)?;
        log::info!(
            "Tract session for '{}' ready (inputs: {:?}, outputs: {:?})",
            path.display(),
            session.input_names,
            session.output_names
        );
        Ok(session)
    }

    /// Build a session from an in-memory ONNX model
    ///
    /// # Errors
    /// Model parsing, shape inference or optimization failures
    pub fn from_memory(model_data: &[u8]) -> Result<Self> {
        let model_load_start = instant::Instant::now();
        let size = MODEL_INPUT_SIZE as usize;

        let model = onnx()
            .model_for_read(&mut std::io::Cursor::new(model_data))
            .map_err(|e| tract_error("Load ONNX model", e))?
            .with_input_fact(0, f32::fact([1, 3, size, size]).into())
            .map_err(|e| tract_error("Pin input shape", e))?
            .into_optimized()
            .map_err(|e| tract_error("Optimize model", e))?
            .into_runnable()
            .map_err(|e| tract_error("Create runnable model", e))?;

        let graph = model.model();
        let input_names = graph
            .input_outlets()
            .map_err(|e| tract_error("Read model inputs", e))?
            .iter()
            .map(|outlet| graph.node(outlet.node).name.clone())
            .collect();
        let output_names = graph
            .output_outlets()
            .map_err(|e| tract_error("Read model outputs", e))?
            .iter()
            .map(|outlet| graph.node(outlet.node).name.clone())
            .collect();

        log::debug!(
            "Tract model planned in {:.2}ms",
            model_load_start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(Self {
            model: Arc::new(model),
            input_names,
            output_names,
        })
    }

    fn run_blocking(
        model: &TractModel,
        inputs: HashMap<String, ImageTensor>,
        input_names: &[String],
        output_names: &[String],
    ) -> Result<HashMap<String, SessionOutput>> {
        let mut inputs = inputs;
        let mut ordered: TVec<TValue> = TVec::new();
        for name in input_names {
            let tensor = inputs.remove(name).ok_or_else(|| {
                CutoutError::inference(format!("no tensor bound to model input '{}'", name))
            })?;
            ordered.push(Tensor::from(tensor.into_array()).into());
        }

        let outputs = model
            .run(ordered)
            .map_err(|e| tract_error("Inference", e))?;

        let mut results = HashMap::with_capacity(output_names.len());
        for (name, value) in output_names.iter().zip(outputs) {
            let tensor = value.into_arc_tensor();
            let output = match tensor.to_array_view::<f32>() {
                Ok(view) => SessionOutput::Tensor(Box::new(DenseOutput {
                    dims: view.shape().to_vec(),
                    data: view.iter().copied().collect(),
                })),
                Err(_) => SessionOutput::Opaque {
                    kind: format!("{:?} tensor", tensor.datum_type()),
                },
            };
            results.insert(name.clone(), output);
        }

        Ok(results)
    }
}

#[async_trait]
impl InferenceSession for TractSession {
    fn input_names(&self) -> &[String] {
        &self.input_names
    }

    fn output_names(&self) -> &[String] {
        &self.output_names
    }

    async fn run(
        &self,
        inputs: HashMap<String, ImageTensor>,
    ) -> Result<HashMap<String, SessionOutput>> {
        let model = Arc::clone(&self.model);
        let input_names = self.input_names.clone();
        let output_names = self.output_names.clone();

        tokio::task::spawn_blocking(move || {
            Self::run_blocking(&model, inputs, &input_names, &output_names)
        })
        .await
        .map_err(|e| tract_error("Join inference task", e))?
    }

    fn backend_name(&self) -> &'static str {
        "tract"
    }
}

/// Loads a `TractSession` from a model path
#[derive(Debug, Clone)]
pub struct TractSessionLoader {
    model_path: PathBuf,
}

impl TractSessionLoader {
    #[must_use]
    pub fn new<P: Into<PathBuf>>(model_path: P) -> Self {
        Self {
            model_path: model_path.into(),
        }
    }
}

#[async_trait]
impl SessionLoader for TractSessionLoader {
    async fn load(&self) -> Result<Arc<dyn InferenceSession>> {
        let path = self.model_path.clone();
        let session = tokio::task::spawn_blocking(move || TractSession::from_file(path))
            .await
            .map_err(|e| tract_error("Join model loading task", e))??;
        Ok(Arc::new(session))
    }

    fn describe(&self) -> String {
        format!("tract:{}", self.model_path.display())
    }
}
