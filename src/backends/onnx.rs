//! ONNX Runtime session backend
//!
//! Wraps an `ort` session behind the `InferenceSession` capability. ONNX
//! Runtime's `run` is blocking, so it is moved onto tokio's blocking pool.

use crate::{
    config::{ExecutionProvider, PipelineConfig},
    error::{CutoutError, Result},
    inference::{DenseOutput, InferenceSession, SessionOutput},
    session::SessionLoader,
    types::Tensor,
};
use async_trait::async_trait;
use log;
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
};
use ort::session::{builder::GraphOptimizationLevel, builder::SessionBuilder, Session};
use ort::value::Value;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

fn ort_error(operation: &str, error: impl std::fmt::Display) -> CutoutError {
    CutoutError::inference_error_with_backend("onnx", operation, &error.to_string())
}

/// ONNX Runtime session for a segmentation model
pub struct OnnxSession {
    session: Arc<Mutex<Session>>,
    input_names: Vec<String>,
    output_names: Vec<String>,
}

impl std::fmt::Debug for OnnxSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxSession")
            .field("input_names", &self.input_names)
            .field("output_names", &self.output_names)
            .finish_non_exhaustive()
    }
}

impl OnnxSession {
    /// Load a model file with the provider and threading settings from `config`
    ///
    /// # Errors
    /// Session builder or model loading failures
    pub fn from_file<P: AsRef<Path>>(path: P, config: &PipelineConfig) -> Result<Self> {
        let path = path.as_ref();
        let model_load_start = instant::Instant::now();

        let session = Self::configure_builder(config)?
            .commit_from_file(path)
            .map_err(|e| ort_error("Create session from model file", e))?;

        let onnx_session = Self::from_session(session);
        log::info!(
            "ONNX session for '{}' ready in {:.0}ms (inputs: {:?}, outputs: {:?})",
            path.display(),
            model_load_start.elapsed().as_secs_f64() * 1000.0,
            onnx_session.input_names,
            onnx_session.output_names
        );
        Ok(onnx_session)
    }

    /// Build a session from an in-memory model
    ///
    /// # Errors
    /// Session builder or model parsing failures
    pub fn from_memory(model_data: &[u8], config: &PipelineConfig) -> Result<Self> {
        let session = Self::configure_builder(config)?
            .commit_from_memory(model_data)
            .map_err(|e| ort_error("Create session from model data", e))?;
        Ok(Self::from_session(session))
    }

    fn from_session(session: Session) -> Self {
        let input_names = session.inputs.iter().map(|i| i.name.clone()).collect();
        let output_names = session.outputs.iter().map(|o| o.name.clone()).collect();
        Self {
            session: Arc::new(Mutex::new(session)),
            input_names,
            output_names,
        }
    }

    /// Session builder with optimization level, execution providers and threads
    fn configure_builder(config: &PipelineConfig) -> Result<SessionBuilder> {
        let mut session_builder = Session::builder()
            .map_err(|e| ort_error("Create session builder", e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| ort_error("Set optimization level", e))?;

        session_builder = match config.execution_provider {
            ExecutionProvider::Auto => {
                // Auto-detect: CUDA > CoreML > CPU
                let mut providers = Vec::new();

                let cuda_provider = CUDAExecutionProvider::default();
                if OrtExecutionProvider::is_available(&cuda_provider).unwrap_or(false) {
                    log::info!("CUDA execution provider is available and will be used");
                    providers.push(cuda_provider.build());
                }

                let coreml_provider = CoreMLExecutionProvider::default().with_subgraphs(true);
                if OrtExecutionProvider::is_available(&coreml_provider).unwrap_or(false) {
                    log::info!("CoreML execution provider is available and will be used");
                    providers.push(coreml_provider.build());
                }

                if providers.is_empty() {
                    log::debug!("No hardware acceleration available, using CPU");
                    session_builder
                } else {
                    session_builder
                        .with_execution_providers(providers)
                        .map_err(|e| ort_error("Set auto execution providers", e))?
                }
            },
            ExecutionProvider::Cpu => {
                log::info!("Using CPU execution provider");
                session_builder
            },
            ExecutionProvider::Cuda => {
                let cuda_provider = CUDAExecutionProvider::default();
                if OrtExecutionProvider::is_available(&cuda_provider).unwrap_or(false) {
                    log::info!("Using CUDA execution provider");
                    session_builder
                        .with_execution_providers([cuda_provider.build()])
                        .map_err(|e| ort_error("Set CUDA execution provider", e))?
                } else {
                    log::warn!(
                        "CUDA execution provider requested but not available, falling back to CPU"
                    );
                    session_builder
                }
            },
            ExecutionProvider::CoreMl => {
                let coreml_provider = CoreMLExecutionProvider::default().with_subgraphs(true);
                if OrtExecutionProvider::is_available(&coreml_provider).unwrap_or(false) {
                    log::info!("Using CoreML execution provider");
                    session_builder
                        .with_execution_providers([coreml_provider.build()])
                        .map_err(|e| ort_error("Set CoreML execution provider", e))?
                } else {
                    log::warn!(
                        "CoreML execution provider requested but not available, falling back to CPU"
                    );
                    session_builder
                }
            },
        };

        let intra_threads = if config.intra_threads > 0 {
            config.intra_threads
        } else {
            std::thread::available_parallelism()
                .map(std::num::NonZero::get)
                .unwrap_or(4)
        };
        log::debug!("ONNX intra-op threads: {intra_threads}");

        session_builder
            .with_intra_threads(intra_threads)
            .map_err(|e| ort_error("Set intra threads", e))
    }

    /// Blocking run on the calling thread
    fn run_blocking(
        session: &Mutex<Session>,
        inputs: HashMap<String, Tensor>,
        output_names: &[String],
    ) -> Result<HashMap<String, SessionOutput>> {
        let mut bound = Vec::with_capacity(inputs.len());
        for (name, tensor) in inputs {
            let value = Value::from_array(tensor.into_array())
                .map_err(|e| ort_error("Convert input tensor", e))?;
            bound.push((name, value));
        }

        let mut session = session
            .lock()
            .map_err(|_| CutoutError::inference("ONNX session lock poisoned"))?;

        let outputs = session
            .run(bound)
            .map_err(|e| ort_error("Inference", e))?;

        let mut results = HashMap::with_capacity(output_names.len());
        for name in output_names {
            let Some(value) = outputs.get(name.as_str()) else {
                continue;
            };
            let output = match value.try_extract_array::<f32>() {
                Ok(array) => SessionOutput::Tensor(Box::new(DenseOutput {
                    dims: array.shape().to_vec(),
                    data: array.iter().copied().collect(),
                })),
                Err(e) => SessionOutput::Opaque {
                    kind: format!("non-f32 value ({e})"),
                },
            };
            results.insert(name.clone(), output);
        }

        Ok(results)
    }
}

#[async_trait]
impl InferenceSession for OnnxSession {
    fn input_names(&self) -> &[String] {
        &self.input_names
    }

    fn output_names(&self) -> &[String] {
        &self.output_names
    }

    async fn run(&self, inputs: HashMap<String, Tensor>) -> Result<HashMap<String, SessionOutput>> {
        let session = Arc::clone(&self.session);
        let output_names = self.output_names.clone();

        tokio::task::spawn_blocking(move || Self::run_blocking(&session, inputs, &output_names))
            .await
            .map_err(|e| ort_error("Join inference task", e))?
    }

    fn backend_name(&self) -> &'static str {
        "onnx"
    }
}

/// Loads an `OnnxSession` from a model path
#[derive(Debug, Clone)]
pub struct OnnxSessionLoader {
    model_path: PathBuf,
    config: PipelineConfig,
}

impl OnnxSessionLoader {
    #[must_use]
    pub fn new<P: Into<PathBuf>>(model_path: P, config: PipelineConfig) -> Self {
        Self {
            model_path: model_path.into(),
            config,
        }
    }
}

#[async_trait]
impl SessionLoader for OnnxSessionLoader {
    async fn load(&self) -> Result<Arc<dyn InferenceSession>> {
        let path = self.model_path.clone();
        let config = self.config.clone();
        let session = tokio::task::spawn_blocking(move || OnnxSession::from_file(path, &config))
            .await
            .map_err(|e| ort_error("Join model loading task", e))??;
        Ok(Arc::new(session))
    }

    fn describe(&self) -> String {
        format!("onnx:{}", self.model_path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_file_is_inference_error() {
        let result = OnnxSession::from_file("/nonexistent/model.onnx", &PipelineConfig::default());
        let err = result.unwrap_err();
        assert!(matches!(err, CutoutError::Inference(_)));
        assert!(err.to_string().contains("onnx"));
    }

    #[test]
    fn test_loader_description() {
        let loader = OnnxSessionLoader::new("models/u2netp.onnx", PipelineConfig::default());
        assert_eq!(loader.describe(), "onnx:models/u2netp.onnx");
    }
}
