//! Inference session capability and the adapter that drives it
//!
//! The segmentation network is opaque. A session only has to expose ordered
//! input and output names plus an asynchronous `run`; the adapter binds the
//! model input to the first declared input and reads back the first declared
//! output.

use crate::{
    error::{CutoutError, Result},
    types::{InferenceOutcome, MaskTensor, Tensor},
};
use async_trait::async_trait;
use std::collections::HashMap;

// Use instant crate for cross-platform time compatibility
use instant::Instant;

/// A tensor returned by a session
#[async_trait]
pub trait OutputTensor: Send + Sync {
    /// Shape descriptor of the output
    fn dims(&self) -> &[usize];

    /// Extract the values as a flat `f32` buffer
    ///
    /// # Errors
    /// Backend-specific extraction failures
    async fn data(&self) -> Result<Vec<f32>>;
}

/// Output already copied out of the engine
#[derive(Debug, Clone, PartialEq)]
pub struct DenseOutput {
    pub dims: Vec<usize>,
    pub data: Vec<f32>,
}

#[async_trait]
impl OutputTensor for DenseOutput {
    fn dims(&self) -> &[usize] {
        &self.dims
    }

    async fn data(&self) -> Result<Vec<f32>> {
        Ok(self.data.clone())
    }
}

/// A named value returned by `InferenceSession::run`
pub enum SessionOutput {
    /// Dense tensor with a data accessor
    Tensor(Box<dyn OutputTensor>),
    /// Non-tensor value (sequence, map, ...) that exposes no data accessor
    Opaque { kind: String },
}

impl std::fmt::Debug for SessionOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tensor(tensor) => f
                .debug_struct("Tensor")
                .field("dims", &tensor.dims())
                .finish(),
            Self::Opaque { kind } => f.debug_struct("Opaque").field("kind", kind).finish(),
        }
    }
}

/// Long-lived inference session shared by pipeline runs
#[async_trait]
pub trait InferenceSession: Send + Sync {
    /// Ordered input names; the first one receives the image tensor
    fn input_names(&self) -> &[String];

    /// Ordered output names; the first one is read as the mask
    fn output_names(&self) -> &[String];

    /// Run the network on named inputs
    ///
    /// # Errors
    /// Any engine failure, passed through to the caller unchanged
    async fn run(&self, inputs: HashMap<String, Tensor>) -> Result<HashMap<String, SessionOutput>>;

    /// Human-readable backend name for logs
    fn backend_name(&self) -> &'static str {
        "custom"
    }
}

/// Run the session on a preprocessed tensor and read back the raw mask
///
/// Only the `run` call is timed.
///
/// # Errors
/// - `InferenceOutput` if the session declares no inputs or outputs, or the
///   first output is missing or not a readable tensor
/// - Any error from `run` or from the output's data accessor, unchanged
pub async fn infer(session: &dyn InferenceSession, tensor: Tensor) -> Result<InferenceOutcome> {
    let input_name = session
        .input_names()
        .first()
        .cloned()
        .ok_or_else(|| CutoutError::inference_output("session declares no input names"))?;
    let output_name = session
        .output_names()
        .first()
        .cloned()
        .ok_or_else(|| CutoutError::inference_output("session declares no output names"))?;

    let mut inputs = HashMap::with_capacity(1);
    inputs.insert(input_name.clone(), tensor);

    let start = Instant::now();
    let mut outputs = session.run(inputs).await?;
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

    log::debug!(
        "Session '{}' ran in {:.2}ms (input '{}', output '{}')",
        session.backend_name(),
        elapsed_ms,
        input_name,
        output_name
    );

    let output = outputs.remove(&output_name).ok_or_else(|| {
        CutoutError::inference_output(format!(
            "output '{}' missing from session results",
            output_name
        ))
    })?;

    let tensor = match output {
        SessionOutput::Tensor(tensor) => tensor,
        SessionOutput::Opaque { kind } => {
            return Err(CutoutError::inference_output(format!(
                "output '{}' is a {} value with no tensor data",
                output_name, kind
            )));
        },
    };

    let dims = tensor.dims().to_vec();
    let data = tensor.data().await?;

    Ok(InferenceOutcome {
        mask: MaskTensor::new(data, dims),
        elapsed_ms: elapsed_ms.max(0.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::mock::{MockFailure, MockSession};

    fn input_tensor() -> Tensor {
        Tensor::from_planar([1, 3, 4, 4], vec![0.0; 48]).unwrap()
    }

    #[tokio::test]
    async fn test_binds_first_input_and_reads_first_output() {
        let session = MockSession::builder()
            .input_names(&["pixel_values", "unused"])
            .output_names(&["alphas", "logits"])
            .mask_dims(&[1, 1, 8, 8])
            .fill(0.25)
            .build();

        let outcome = infer(&session, input_tensor()).await.unwrap();
        assert_eq!(outcome.mask.dims, vec![1, 1, 8, 8]);
        assert_eq!(outcome.mask.data.len(), 64);
        assert!(outcome.elapsed_ms >= 0.0);

        let calls = session.call_history();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].input_names, vec!["pixel_values".to_string()]);
        assert_eq!(calls[0].input_shape, [1, 3, 4, 4]);
    }

    #[tokio::test]
    async fn test_missing_output_is_inference_output_error() {
        let session = MockSession::builder()
            .failure(MockFailure::MissingOutput)
            .build();
        let err = infer(&session, input_tensor()).await.unwrap_err();
        assert!(matches!(err, CutoutError::InferenceOutput(_)));
    }

    #[tokio::test]
    async fn test_opaque_output_is_inference_output_error() {
        let session = MockSession::builder()
            .failure(MockFailure::OpaqueOutput)
            .build();
        let err = infer(&session, input_tensor()).await.unwrap_err();
        assert!(err.to_string().contains("no tensor data"));
    }

    #[tokio::test]
    async fn test_empty_name_lists_rejected() {
        let session = MockSession::builder().input_names(&[]).build();
        let err = infer(&session, input_tensor()).await.unwrap_err();
        assert!(matches!(err, CutoutError::InferenceOutput(_)));
        assert!(session.call_history().is_empty());

        let session = MockSession::builder().output_names(&[]).build();
        assert!(infer(&session, input_tensor()).await.is_err());
    }

    #[tokio::test]
    async fn test_run_failure_propagates_unchanged() {
        let session = MockSession::builder()
            .failure(MockFailure::RunError("device lost".to_string()))
            .build();
        let err = infer(&session, input_tensor()).await.unwrap_err();
        match err {
            CutoutError::Inference(message) => assert_eq!(message, "device lost"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_data_extraction_failure_propagates() {
        let session = MockSession::builder()
            .failure(MockFailure::DataError("buffer detached".to_string()))
            .build();
        let err = infer(&session, input_tensor()).await.unwrap_err();
        assert!(err.to_string().contains("buffer detached"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_run_completes() {
        let session = MockSession::builder()
            .delay(std::time::Duration::from_millis(30))
            .build();
        let outcome = infer(&session, input_tensor()).await.unwrap();
        assert_eq!(outcome.mask.dims, vec![1, 1, 320, 320]);
    }
}
