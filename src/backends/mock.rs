//! Scriptable in-memory session
//!
//! Produces synthetic masks without any model file. Used by the test suite,
//! the benchmarks and anyone exercising the pipeline offline.

use crate::{
    error::{CutoutError, Result},
    inference::{InferenceSession, OutputTensor, SessionOutput},
    types::Tensor,
};
use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

/// Mask content produced by `MockSession`
#[derive(Debug, Clone, PartialEq)]
pub enum MockMask {
    /// Every value equal
    Uniform(f32),
    /// Soft-edged disc centered in the grid, 1.0 at the center
    SoftCircle,
    /// Explicit values; length need not match the dims
    Data(Vec<f32>),
}

/// Failure to inject into a `MockSession` run
#[derive(Debug, Clone, PartialEq)]
pub enum MockFailure {
    /// `run` rejects with an engine error
    RunError(String),
    /// The first declared output is absent from the results
    MissingOutput,
    /// The first declared output is not a tensor
    OpaqueOutput,
    /// The output's data accessor fails
    DataError(String),
}

/// Record of one `run` invocation
#[derive(Debug, Clone, PartialEq)]
pub struct MockCall {
    /// Input names bound by the caller
    pub input_names: Vec<String>,
    /// Shape of the first bound tensor
    pub input_shape: [usize; 4],
}

/// In-memory session with configurable output and failures
#[derive(Debug, Clone)]
pub struct MockSession {
    input_names: Vec<String>,
    output_names: Vec<String>,
    mask_dims: Vec<usize>,
    mask: MockMask,
    delay: Option<Duration>,
    failure: Option<MockFailure>,
    /// Call history for verification in tests
    call_history: Arc<Mutex<Vec<MockCall>>>,
}

impl Default for MockSession {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl MockSession {
    /// Session emitting a `[1, 1, 320, 320]` mask filled with `value`
    #[must_use]
    pub fn uniform(value: f32) -> Self {
        Self::builder().fill(value).build()
    }

    #[must_use]
    pub fn builder() -> MockSessionBuilder {
        MockSessionBuilder::default()
    }

    /// Get the call history for verification in tests
    #[must_use]
    pub fn call_history(&self) -> Vec<MockCall> {
        self.call_history
            .lock()
            .map(|history| history.clone())
            .unwrap_or_default()
    }

    /// Number of completed `run` invocations
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.call_history().len()
    }

    fn record_call(&self, inputs: &HashMap<String, Tensor>) {
        let mut input_names: Vec<String> = inputs.keys().cloned().collect();
        input_names.sort();
        let input_shape = inputs.values().next().map_or([0; 4], Tensor::shape);

        if let Ok(mut history) = self.call_history.lock() {
            history.push(MockCall {
                input_names,
                input_shape,
            });
        }
    }

    /// Generate the mask values for the configured dims
    fn generate_mask(&self) -> Vec<f32> {
        let len: usize = self.mask_dims.iter().product();
        match &self.mask {
            MockMask::Uniform(value) => vec![*value; len],
            MockMask::Data(values) => values.clone(),
            MockMask::SoftCircle => {
                let (height, width) = match self.mask_dims.as_slice() {
                    [.., h, w] => (*h, *w),
                    _ => (1, len),
                };
                let center_x = width as f32 / 2.0;
                let center_y = height as f32 / 2.0;
                let radius = (width.min(height) as f32 / 3.0).max(1.0);

                (0..height)
                    .flat_map(|y| (0..width).map(move |x| (x, y)))
                    .map(|(x, y)| {
                        let dx = x as f32 + 0.5 - center_x;
                        let dy = y as f32 + 0.5 - center_y;
                        let distance = (dx * dx + dy * dy).sqrt();
                        ((radius - distance) / radius).clamp(0.0, 1.0)
                    })
                    .collect()
            },
        }
    }
}

#[async_trait]
impl InferenceSession for MockSession {
    fn input_names(&self) -> &[String] {
        &self.input_names
    }

    fn output_names(&self) -> &[String] {
        &self.output_names
    }

    async fn run(&self, inputs: HashMap<String, Tensor>) -> Result<HashMap<String, SessionOutput>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.record_call(&inputs);

        let mut outputs = HashMap::new();
        let Some(output_name) = self.output_names.first().cloned() else {
            return Ok(outputs);
        };

        match &self.failure {
            Some(MockFailure::RunError(message)) => {
                return Err(CutoutError::inference(message.clone()));
            },
            Some(MockFailure::MissingOutput) => {
                outputs.insert(
                    format!("{}_unrelated", output_name),
                    SessionOutput::Opaque {
                        kind: "sequence".to_string(),
                    },
                );
            },
            Some(MockFailure::OpaqueOutput) => {
                outputs.insert(
                    output_name,
                    SessionOutput::Opaque {
                        kind: "map".to_string(),
                    },
                );
            },
            Some(MockFailure::DataError(message)) => {
                outputs.insert(
                    output_name,
                    SessionOutput::Tensor(Box::new(MockOutputTensor {
                        dims: self.mask_dims.clone(),
                        data: Err(message.clone()),
                    })),
                );
            },
            None => {
                outputs.insert(
                    output_name,
                    SessionOutput::Tensor(Box::new(MockOutputTensor {
                        dims: self.mask_dims.clone(),
                        data: Ok(self.generate_mask()),
                    })),
                );
            },
        }

        Ok(outputs)
    }

    fn backend_name(&self) -> &'static str {
        "mock"
    }
}

/// Output tensor handed back by `MockSession`
struct MockOutputTensor {
    dims: Vec<usize>,
    data: std::result::Result<Vec<f32>, String>,
}

#[async_trait]
impl OutputTensor for MockOutputTensor {
    fn dims(&self) -> &[usize] {
        &self.dims
    }

    async fn data(&self) -> Result<Vec<f32>> {
        self.data.clone().map_err(CutoutError::inference)
    }
}

/// Builder for `MockSession`
#[derive(Debug)]
pub struct MockSessionBuilder {
    session: MockSession,
}

impl Default for MockSessionBuilder {
    fn default() -> Self {
        Self {
            session: MockSession {
                input_names: vec!["input".to_string()],
                output_names: vec!["output".to_string()],
                mask_dims: vec![1, 1, 320, 320],
                mask: MockMask::Uniform(1.0),
                delay: None,
                failure: None,
                call_history: Arc::new(Mutex::new(Vec::new())),
            },
        }
    }
}

impl MockSessionBuilder {
    #[must_use]
    pub fn input_names(mut self, names: &[&str]) -> Self {
        self.session.input_names = names.iter().map(ToString::to_string).collect();
        self
    }

    #[must_use]
    pub fn output_names(mut self, names: &[&str]) -> Self {
        self.session.output_names = names.iter().map(ToString::to_string).collect();
        self
    }

    /// Shape descriptor reported for the mask output
    #[must_use]
    pub fn mask_dims(mut self, dims: &[usize]) -> Self {
        self.session.mask_dims = dims.to_vec();
        self
    }

    /// Uniform mask value
    #[must_use]
    pub fn fill(mut self, value: f32) -> Self {
        self.session.mask = MockMask::Uniform(value);
        self
    }

    #[must_use]
    pub fn mask(mut self, mask: MockMask) -> Self {
        self.session.mask = mask;
        self
    }

    /// Artificial latency inside `run`
    #[must_use]
    pub fn delay(mut self, delay: Duration) -> Self {
        self.session.delay = Some(delay);
        self
    }

    #[must_use]
    pub fn failure(mut self, failure: MockFailure) -> Self {
        self.session.failure = Some(failure);
        self
    }

    #[must_use]
    pub fn build(self) -> MockSession {
        self.session
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> HashMap<String, Tensor> {
        let mut inputs = HashMap::new();
        inputs.insert(
            "input".to_string(),
            Tensor::from_planar([1, 3, 2, 2], vec![0.0; 12]).unwrap(),
        );
        inputs
    }

    #[tokio::test]
    async fn test_uniform_output() {
        let session = MockSession::builder()
            .mask_dims(&[1, 4, 5])
            .fill(0.3)
            .build();
        let mut outputs = session.run(input()).await.unwrap();

        let Some(SessionOutput::Tensor(tensor)) = outputs.remove("output") else {
            panic!("expected tensor output");
        };
        assert_eq!(tensor.dims(), &[1, 4, 5]);
        let data = tensor.data().await.unwrap();
        assert_eq!(data.len(), 20);
        assert!(data.iter().all(|v| (*v - 0.3).abs() < f32::EPSILON));
    }

    #[tokio::test]
    async fn test_soft_circle_peaks_in_center() {
        let session = MockSession::builder()
            .mask_dims(&[1, 1, 30, 30])
            .mask(MockMask::SoftCircle)
            .build();
        let mut outputs = session.run(input()).await.unwrap();
        let Some(SessionOutput::Tensor(tensor)) = outputs.remove("output") else {
            panic!("expected tensor output");
        };
        let data = tensor.data().await.unwrap();
        assert_eq!(data.len(), 900);
        assert!(data[15 * 30 + 15] > 0.8);
        assert_eq!(data[0], 0.0);
    }

    #[tokio::test]
    async fn test_call_history_shared_between_clones() {
        let session = MockSession::default();
        let clone = session.clone();
        clone.run(input()).await.unwrap();
        assert_eq!(session.call_count(), 1);
        assert_eq!(session.call_history()[0].input_shape, [1, 3, 2, 2]);
    }

    #[tokio::test]
    async fn test_run_error_injected() {
        let session = MockSession::builder()
            .failure(MockFailure::RunError("boom".to_string()))
            .build();
        assert!(matches!(
            session.run(input()).await,
            Err(CutoutError::Inference(_))
        ));
    }
}
