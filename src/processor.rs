//! Cutout pipeline driver
//!
//! Runs the stages strictly in order: preprocess, infer, resolve the mask
//! geometry, resample, feather, composite. Every run carries a generation
//! ticket; starting a new run supersedes all earlier tickets, and a
//! superseded run drops its result instead of returning it as current.

use crate::{
    config::PipelineConfig,
    error::{CutoutError, Result},
    inference::{infer, InferenceSession},
    services::{Compositor, ImageIOService, ProcessingStage, ProgressReporter, ProgressTracker},
    session::SessionSlot,
    types::{CutoutResult, ProcessingTimings},
    utils::{feather, mask_size, resample, ImagePreprocessor, UploadValidator},
};
use image::DynamicImage;
use instant::Instant;
use std::{
    path::Path,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tracing::{debug, info, info_span, instrument, span, warn, Instrument, Level};

/// Generation identifier handed out by `CutoutProcessor::begin_run`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunTicket {
    generation: u64,
}

impl RunTicket {
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Result of a pipeline run
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// The run finished while still current
    Completed(Box<CutoutResult>),
    /// A newer run started first; the result was discarded
    Superseded { generation: u64 },
}

impl RunOutcome {
    /// The completed result, if the run was still current
    #[must_use]
    pub fn into_result(self) -> Option<CutoutResult> {
        match self {
            Self::Completed(result) => Some(*result),
            Self::Superseded { .. } => None,
        }
    }

    #[must_use]
    pub fn is_superseded(&self) -> bool {
        matches!(self, Self::Superseded { .. })
    }
}

/// Drives cutout runs against a shared inference session
pub struct CutoutProcessor {
    config: PipelineConfig,
    sessions: Arc<SessionSlot>,
    generation: AtomicU64,
    reporter: Option<Arc<dyn ProgressReporter>>,
}

impl CutoutProcessor {
    /// Create a processor over a (possibly not yet ready) session slot
    ///
    /// # Errors
    /// `InvalidConfig` if the configuration does not validate
    pub fn new(config: PipelineConfig, sessions: Arc<SessionSlot>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            sessions,
            generation: AtomicU64::new(0),
            reporter: None,
        })
    }

    /// Create a processor with a session that is ready immediately
    ///
    /// # Errors
    /// `InvalidConfig` if the configuration does not validate
    pub fn with_session(config: PipelineConfig, session: Arc<dyn InferenceSession>) -> Result<Self> {
        Self::new(config, Arc::new(SessionSlot::ready(session)))
    }

    /// Attach a progress reporter
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Shared session slot, for installs and reloads
    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionSlot> {
        &self.sessions
    }

    /// Start a new run, superseding every earlier ticket
    pub fn begin_run(&self) -> RunTicket {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(generation, "Starting new run");
        RunTicket { generation }
    }

    /// Whether `ticket` belongs to the most recent run
    #[must_use]
    pub fn is_current(&self, ticket: &RunTicket) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket.generation
    }

    /// Run the pipeline on a decoded image under an existing ticket
    ///
    /// # Errors
    /// Any stage error; see `CutoutError`
    pub async fn run(&self, ticket: RunTicket, image: &DynamicImage) -> Result<RunOutcome> {
        let mut tracker = self.tracker();
        self.run_tracked(ticket, image, ProcessingTimings::default(), &mut tracker)
            .await
    }

    /// Start a new run for `image` and drive it to completion
    ///
    /// # Errors
    /// Any stage error; see `CutoutError`
    pub async fn process_image(&self, image: &DynamicImage) -> Result<RunOutcome> {
        let ticket = self.begin_run();
        self.run(ticket, image).await
    }

    /// Validate, decode and process an uploaded image
    ///
    /// # Errors
    /// Upload rejections, decode failures, or any stage error
    pub async fn process_bytes(&self, bytes: &[u8]) -> Result<RunOutcome> {
        let ticket = self.begin_run();
        let mut tracker = self.tracker();
        let mut timings = ProcessingTimings::default();

        let image = match self.decode_upload(bytes, &mut tracker, &mut timings) {
            Ok(image) => image,
            Err(e) if !self.is_current(&ticket) => {
                debug!(generation = ticket.generation, error = %e, "Superseded upload rejected");
                return Ok(self.superseded(ticket, e.stage()));
            },
            Err(e) => {
                tracker.report_error(&e.to_string());
                return Err(e);
            },
        };

        self.run_tracked(ticket, &image, timings, &mut tracker).await
    }

    /// Read, validate, decode and process an image file
    ///
    /// # Errors
    /// File IO errors, upload rejections, decode failures, or any stage error
    pub async fn process_file<P: AsRef<Path>>(&self, path: P) -> Result<RunOutcome> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| CutoutError::file_io_error("read input file", path, &e))?;
        info!(path = %path.display(), bytes = bytes.len(), "Processing file");
        self.process_bytes(&bytes).await
    }

    /// Fresh tracker bound to the attached reporter
    pub(crate) fn tracker(&self) -> ProgressTracker {
        self.reporter
            .as_ref()
            .map_or_else(ProgressTracker::no_op, |r| ProgressTracker::new(Arc::clone(r)))
    }

    fn decode_upload(
        &self,
        bytes: &[u8],
        tracker: &mut ProgressTracker,
        timings: &mut ProcessingTimings,
    ) -> Result<DynamicImage> {
        tracker.report_stage(ProcessingStage::Validation);
        let info = UploadValidator::new(self.config.validation).validate(bytes)?;
        debug!(
            format = ?info.format,
            width = info.width,
            height = info.height,
            bytes = info.byte_len,
            "Upload accepted"
        );

        tracker.report_stage(ProcessingStage::ImageLoading);
        let decode_start = Instant::now();
        let image = ImageIOService::load_from_bytes(bytes)?;
        timings.decode_ms = decode_start.elapsed().as_millis() as u64;
        Ok(image)
    }

    async fn run_tracked(
        &self,
        ticket: RunTicket,
        image: &DynamicImage,
        timings: ProcessingTimings,
        tracker: &mut ProgressTracker,
    ) -> Result<RunOutcome> {
        let result = match self.run_stages(ticket, image, timings, tracker).await {
            // A stale run drops its failure along with its result
            Err(e) if !self.is_current(&ticket) => {
                debug!(generation = ticket.generation, error = %e, "Superseded run failed");
                Ok(self.superseded(ticket, e.stage()))
            },
            other => other,
        };
        match &result {
            Ok(RunOutcome::Completed(done)) => tracker.report_completion(&done.timings),
            Ok(RunOutcome::Superseded { .. }) => {},
            Err(e) => tracker.report_error(&e.to_string()),
        }
        result
    }

    #[instrument(
        skip(self, ticket, image, timings, tracker),
        fields(
            generation = ticket.generation,
            dimensions = %format!("{}x{}", image.width(), image.height())
        )
    )]
    async fn run_stages(
        &self,
        ticket: RunTicket,
        image: &DynamicImage,
        mut timings: ProcessingTimings,
        tracker: &mut ProgressTracker,
    ) -> Result<RunOutcome> {
        let total_start = Instant::now();
        let (width, height) = (image.width(), image.height());

        let session = self.sessions.current().await?;

        // Preprocess into the model tensor
        tracker.report_stage(ProcessingStage::Preprocessing);
        let tensor = {
            let _span = span!(
                Level::DEBUG,
                "preprocessing",
                original_width = width,
                original_height = height
            )
            .entered();
            let start = Instant::now();
            let tensor = ImagePreprocessor::to_tensor(image)?;
            timings.preprocessing_ms = start.elapsed().as_millis() as u64;
            tensor
        };

        // Inference, the only suspension point
        tracker.report_stage(ProcessingStage::Inference);
        let inference = infer(session.as_ref(), tensor)
            .instrument(info_span!("inference", backend = session.backend_name()));
        let outcome = match self.config.inference_timeout_ms {
            Some(timeout_ms) => tokio::time::timeout(Duration::from_millis(timeout_ms), inference)
                .await
                .map_err(|_| CutoutError::InferenceTimeout { timeout_ms })??,
            None => inference.await?,
        };
        timings.inference_ms = outcome.elapsed_ms.round() as u64;

        let within_latency_budget = self.config.latency_budget_ms.map(|budget| {
            let within = outcome.elapsed_ms <= budget as f64;
            if !within {
                warn!(
                    inference_ms = outcome.elapsed_ms,
                    budget_ms = budget,
                    "Inference exceeded latency budget"
                );
            }
            within
        });

        if !self.is_current(&ticket) {
            return Ok(self.superseded(ticket, "inference"));
        }

        // Mask geometry and resampling back to the source resolution
        tracker.report_stage(ProcessingStage::MaskResampling);
        let alpha = {
            let _span = span!(Level::DEBUG, "resample", width, height).entered();
            let start = Instant::now();
            let grid = mask_size(&outcome.mask)?;
            debug!(
                mask_width = grid.width,
                mask_height = grid.height,
                "Resolved mask geometry"
            );
            let alpha = resample(&outcome.mask, grid.width, grid.height, width, height)?;
            timings.resample_ms = start.elapsed().as_millis() as u64;
            alpha
        };

        tracker.report_stage(ProcessingStage::EdgeFeathering);
        let alpha = {
            let _span = span!(
                Level::DEBUG,
                "feather",
                radius = self.config.feather_radius
            )
            .entered();
            let start = Instant::now();
            let alpha = feather(alpha.as_slice(), width, height, self.config.feather_radius)?;
            timings.feather_ms = start.elapsed().as_millis() as u64;
            alpha
        };

        tracker.report_stage(ProcessingStage::Compositing);
        let composite = {
            let _span = span!(Level::DEBUG, "composite", width, height).entered();
            let start = Instant::now();
            let composite = Compositor::composite(image, &alpha)?;
            timings.composite_ms = start.elapsed().as_millis() as u64;
            composite
        };

        if !self.is_current(&ticket) {
            return Ok(self.superseded(ticket, "compositing"));
        }

        timings.total_ms = timings.decode_ms + total_start.elapsed().as_millis() as u64;
        tracker.report_stage(ProcessingStage::Completed);

        let result = CutoutResult {
            composite,
            alpha,
            inference_ms: outcome.elapsed_ms,
            within_latency_budget,
            timings,
            completed_at: chrono::Utc::now(),
        };
        info!(summary = %result.timing_summary(), "Cutout complete");

        Ok(RunOutcome::Completed(Box::new(result)))
    }

    fn superseded(&self, ticket: RunTicket, after: &str) -> RunOutcome {
        info!(
            generation = ticket.generation,
            current = self.generation.load(Ordering::SeqCst),
            after,
            "Discarding result of superseded run"
        );
        RunOutcome::Superseded {
            generation: ticket.generation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::mock::{MockFailure, MockSession};
    use image::{Rgb, RgbImage};

    fn photo(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([90, 140, 200])))
    }

    fn processor(session: MockSession, config: PipelineConfig) -> CutoutProcessor {
        CutoutProcessor::with_session(config, Arc::new(session)).unwrap()
    }

    #[tokio::test]
    async fn test_process_image_keeps_source_dimensions() {
        let processor = processor(MockSession::uniform(1.0), PipelineConfig::default());
        let result = processor
            .process_image(&photo(640, 480))
            .await
            .unwrap()
            .into_result()
            .unwrap();

        assert_eq!(result.dimensions(), (640, 480));
        assert_eq!(result.alpha.len(), 640 * 480);
        assert!(result.within_latency_budget.is_none());
    }

    #[tokio::test]
    async fn test_generation_counter() {
        let processor = processor(MockSession::default(), PipelineConfig::default());
        let first = processor.begin_run();
        assert!(processor.is_current(&first));
        let second = processor.begin_run();
        assert!(!processor.is_current(&first));
        assert!(processor.is_current(&second));
        assert_eq!(second.generation(), first.generation() + 1);
    }

    #[tokio::test]
    async fn test_stale_ticket_is_superseded() {
        let processor = processor(MockSession::default(), PipelineConfig::default());
        let stale = processor.begin_run();
        let _newer = processor.begin_run();

        let outcome = processor.run(stale, &photo(10, 10)).await.unwrap();
        assert!(outcome.is_superseded());
        assert!(outcome.into_result().is_none());
    }

    #[tokio::test]
    async fn test_session_not_ready() {
        let processor =
            CutoutProcessor::new(PipelineConfig::default(), Arc::new(SessionSlot::new())).unwrap();
        let err = processor.process_image(&photo(4, 4)).await.unwrap_err();
        assert!(matches!(err, CutoutError::SessionNotReady));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_maps_to_inference_timeout() {
        let session = MockSession::builder()
            .delay(Duration::from_millis(500))
            .build();
        let config = PipelineConfig::builder()
            .inference_timeout_ms(50)
            .build()
            .unwrap();
        let err = processor(session, config)
            .process_image(&photo(8, 8))
            .await
            .unwrap_err();
        assert!(matches!(err, CutoutError::InferenceTimeout { timeout_ms: 50 }));
    }

    #[tokio::test]
    async fn test_latency_budget_is_reported_not_enforced() {
        let config = PipelineConfig::builder()
            .latency_budget_ms(60_000)
            .build()
            .unwrap();
        let result = processor(MockSession::uniform(0.5), config)
            .process_image(&photo(8, 8))
            .await
            .unwrap()
            .into_result()
            .unwrap();
        assert_eq!(result.within_latency_budget, Some(true));
    }

    #[tokio::test]
    async fn test_unsupported_rank_surfaces() {
        let session = MockSession::builder().mask_dims(&[320, 320]).build();
        let err = processor(session, PipelineConfig::default())
            .process_image(&photo(8, 8))
            .await
            .unwrap_err();
        assert!(matches!(err, CutoutError::UnsupportedMaskRank { rank: 2, .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_inference_failure_surfaces() {
        let session = MockSession::builder()
            .failure(MockFailure::MissingOutput)
            .build();
        let err = processor(session, PipelineConfig::default())
            .process_image(&photo(8, 8))
            .await
            .unwrap_err();
        assert!(matches!(err, CutoutError::InferenceOutput(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let config = PipelineConfig {
            feather_radius: -2.0,
            ..PipelineConfig::default()
        };
        assert!(CutoutProcessor::with_session(config, Arc::new(MockSession::default())).is_err());
    }
}
