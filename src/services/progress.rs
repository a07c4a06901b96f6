//! Progress reporting service
//!
//! This module separates progress reporting concerns from the pipeline,
//! allowing different frontends to implement their own progress handling.

use crate::types::ProcessingTimings;
use instant::Instant;
use std::sync::Arc;

/// Progress stages of one cutout run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    /// Checking format and size ceilings of an upload
    Validation,
    /// Loading and decoding input image
    ImageLoading,
    /// Letterboxing the image into the model tensor
    Preprocessing,
    /// Running model inference
    Inference,
    /// Stretching the mask back to the source resolution
    MaskResampling,
    /// Smoothing mask edges
    EdgeFeathering,
    /// Applying alpha and encoding the PNG
    Compositing,
    /// Saving result to file
    FileSaving,
    /// Processing completed
    Completed,
}

impl ProcessingStage {
    /// Get a human-readable description of the processing stage
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            ProcessingStage::Validation => "Validating upload",
            ProcessingStage::ImageLoading => "Loading input image",
            ProcessingStage::Preprocessing => "Preprocessing image",
            ProcessingStage::Inference => "Running segmentation model",
            ProcessingStage::MaskResampling => "Resampling mask",
            ProcessingStage::EdgeFeathering => "Feathering mask edges",
            ProcessingStage::Compositing => "Compositing transparent PNG",
            ProcessingStage::FileSaving => "Saving result",
            ProcessingStage::Completed => "Processing completed",
        }
    }

    /// Get the typical progress percentage for this stage
    #[must_use]
    pub fn progress_percentage(&self) -> u8 {
        match self {
            ProcessingStage::Validation => 2,
            ProcessingStage::ImageLoading => 5,
            ProcessingStage::Preprocessing => 15,
            ProcessingStage::Inference => 25,
            ProcessingStage::MaskResampling => 75,
            ProcessingStage::EdgeFeathering => 85,
            ProcessingStage::Compositing => 92,
            ProcessingStage::FileSaving => 98,
            ProcessingStage::Completed => 100,
        }
    }
}

/// Progress update containing stage and timing information
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Current processing stage
    pub stage: ProcessingStage,
    /// Progress percentage (0-100)
    pub progress: u8,
    /// Human-readable stage description
    pub description: String,
    /// Elapsed time since processing started (milliseconds)
    pub elapsed_ms: u64,
}

impl ProgressUpdate {
    /// Create a new progress update
    #[must_use]
    pub fn new(stage: ProcessingStage, start_time: Instant) -> Self {
        Self {
            progress: stage.progress_percentage(),
            description: stage.description().to_string(),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
            stage,
        }
    }
}

/// Trait for reporting progress during cutout runs
pub trait ProgressReporter: Send + Sync {
    /// Report a progress update
    fn report_progress(&self, update: ProgressUpdate);

    /// Report processing completion with final timings
    fn report_completion(&self, timings: &ProcessingTimings);

    /// Report an error during processing
    fn report_error(&self, stage: ProcessingStage, error: &str);
}

/// No-op progress reporter that discards all progress updates
#[derive(Debug, Default)]
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _update: ProgressUpdate) {}

    fn report_completion(&self, _timings: &ProcessingTimings) {}

    fn report_error(&self, _stage: ProcessingStage, _error: &str) {}
}

/// Console progress reporter that logs progress through the `log` facade
#[derive(Debug)]
pub struct ConsoleProgressReporter {
    verbose: bool,
}

impl ConsoleProgressReporter {
    /// Create a new console progress reporter
    ///
    /// # Arguments
    /// * `verbose` - Whether to show detailed progress information
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        if self.verbose {
            log::info!(
                "[{}%] {} ({}ms elapsed)",
                update.progress,
                update.description,
                update.elapsed_ms
            );
        } else {
            log::debug!("[{}%] {}", update.progress, update.description);
        }
    }

    fn report_completion(&self, timings: &ProcessingTimings) {
        log::info!("Cutout completed in {}ms", timings.total_ms);

        if self.verbose {
            for (stage, percent) in timings.breakdown_percentages() {
                log::info!("  {stage}: {percent:.1}%");
            }
        }
    }

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        log::error!("Error during {}: {}", stage.description(), error);
    }
}

/// Per-run tracker that stamps updates with the elapsed time
pub struct ProgressTracker {
    reporter: Arc<dyn ProgressReporter>,
    start_time: Instant,
    current_stage: Option<ProcessingStage>,
}

impl ProgressTracker {
    /// Create a new progress tracker with the specified reporter
    #[must_use]
    pub fn new(reporter: Arc<dyn ProgressReporter>) -> Self {
        Self {
            reporter,
            start_time: Instant::now(),
            current_stage: None,
        }
    }

    /// Create a progress tracker with no-op reporter
    #[must_use]
    pub fn no_op() -> Self {
        Self::new(Arc::new(NoOpProgressReporter))
    }

    /// Report progress for a specific stage
    pub fn report_stage(&mut self, stage: ProcessingStage) {
        self.current_stage = Some(stage);
        self.reporter
            .report_progress(ProgressUpdate::new(stage, self.start_time));
    }

    /// Report completion with final timings
    pub fn report_completion(&self, timings: &ProcessingTimings) {
        self.reporter.report_completion(timings);
    }

    /// Report an error against the most recent stage
    pub fn report_error(&self, error: &str) {
        let stage = self.current_stage.unwrap_or(ProcessingStage::Validation);
        self.reporter.report_error(stage, error);
    }

    /// Get the elapsed time since tracking started
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    /// Get the current processing stage
    #[must_use]
    pub fn current_stage(&self) -> Option<ProcessingStage> {
        self.current_stage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingReporter {
        stages: Mutex<Vec<ProcessingStage>>,
        errors: Mutex<Vec<(ProcessingStage, String)>>,
        completions: Mutex<u32>,
    }

    impl ProgressReporter for RecordingReporter {
        fn report_progress(&self, update: ProgressUpdate) {
            self.stages.lock().unwrap().push(update.stage);
        }

        fn report_completion(&self, _timings: &ProcessingTimings) {
            *self.completions.lock().unwrap() += 1;
        }

        fn report_error(&self, stage: ProcessingStage, error: &str) {
            self.errors.lock().unwrap().push((stage, error.to_string()));
        }
    }

    #[test]
    fn test_stage_progress_is_monotonic() {
        let order = [
            ProcessingStage::Validation,
            ProcessingStage::ImageLoading,
            ProcessingStage::Preprocessing,
            ProcessingStage::Inference,
            ProcessingStage::MaskResampling,
            ProcessingStage::EdgeFeathering,
            ProcessingStage::Compositing,
            ProcessingStage::FileSaving,
            ProcessingStage::Completed,
        ];
        for pair in order.windows(2) {
            assert!(pair[0].progress_percentage() < pair[1].progress_percentage());
        }
        assert_eq!(ProcessingStage::Completed.progress_percentage(), 100);
    }

    #[test]
    fn test_tracker_records_stages_and_errors() {
        let reporter = Arc::new(RecordingReporter::default());
        let mut tracker = ProgressTracker::new(reporter.clone());

        assert!(tracker.current_stage().is_none());
        tracker.report_stage(ProcessingStage::Preprocessing);
        tracker.report_stage(ProcessingStage::Inference);
        tracker.report_error("session lost");
        tracker.report_completion(&ProcessingTimings::default());

        assert_eq!(
            *reporter.stages.lock().unwrap(),
            vec![ProcessingStage::Preprocessing, ProcessingStage::Inference]
        );
        assert_eq!(
            reporter.errors.lock().unwrap()[0],
            (ProcessingStage::Inference, "session lost".to_string())
        );
        assert_eq!(*reporter.completions.lock().unwrap(), 1);
        assert_eq!(tracker.current_stage(), Some(ProcessingStage::Inference));
    }

    #[test]
    fn test_update_carries_description() {
        let update = ProgressUpdate::new(ProcessingStage::EdgeFeathering, Instant::now());
        assert_eq!(update.progress, 85);
        assert_eq!(update.description, "Feathering mask edges");
    }

    #[test]
    fn test_trait_object_safety() {
        let reporters: Vec<Arc<dyn ProgressReporter>> = vec![
            Arc::new(NoOpProgressReporter),
            Arc::new(ConsoleProgressReporter::new(true)),
        ];
        for reporter in reporters {
            reporter.report_progress(ProgressUpdate::new(
                ProcessingStage::Completed,
                Instant::now(),
            ));
        }
    }
}
