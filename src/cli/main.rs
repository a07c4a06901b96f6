//! Cutout CLI tool
//!
//! Turns photos into transparent-background PNGs using a segmentation model.

use super::{backend_factory::CliBackendFactory, config::CliConfigBuilder};
use crate::{
    processor::{CutoutProcessor, RunOutcome},
    services::{ConsoleProgressReporter, ImageIOService, ProcessingStage},
    session::SessionSlot,
    tracing_config::{init_cli_tracing, spans, TracingFormat, TracingOutput},
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};
use tracing::{debug, error, info, warn, Instrument};

/// Transparent-background cutout tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "imgly-cutout")]
pub struct Cli {
    /// Input images, directories or glob patterns (e.g. "photos/*.jpg")
    #[arg(value_name = "INPUT", required = true)]
    pub inputs: Vec<String>,

    /// Segmentation model (ONNX file)
    #[arg(short, long, value_name = "PATH")]
    pub model: PathBuf,

    /// Output file (single input) or directory
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<PathBuf>,

    /// Inference backend
    #[arg(short, long, value_enum, default_value_t = CliBackend::Onnx)]
    pub backend: CliBackend,

    /// ONNX execution provider (auto, cpu, cuda, coreml)
    #[arg(short, long)]
    pub execution_provider: Option<String>,

    /// Edge feather radius in pixels (0 disables smoothing)
    #[arg(long)]
    pub feather_radius: Option<f32>,

    /// Abort inference after this many milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Report whether inference stayed within this many milliseconds
    #[arg(long)]
    pub latency_budget_ms: Option<u64>,

    /// Number of intra-op threads (0 = auto-detect)
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// JSON pipeline configuration; flags override its values
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Process directories recursively
    #[arg(short, long)]
    pub recursive: bool,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log output format (json needs the tracing-json feature)
    #[arg(long, value_enum, default_value_t = LogFormat::Console)]
    pub log_format: LogFormat,

    /// Write logs to this file instead of stderr (needs the tracing-files feature)
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

/// Log output format selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Colored, human-readable
    Console,
    /// Plain compact lines for CI
    Compact,
    /// Structured JSON events
    Json,
}

/// Inference backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliBackend {
    /// ONNX Runtime (hardware acceleration)
    Onnx,
    /// Tract (pure Rust)
    Tract,
}

impl CliBackend {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Onnx => "onnx",
            Self::Tract => "tract",
        }
    }
}

/// Per-invocation tally
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct BatchSummary {
    processed: usize,
    failed: usize,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (format, output) = tracing_target(cli.log_format, cli.log_file.as_deref())?;
    let (_tracing_guard, session_id) =
        init_cli_tracing(cli.verbose, format, output).context("Failed to initialize tracing")?;

    let session_span = spans::session(&session_id, cli.backend.as_str());
    run(cli).instrument(session_span).await
}

/// Map the logging flags onto what this build can emit
fn tracing_target(
    format: LogFormat,
    log_file: Option<&Path>,
) -> Result<(TracingFormat, TracingOutput)> {
    let format = match format {
        LogFormat::Console => TracingFormat::Console,
        LogFormat::Compact => TracingFormat::Compact,
        #[cfg(feature = "tracing-json")]
        LogFormat::Json => TracingFormat::Json,
        #[cfg(not(feature = "tracing-json"))]
        LogFormat::Json => anyhow::bail!("--log-format json requires the tracing-json feature"),
    };

    let output = match log_file {
        None => TracingOutput::Console,
        #[cfg(feature = "tracing-files")]
        Some(path) => TracingOutput::File(path.to_path_buf()),
        #[cfg(not(feature = "tracing-files"))]
        Some(_) => anyhow::bail!("--log-file requires the tracing-files feature"),
    };

    Ok((format, output))
}

async fn run(cli: Cli) -> Result<()> {
    CliConfigBuilder::validate_cli(&cli).context("Invalid CLI arguments")?;
    let config = CliConfigBuilder::from_cli(&cli).context("Failed to build configuration")?;

    let files = collect_inputs(&cli.inputs, cli.recursive)?;
    if files.is_empty() {
        anyhow::bail!("No supported images (jpg, jpeg, png, webp) found in the provided inputs");
    }

    info!(
        backend = cli.backend.as_str(),
        provider = %config.execution_provider,
        model = %cli.model.display(),
        "Starting cutout"
    );
    debug!(available = ?CliBackendFactory::available_backends(), "Compiled backends");

    let loader = CliBackendFactory::loader(cli.backend, &cli.model, &config)?;
    let sessions = Arc::new(SessionSlot::new());
    sessions
        .reload(loader.as_ref())
        .instrument(spans::model_loading(&cli.model, cli.backend.as_str()))
        .await
        .with_context(|| format!("Failed to load model {}", loader.describe()))?;

    let processor = CutoutProcessor::new(config, sessions)
        .context("Failed to create cutout processor")?
        .with_reporter(Arc::new(ConsoleProgressReporter::new(cli.verbose > 0)));

    let start_time = Instant::now();
    let summary = process_inputs(&processor, &files, cli.output.as_deref())
        .instrument(spans::batch_processing(files.len()))
        .await?;

    info!(
        "Processed {} image(s) in {:.2}s",
        summary.processed,
        start_time.elapsed().as_secs_f64()
    );

    if summary.failed > 0 {
        anyhow::bail!(
            "{} of {} input(s) failed",
            summary.failed,
            summary.processed + summary.failed
        );
    }
    Ok(())
}

/// Expand files, directories and glob patterns into a sorted file list
fn collect_inputs(inputs: &[String], recursive: bool) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for input in inputs {
        let path = PathBuf::from(input);

        if path.is_file() {
            if ImageIOService::is_supported_format(&path) {
                files.push(path);
            } else {
                warn!("Skipping unsupported file: {}", path.display());
            }
        } else if path.is_dir() {
            files.extend(find_image_files(&path, recursive)?);
        } else if is_glob_pattern(input) {
            let matches =
                glob::glob(input).with_context(|| format!("Invalid glob pattern: {input}"))?;
            for entry in matches {
                let matched = entry.context("Failed to read glob match")?;
                if matched.is_file() && ImageIOService::is_supported_format(&matched) {
                    files.push(matched);
                }
            }
        } else {
            anyhow::bail!(
                "Input path does not exist or is not accessible: {}",
                path.display()
            );
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}

fn is_glob_pattern(input: &str) -> bool {
    input.contains(&['*', '?', '['][..])
}

/// Find images in a directory
fn find_image_files(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut files = Vec::new();

    for entry in walkdir::WalkDir::new(dir).max_depth(max_depth) {
        let entry = entry.with_context(|| format!("Failed to read directory {}", dir.display()))?;
        if entry.file_type().is_file() && ImageIOService::is_supported_format(entry.path()) {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

/// Where outputs go: `-o` is a directory whenever more than one input is given
fn prepare_output_target(output: Option<&Path>, file_count: usize) -> Result<Option<PathBuf>> {
    let Some(output) = output else {
        return Ok(None);
    };

    if file_count > 1 {
        if output.is_file() {
            anyhow::bail!(
                "Output path exists and is a file, not a directory: {}",
                output.display()
            );
        }
        std::fs::create_dir_all(output).with_context(|| {
            format!("Failed to create output directory: {}", output.display())
        })?;
    }

    Ok(Some(output.to_path_buf()))
}

/// Assign an output path to every input
///
/// A target that names any input, or an output already handed out, falls
/// back to `<stem>_cutout.png` (then `<stem>_cutout_2.png`, ...).
fn plan_outputs(files: &[PathBuf], output: Option<&Path>) -> Vec<PathBuf> {
    let inputs: HashSet<&Path> = files.iter().map(PathBuf::as_path).collect();
    let mut assigned: HashSet<PathBuf> = HashSet::with_capacity(files.len());

    files
        .iter()
        .map(|input| {
            let preferred = ImageIOService::output_path_for(input, output);
            // Variants derive from the input's own PNG name unless -o names a file
            let base = match output {
                Some(file) if !file.is_dir() => preferred.clone(),
                _ => input
                    .file_name()
                    .map(|name| ImageIOService::png_file_name(&name.to_string_lossy()))
                    .map_or_else(|| preferred.clone(), |name| preferred.with_file_name(name)),
            };
            let taken = |path: &Path| inputs.contains(path) || assigned.contains(path);

            let mut target = preferred.clone();
            let mut attempt = 1;
            while taken(target.as_path()) {
                target = ImageIOService::cutout_variant(&base, attempt);
                attempt += 1;
            }
            if target != preferred {
                warn!(
                    "{} would overwrite {}, writing {} instead",
                    input.display(),
                    preferred.display(),
                    target.display()
                );
            }
            assigned.insert(target.clone());
            target
        })
        .collect()
}

async fn process_inputs(
    processor: &CutoutProcessor,
    files: &[PathBuf],
    output: Option<&Path>,
) -> Result<BatchSummary> {
    let output = prepare_output_target(output, files.len())?;

    let progress_bar = (files.len() > 1).then(|| {
        let pb = ProgressBar::new(files.len() as u64);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .map(|style| style.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        pb
    });

    let mut summary = BatchSummary::default();
    let outputs = plan_outputs(files, output.as_deref());

    for (input, output_path) in files.iter().zip(&outputs) {
        if let Some(pb) = &progress_bar {
            pb.set_message(format!("Processing {}", input.display()));
        }

        match process_single_file(processor, input, output_path)
            .instrument(spans::file_processing(input))
            .await
        {
            Ok(()) => summary.processed += 1,
            Err(e) => {
                error!("Failed to process {}: {:#}", input.display(), e);
                summary.failed += 1;
            },
        }

        if let Some(pb) = &progress_bar {
            pb.inc(1);
        }
    }

    if let Some(pb) = progress_bar {
        pb.finish_with_message(format!(
            "Completed! Processed: {}, Failed: {}",
            summary.processed, summary.failed
        ));
    }

    Ok(summary)
}

async fn process_single_file(
    processor: &CutoutProcessor,
    input: &Path,
    output: &Path,
) -> Result<()> {
    let outcome = processor
        .process_file(input)
        .await
        .context("Failed to cut out subject")?;

    let result = match outcome {
        RunOutcome::Completed(result) => result,
        RunOutcome::Superseded { generation } => {
            anyhow::bail!("Run {generation} was superseded before it completed")
        },
    };

    let mut tracker = processor.tracker();
    tracker.report_stage(ProcessingStage::FileSaving);
    if let Err(e) = ImageIOService::write_png(output, &result.composite) {
        tracker.report_error(&e.to_string());
        return Err(e).with_context(|| format!("Failed to write {}", output.display()));
    }

    if let Some(within) = result.within_latency_budget {
        if !within {
            warn!(
                "Inference for {} took {:.1}ms, over the latency budget",
                input.display(),
                result.inference_ms
            );
        }
    }

    info!(
        "{} -> {} ({})",
        input.display(),
        output.display(),
        result.timing_summary()
    );
    Ok(())
}
