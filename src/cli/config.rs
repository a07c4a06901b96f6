//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::Cli;
use crate::config::{ExecutionProvider, PipelineConfig};
use anyhow::{Context, Result};

/// Convert CLI arguments to a `PipelineConfig`
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build the pipeline configuration
    ///
    /// A `--config` JSON file provides the base; explicit flags override it.
    pub(crate) fn from_cli(cli: &Cli) -> Result<PipelineConfig> {
        let mut config = match &cli.config {
            Some(path) => PipelineConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?,
            None => PipelineConfig::default(),
        };

        if let Some(radius) = cli.feather_radius {
            config.feather_radius = radius;
        }
        if let Some(timeout_ms) = cli.timeout_ms {
            config.inference_timeout_ms = Some(timeout_ms);
        }
        if let Some(budget_ms) = cli.latency_budget_ms {
            config.latency_budget_ms = Some(budget_ms);
        }
        if let Some(provider) = &cli.execution_provider {
            config.execution_provider = provider
                .parse::<ExecutionProvider>()
                .context("Invalid --execution-provider")?;
        }
        if let Some(threads) = cli.threads {
            config.intra_threads = threads;
        }

        config.validate().context("Invalid pipeline configuration")?;
        Ok(config)
    }

    /// Validate argument combinations clap cannot express
    pub(crate) fn validate_cli(cli: &Cli) -> Result<()> {
        if !cli.model.is_file() {
            anyhow::bail!("Model file not found: {}", cli.model.display());
        }
        if cli.inputs.is_empty() {
            anyhow::bail!("At least one input is required");
        }
        Ok(())
    }
}
