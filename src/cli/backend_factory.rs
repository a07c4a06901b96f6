//! Backend factory for the CLI: maps `--backend` to a session loader

use crate::cli::main_impl::CliBackend;
use crate::{config::PipelineConfig, session::SessionLoader};
use anyhow::Result;
use std::path::Path;

/// Builds the session loader for the selected backend
#[derive(Debug)]
pub(crate) struct CliBackendFactory;

impl CliBackendFactory {
    /// Loader for `backend` reading the model at `model_path`
    ///
    /// Fails if the backend was not compiled into this binary.
    #[allow(unused_variables)]
    pub(crate) fn loader(
        backend: CliBackend,
        model_path: &Path,
        config: &PipelineConfig,
    ) -> Result<Box<dyn SessionLoader>> {
        match backend {
            CliBackend::Onnx => {
                #[cfg(feature = "onnx")]
                {
                    Ok(Box::new(crate::backends::OnnxSessionLoader::new(
                        model_path,
                        config.clone(),
                    )))
                }
                #[cfg(not(feature = "onnx"))]
                {
                    anyhow::bail!("ONNX backend not compiled in (enable the 'onnx' feature)")
                }
            },
            CliBackend::Tract => {
                #[cfg(feature = "tract")]
                {
                    Ok(Box::new(crate::backends::TractSessionLoader::new(model_path)))
                }
                #[cfg(not(feature = "tract"))]
                {
                    anyhow::bail!("Tract backend not compiled in (enable the 'tract' feature)")
                }
            },
        }
    }

    /// Backends compiled into this binary
    pub(crate) fn available_backends() -> Vec<CliBackend> {
        let mut backends = Vec::new();
        if cfg!(feature = "onnx") {
            backends.push(CliBackend::Onnx);
        }
        if cfg!(feature = "tract") {
            backends.push(CliBackend::Tract);
        }
        backends
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "tract")]
    #[test]
    fn test_tract_loader_describes_model() {
        let loader = CliBackendFactory::loader(
            CliBackend::Tract,
            Path::new("models/u2netp.onnx"),
            &PipelineConfig::default(),
        )
        .unwrap();
        assert_eq!(loader.describe(), "tract:models/u2netp.onnx");
    }

    #[cfg(feature = "onnx")]
    #[test]
    fn test_onnx_loader_describes_model() {
        let loader = CliBackendFactory::loader(
            CliBackend::Onnx,
            Path::new("models/u2netp.onnx"),
            &PipelineConfig::default(),
        )
        .unwrap();
        assert_eq!(loader.describe(), "onnx:models/u2netp.onnx");
    }

    #[test]
    fn test_available_backends_match_features() {
        let backends = CliBackendFactory::available_backends();
        assert_eq!(backends.contains(&CliBackend::Onnx), cfg!(feature = "onnx"));
        assert_eq!(backends.contains(&CliBackend::Tract), cfg!(feature = "tract"));
    }
}
