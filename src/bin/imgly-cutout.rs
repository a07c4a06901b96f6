//! IMG.LY Cutout CLI Tool
//!
//! Command-line interface for turning photos into transparent-background PNGs
//! with the imgly-cutout library, using ONNX Runtime or Tract backends.

#[cfg(feature = "cli")]
use imgly_cutout::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    panic!("CLI feature not enabled. Please rebuild with --features cli");
}
