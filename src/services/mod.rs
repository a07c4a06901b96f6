//! Services surrounding the pixel pipeline
//!
//! - `compositor`: applies the final alpha and encodes the PNG
//! - `io`: file loading, output naming and writing
//! - `progress`: stage reporting for frontends

pub mod compositor;
pub mod io;
pub mod progress;

pub use compositor::Compositor;
pub use io::ImageIOService;
pub use progress::{
    ConsoleProgressReporter, NoOpProgressReporter, ProcessingStage, ProgressReporter,
    ProgressTracker, ProgressUpdate,
};
