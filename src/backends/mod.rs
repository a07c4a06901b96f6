//! Concrete inference session implementations
//!
//! - ONNX Runtime session (native runtime, GPU execution providers)
//! - Tract session (pure Rust, CPU only)
//! - Mock session (synthetic masks, no model file)

pub mod mock;

#[cfg(feature = "onnx")]
pub mod onnx;

#[cfg(feature = "tract")]
pub mod tract;

pub use self::mock::{MockFailure, MockMask, MockSession, MockSessionBuilder};

#[cfg(feature = "onnx")]
pub use self::onnx::{OnnxSession, OnnxSessionLoader};

#[cfg(feature = "tract")]
pub use self::tract::{TractSession, TractSessionLoader};
