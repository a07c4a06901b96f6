//! Validation of inputs entering the pipeline

pub mod upload;

pub use upload::{UploadInfo, UploadValidator};
