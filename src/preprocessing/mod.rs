//! Image enhancement pipeline for OCR
//!
//! Turns a color ROI crop into a binary image that Tesseract reads reliably.

pub mod pipeline;
pub mod steps;

pub use pipeline::{Pipeline, PipelineConfig};
pub use steps::threshold::ThresholdMode;
