use image::{GrayImage, RgbImage};
use serde::Serialize;
use std::time::Instant;

use super::steps;
use super::steps::threshold::ThresholdMode;

/// Smallest supported upscale factor
pub const MIN_SCALE: f32 = 1.0;
/// Largest supported upscale factor
pub const MAX_SCALE: f32 = 8.0;

/// Snapshot of the enhancement parameters for one frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PipelineConfig {
    pub mode: ThresholdMode,
    pub scale: f32,
    /// Only used by [`ThresholdMode::Manual`]
    pub simple_threshold: u8,
    pub equalize: bool,
    pub dilate: bool,
}

impl PipelineConfig {
    pub fn new(mode: ThresholdMode, scale: f32, simple_threshold: u8) -> Self {
        Self {
            mode,
            scale: clamp_scale(scale),
            simple_threshold,
            ..Self::default()
        }
    }

    pub fn with_equalize(mut self, equalize: bool) -> Self {
        self.equalize = equalize;
        self
    }

    pub fn with_dilate(mut self, dilate: bool) -> Self {
        self.dilate = dilate;
        self
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: ThresholdMode::Otsu,
            scale: 2.5,
            simple_threshold: 100,
            equalize: true,
            dilate: false,
        }
    }
}

/// Clamp a scale factor to the supported range
pub fn clamp_scale(scale: f32) -> f32 {
    if scale.is_nan() {
        return MIN_SCALE;
    }
    scale.clamp(MIN_SCALE, MAX_SCALE)
}

/// Timing information for a single preprocessing step
#[derive(Debug, Clone, Serialize)]
pub struct StepTiming {
    pub name: String,
    pub time_ms: u64,
}

/// Result of preprocessing including timing stats
#[derive(Debug, Clone, Serialize)]
pub struct PreprocessingResult {
    /// Binary image, 0 or 255 only (not serialized)
    #[serde(skip)]
    pub image: GrayImage,
    /// Total preprocessing time in milliseconds
    pub total_time_ms: u64,
    /// Individual step timings
    pub steps: Vec<StepTiming>,
}

/// Enhancement pipeline turning a color ROI crop into a binary image for OCR
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Process a crop. Returns `None` when the crop has no pixels.
    pub fn process(&self, roi: &RgbImage) -> Option<PreprocessingResult> {
        if roi.width() == 0 || roi.height() == 0 {
            return None;
        }

        let start = Instant::now();
        let mut timings = Vec::new();
        let config = &self.config;

        let gray = run_step("grayscale", &mut timings, || steps::grayscale::apply(roi));
        let scaled = run_step("resize", &mut timings, || {
            steps::resize::apply(&gray, config.scale)
        });
        let denoised = run_step("denoise", &mut timings, || steps::denoise::apply(&scaled));
        let blurred = run_step("blur", &mut timings, || steps::blur::apply(&denoised));
        let mut sharpened = run_step("sharpen", &mut timings, || steps::sharpen::apply(&blurred));

        if config.equalize {
            sharpened = run_step("equalize", &mut timings, || {
                steps::equalize::apply(&sharpened)
            });
        }

        let gradient = run_step("gradient", &mut timings, || {
            steps::gradient::apply(&sharpened)
        });
        let enhanced = run_step("blend", &mut timings, || {
            steps::blend::apply(&sharpened, &gradient)
        });
        let mut binary = run_step("threshold", &mut timings, || {
            steps::threshold::apply(&enhanced, config.mode, config.simple_threshold)
        });

        if config.dilate {
            binary = run_step("dilate", &mut timings, || steps::dilate::apply(&binary));
        }

        let total_time_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(
            "Preprocessed {}x{} crop to {}x{} in {}ms",
            roi.width(),
            roi.height(),
            binary.width(),
            binary.height(),
            total_time_ms
        );

        Some(PreprocessingResult {
            image: binary,
            total_time_ms,
            steps: timings,
        })
    }
}

fn run_step<F>(name: &str, timings: &mut Vec<StepTiming>, step_fn: F) -> GrayImage
where
    F: FnOnce() -> GrayImage,
{
    let step_start = Instant::now();
    let result = step_fn();
    timings.push(StepTiming {
        name: name.to_string(),
        time_ms: step_start.elapsed().as_millis() as u64,
    });
    result
}
