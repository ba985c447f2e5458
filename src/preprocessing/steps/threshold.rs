use image::{GrayImage, Luma};
use imageproc::contrast::{otsu_level, threshold, ThresholdType};
use imageproc::filter::separable_filter_equal;
use serde::Serialize;
use std::fmt;

/// Neighbourhood size for adaptive thresholding
const ADAPTIVE_BLOCK_SIZE: usize = 21;
/// Subtracted from the neighbourhood mean before comparing
const ADAPTIVE_OFFSET: i16 = 10;

/// Binarization strategy, selected by the operator with keys 1-5
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ThresholdMode {
    /// Global Otsu threshold
    #[default]
    Otsu,
    /// Global Otsu threshold, inverted output
    OtsuInverted,
    /// Gaussian-weighted local mean threshold
    AdaptiveGaussian,
    /// Gaussian-weighted local mean threshold, inverted output
    AdaptiveGaussianInverted,
    /// Fixed threshold at the configured level.
    ///
    /// There is no automatic fallback when the level does not suit the scene;
    /// the operator tunes it with `[` and `]`.
    Manual,
}

impl ThresholdMode {
    /// Map the operator's mode number (1-5)
    pub fn from_number(number: u8) -> Option<Self> {
        match number {
            1 => Some(Self::Otsu),
            2 => Some(Self::OtsuInverted),
            3 => Some(Self::AdaptiveGaussian),
            4 => Some(Self::AdaptiveGaussianInverted),
            5 => Some(Self::Manual),
            _ => None,
        }
    }

    pub fn number(&self) -> u8 {
        match self {
            Self::Otsu => 1,
            Self::OtsuInverted => 2,
            Self::AdaptiveGaussian => 3,
            Self::AdaptiveGaussianInverted => 4,
            Self::Manual => 5,
        }
    }
}

impl fmt::Display for ThresholdMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// Binarize the enhanced image. Output pixels are exactly 0 or 255
pub fn apply(image: &GrayImage, mode: ThresholdMode, simple_threshold: u8) -> GrayImage {
    match mode {
        ThresholdMode::Otsu => threshold(image, otsu_level(image), ThresholdType::Binary),
        ThresholdMode::OtsuInverted => {
            threshold(image, otsu_level(image), ThresholdType::BinaryInverted)
        }
        ThresholdMode::AdaptiveGaussian => adaptive_gaussian(image, false),
        ThresholdMode::AdaptiveGaussianInverted => adaptive_gaussian(image, true),
        ThresholdMode::Manual => threshold(image, simple_threshold, ThresholdType::Binary),
    }
}

/// Compare each pixel against its Gaussian-weighted neighbourhood mean minus an offset
fn adaptive_gaussian(image: &GrayImage, inverted: bool) -> GrayImage {
    let kernel = gaussian_kernel(ADAPTIVE_BLOCK_SIZE);
    let mean: GrayImage = separable_filter_equal(image, &kernel);

    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let pixel = image.get_pixel(x, y).0[0] as i16;
        let local = mean.get_pixel(x, y).0[0] as i16;
        let foreground = pixel > local - ADAPTIVE_OFFSET;
        if foreground != inverted {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    })
}

/// Normalized 1D Gaussian kernel; sigma follows the usual
/// `0.3 * ((size - 1) * 0.5 - 1) + 0.8` rule for a given size
fn gaussian_kernel(size: usize) -> Vec<f32> {
    let sigma = 0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let center = (size / 2) as f32;
    let weights: Vec<f32> = (0..size)
        .map(|i| {
            let d = i as f32 - center;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let total: f32 = weights.iter().sum();
    weights.into_iter().map(|w| w / total).collect()
}
