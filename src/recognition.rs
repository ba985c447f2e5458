//! Multi-configuration OCR voting
//!
//! Tesseract output for a short numeric display varies a lot with the page
//! segmentation mode and with text polarity. The voter normalizes polarity,
//! runs the recognizer once per candidate mode and keeps the longest answer.

use crate::engine::{PageSegMode, RecognitionConfig, Recognizer};
use image::{imageops, GrayImage};
use regex::Regex;
use serde::Serialize;
use std::sync::{Arc, OnceLock};

/// Images darker than this on average are inverted before recognition
const POLARITY_MEAN_THRESHOLD: f64 = 127.0;

/// Outcome of one voting round
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Recognition {
    /// First number found in the winning text, with a `.` decimal separator
    pub number: Option<String>,
    /// Winning raw recognizer output, trimmed
    pub raw: Option<String>,
}

/// Runs a recognizer under several page segmentation modes and picks a winner
pub struct Voter {
    recognizer: Arc<dyn Recognizer>,
}

impl Voter {
    pub fn new(recognizer: Arc<dyn Recognizer>) -> Self {
        Self { recognizer }
    }

    pub fn recognizer_name(&self) -> &'static str {
        self.recognizer.name()
    }

    /// Recognize a binary image, trying `preferred` first.
    ///
    /// Individual recognizer failures are logged and skipped; if every
    /// attempt fails the result is empty rather than an error.
    pub fn vote(&self, image: Option<&GrayImage>, preferred: PageSegMode) -> Recognition {
        let Some(image) = image else {
            return Recognition::default();
        };

        let normalized = normalize_polarity(image);
        let image = normalized.as_ref().unwrap_or(image);

        // `None` until some attempt succeeds, so an empty winning text is
        // distinguishable from nothing having worked at all
        let mut best: Option<String> = None;

        for psm in candidate_modes(preferred) {
            let config = RecognitionConfig::numeric(psm);
            match self.recognizer.recognize(image, &config) {
                Ok(text) => {
                    let text = text.trim().to_string();
                    tracing::trace!("psm {} -> {:?}", psm, text);
                    let longer = best
                        .as_ref()
                        .map_or(true, |current| text.chars().count() > current.chars().count());
                    if longer {
                        best = Some(text);
                    }
                }
                Err(e) => {
                    tracing::warn!("{} failed with psm {}: {}", self.recognizer.name(), psm, e);
                }
            }
        }

        Recognition {
            number: best.as_deref().and_then(extract_number),
            raw: best,
        }
    }
}

/// Preferred mode first, then the fixed fallbacks, without repeats
pub fn candidate_modes(preferred: PageSegMode) -> Vec<PageSegMode> {
    let mut modes = vec![preferred];
    for mode in PageSegMode::FALLBACKS {
        if !modes.contains(&mode) {
            modes.push(mode);
        }
    }
    modes
}

/// Invert light-on-dark images, Tesseract reads dark text on light best.
/// Returns `None` when the image can be used as is.
fn normalize_polarity(image: &GrayImage) -> Option<GrayImage> {
    let pixels = image.as_raw();
    if pixels.is_empty() {
        return None;
    }

    let mean = pixels.iter().map(|&p| p as f64).sum::<f64>() / pixels.len() as f64;
    if mean >= POLARITY_MEAN_THRESHOLD {
        return None;
    }

    let mut inverted = image.clone();
    imageops::invert(&mut inverted);
    Some(inverted)
}

/// Extract the first number from recognizer output.
///
/// Accepts an optional leading minus, digits, and an optional `.` or `,`
/// decimal part; a comma separator is normalized to a dot.
pub fn extract_number(text: &str) -> Option<String> {
    static NUMBER: OnceLock<Regex> = OnceLock::new();
    let pattern = NUMBER.get_or_init(|| Regex::new(r"-?\d+(?:[.,]\d+)?").expect("valid regex"));

    pattern
        .find(text)
        .map(|m| m.as_str().replace(',', "."))
}
