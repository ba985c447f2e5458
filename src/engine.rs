use crate::error::OcrError;
use image::GrayImage;
use serde::Serialize;
use std::fmt;

/// Characters the recognizer is allowed to emit for a numeric reading
pub const NUMERIC_WHITELIST: &str = "0123456789.-,";

/// Tesseract page segmentation mode (`--psm`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PageSegMode(pub u8);

impl PageSegMode {
    /// Assume a uniform block of text
    pub const SINGLE_BLOCK: Self = Self(6);
    /// Treat the image as a single text line
    pub const SINGLE_LINE: Self = Self(7);
    /// Treat the image as a single word
    pub const SINGLE_WORD: Self = Self(8);
    /// Single text line, bypassing Tesseract-specific hacks
    pub const RAW_LINE: Self = Self(13);

    /// Modes the operator can cycle through, in order
    pub const CYCLE: [Self; 4] = [
        Self::SINGLE_LINE,
        Self::SINGLE_WORD,
        Self::RAW_LINE,
        Self::SINGLE_BLOCK,
    ];

    /// Modes tried after the preferred one
    pub const FALLBACKS: [Self; 3] = [Self::SINGLE_LINE, Self::SINGLE_WORD, Self::RAW_LINE];

    /// Next mode in the operator cycle. Unknown modes restart the cycle.
    pub fn next(self) -> Self {
        let index = Self::CYCLE.iter().position(|m| *m == self).unwrap_or(0);
        Self::CYCLE[(index + 1) % Self::CYCLE.len()]
    }
}

impl Default for PageSegMode {
    fn default() -> Self {
        Self::SINGLE_LINE
    }
}

impl fmt::Display for PageSegMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Settings for a single recognizer invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionConfig {
    pub psm: PageSegMode,
    pub whitelist: &'static str,
    pub use_dictionaries: bool,
    /// OCR engine mode (1 = LSTM only)
    pub oem: u8,
}

impl RecognitionConfig {
    /// Numeric-only configuration for the given page segmentation mode
    pub fn numeric(psm: PageSegMode) -> Self {
        Self {
            psm,
            whitelist: NUMERIC_WHITELIST,
            use_dictionaries: false,
            oem: 1,
        }
    }
}

/// Trait that all OCR engines must implement
pub trait Recognizer: Send + Sync {
    /// Returns the engine identifier (e.g., "tesseract", "leptess")
    fn name(&self) -> &'static str;

    /// Returns a human-readable description of the engine
    fn description(&self) -> &'static str;

    /// Recognize the text in a single-channel image
    fn recognize(&self, image: &GrayImage, config: &RecognitionConfig) -> Result<String, OcrError>;
}
