//! Leptess/Tesseract engine implementation
//!
//! Tesseract linked in through tesseract-static (no system dependencies).
//! Downloads tessdata (training data) automatically on first use.
//!
//! Dictionary files are loaded at init time in the linked API, so instead of
//! `load_*_dawg` the dictionary penalties are neutralized per call.

use crate::config::Config;
use crate::engine::{RecognitionConfig, Recognizer};
use crate::error::OcrError;
use image::GrayImage;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tesseract_static::tesseract::Tesseract;

/// Runtime variables that stop the language model from favouring dictionary words
const NO_DICTIONARY_VARIABLES: [(&str, &str); 3] = [
    ("tessedit_enable_doc_dict", "0"),
    ("language_model_penalty_non_dict_word", "0"),
    ("language_model_penalty_non_freq_dict_word", "0"),
];

/// Tesseract OCR Engine
pub struct LeptessEngine {
    /// Path to tessdata directory
    tessdata_path: String,
    /// Recognition language
    language: String,
}

impl LeptessEngine {
    /// Create a new Tesseract-based OCR engine
    pub fn new(config: &Config) -> Result<Self, OcrError> {
        let language = config.language.clone();

        let tessdata_path = match &config.tessdata_path {
            Some(path) => path.clone(),
            None => ensure_tessdata_available(&language)?,
        };

        // Validate that tessdata is accessible by doing a test initialization
        let test_tess = Tesseract::new(Some(&tessdata_path), Some(&language)).map_err(|e| {
            OcrError::InitializationError(format!("Failed to initialize Tesseract: {}", e))
        })?;
        drop(test_tess);

        tracing::info!(
            "Leptess engine initialized (tessdata: {}, language: {})",
            tessdata_path,
            language
        );

        Ok(Self {
            tessdata_path,
            language,
        })
    }
}

impl Recognizer for LeptessEngine {
    fn name(&self) -> &'static str {
        "leptess"
    }

    fn description(&self) -> &'static str {
        "Statically linked Tesseract, no external program needed"
    }

    fn recognize(&self, image: &GrayImage, config: &RecognitionConfig) -> Result<String, OcrError> {
        let (width, height) = image.dimensions();

        // Convert to BMP in memory (BMP is always supported by leptonica)
        let rgb_img = image::DynamicImage::ImageLuma8(image.clone()).to_rgb8();
        let mut bmp_data = Vec::new();
        rgb_img
            .write_to(&mut std::io::Cursor::new(&mut bmp_data), image::ImageFormat::Bmp)
            .map_err(|e| OcrError::RecognitionError(format!("Failed to convert to BMP: {}", e)))?;

        // A fresh instance per call: Tesseract handles are not reentrant
        let mut tess = Tesseract::new(Some(&self.tessdata_path), Some(&self.language))
            .map_err(|e| OcrError::RecognitionError(format!("Failed to create Tesseract: {}", e)))?;

        let mut variables = vec![
            ("tessedit_pageseg_mode", config.psm.to_string()),
            ("tessedit_char_whitelist", config.whitelist.to_string()),
        ];
        if !config.use_dictionaries {
            variables.extend(
                NO_DICTIONARY_VARIABLES
                    .iter()
                    .map(|(name, value)| (*name, value.to_string())),
            );
        }
        for (name, value) in &variables {
            tess = tess.set_variable(name, value).map_err(|e| {
                OcrError::RecognitionError(format!("Failed to set {}={}: {}", name, value, e))
            })?;
        }

        tess = tess.set_image_from_mem(&bmp_data).map_err(|e| {
            OcrError::RecognitionError(format!(
                "Failed to set image ({}x{}, {} bytes): {}",
                width,
                height,
                bmp_data.len(),
                e
            ))
        })?;

        tess = tess
            .recognize()
            .map_err(|e| OcrError::RecognitionError(format!("Failed to recognize text: {}", e)))?;

        let text = tess
            .get_text()
            .map_err(|e| OcrError::RecognitionError(format!("Failed to get text: {}", e)))?;

        Ok(text.trim().to_string())
    }
}

// ============================================================================
// Tessdata download helpers
// ============================================================================

/// Ensure tessdata is available, downloading if needed
fn ensure_tessdata_available(language: &str) -> Result<String, OcrError> {
    let cache_dir = dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("roi-ocr-reader")
        .join("tessdata");

    std::fs::create_dir_all(&cache_dir).map_err(|e| {
        OcrError::InitializationError(format!("Failed to create tessdata directory: {}", e))
    })?;

    let traineddata_path = cache_dir.join(format!("{}.traineddata", language));

    if !traineddata_path.exists() {
        let url = tessdata_url(language);
        tracing::info!(
            "Downloading tessdata for '{}' (this may take a moment)...",
            language
        );
        download_file(&url, &traineddata_path)?;
        tracing::info!("Downloaded tessdata to {:?}", traineddata_path);
    } else {
        tracing::info!("Using cached tessdata from {:?}", cache_dir);
    }

    // Tesseract expects the directory, not the file
    cache_dir
        .to_str()
        .map(|s| s.to_string())
        .ok_or_else(|| OcrError::InitializationError("Invalid tessdata path".to_string()))
}

/// Get tessdata download URL for a language
fn tessdata_url(language: &str) -> String {
    // tessdata_fast: LSTM-only models, matching --oem 1
    format!(
        "https://github.com/tesseract-ocr/tessdata_fast/raw/main/{}.traineddata",
        language
    )
}

/// Download a file from URL to path using ureq
fn download_file(url: &str, path: &Path) -> Result<(), OcrError> {
    let response = ureq::get(url)
        .call()
        .map_err(|e| OcrError::InitializationError(format!("Failed to download tessdata: {}", e)))?;

    let buffer = response.into_body().read_to_vec().map_err(|e| {
        OcrError::InitializationError(format!("Failed to read tessdata response: {}", e))
    })?;

    let mut file = File::create(path).map_err(|e| {
        OcrError::InitializationError(format!("Failed to create tessdata file: {}", e))
    })?;

    file.write_all(&buffer).map_err(|e| {
        OcrError::InitializationError(format!("Failed to write tessdata file: {}", e))
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tessdata_url_uses_fast_models() {
        let url = tessdata_url("eng");
        assert!(url.contains("tessdata_fast"));
        assert!(url.ends_with("/eng.traineddata"));
    }
}
