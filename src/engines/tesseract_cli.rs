//! Tesseract command-line engine
//!
//! Runs the `tesseract` executable once per recognition. Slower than the
//! linked engine, but init-only options such as dictionary loading can be
//! switched off per call, and a hung process can be killed.

use crate::config::Config;
use crate::engine::{RecognitionConfig, Recognizer};
use crate::error::OcrError;
use image::{GrayImage, ImageFormat};
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// How often a running tesseract process is polled for completion
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Tesseract OCR through its command-line interface
pub struct TesseractCli {
    executable: String,
    tessdata_path: Option<String>,
    language: String,
    timeout: Duration,
}

impl TesseractCli {
    /// Create the engine, checking that the executable can be started
    pub fn new(config: &Config) -> Result<Self, OcrError> {
        let output = Command::new(&config.tesseract_bin)
            .arg("--version")
            .output()
            .map_err(|e| {
                OcrError::InitializationError(format!(
                    "Failed to run '{}': {}",
                    config.tesseract_bin, e
                ))
            })?;

        if !output.status.success() {
            return Err(OcrError::InitializationError(format!(
                "'{} --version' exited with {}",
                config.tesseract_bin, output.status
            )));
        }

        // Older releases print the version banner on stderr
        let banner = if output.stdout.is_empty() {
            String::from_utf8_lossy(&output.stderr).to_string()
        } else {
            String::from_utf8_lossy(&output.stdout).to_string()
        };
        tracing::info!(
            "Tesseract CLI engine initialized ({}, language: {})",
            banner.lines().next().unwrap_or("unknown version").trim(),
            config.language
        );

        Ok(Self {
            executable: config.tesseract_bin.clone(),
            tessdata_path: config.tessdata_path.clone(),
            language: config.language.clone(),
            timeout: config.recognition_timeout,
        })
    }

    /// Command-line arguments for one recognition of `input`
    fn arguments(&self, input: &Path, config: &RecognitionConfig) -> Vec<String> {
        let mut args = vec![
            input.to_string_lossy().to_string(),
            "stdout".to_string(),
            "-l".to_string(),
            self.language.clone(),
            "--oem".to_string(),
            config.oem.to_string(),
            "--psm".to_string(),
            config.psm.to_string(),
            "-c".to_string(),
            format!("tessedit_char_whitelist={}", config.whitelist),
        ];

        if !config.use_dictionaries {
            for variable in ["load_system_dawg=0", "load_freq_dawg=0"] {
                args.push("-c".to_string());
                args.push(variable.to_string());
            }
        }

        if let Some(tessdata) = &self.tessdata_path {
            args.push("--tessdata-dir".to_string());
            args.push(tessdata.clone());
        }

        args
    }
}

impl Recognizer for TesseractCli {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    fn description(&self) -> &'static str {
        "Tesseract command-line program, killed on timeout"
    }

    fn recognize(&self, image: &GrayImage, config: &RecognitionConfig) -> Result<String, OcrError> {
        let input = tempfile::Builder::new()
            .suffix(".png")
            .tempfile()
            .map_err(|e| OcrError::Internal(format!("Failed to create temp file: {}", e)))?;

        image
            .save_with_format(input.path(), ImageFormat::Png)
            .map_err(|e| OcrError::RecognitionError(format!("Failed to write image: {}", e)))?;

        let mut child = Command::new(&self.executable)
            .args(self.arguments(input.path(), config))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| OcrError::RecognitionError(format!("Failed to start tesseract: {}", e)))?;

        // Pipes are drained concurrently so a chatty child never blocks on a full buffer
        let stdout = child.stdout.take().map(drain_pipe);
        let stderr = child.stderr.take().map(drain_pipe);

        let start = Instant::now();
        let status = loop {
            let finished = child
                .try_wait()
                .map_err(|e| OcrError::RecognitionError(format!("Failed to wait: {}", e)))?;
            if let Some(status) = finished {
                break status;
            }
            if start.elapsed() >= self.timeout {
                let _ = child.kill();
                let _ = child.wait();
                return Err(OcrError::RecognitionTimeout(self.timeout.as_millis() as u64));
            }
            std::thread::sleep(POLL_INTERVAL);
        };

        let stdout = collect_pipe(stdout)?;
        let stderr = collect_pipe(stderr)?;

        if !status.success() {
            return Err(OcrError::RecognitionError(format!(
                "tesseract exited with {}: {}",
                status,
                String::from_utf8_lossy(&stderr).trim()
            )));
        }

        let text = String::from_utf8_lossy(&stdout).trim().to_string();
        tracing::debug!(
            "tesseract psm {} on {}x{} -> {:?} in {}ms",
            config.psm,
            image.width(),
            image.height(),
            text,
            start.elapsed().as_millis()
        );
        Ok(text)
    }
}

/// Read a child pipe to the end on its own thread
fn drain_pipe<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<std::io::Result<Vec<u8>>> {
    std::thread::spawn(move || {
        let mut buffer = Vec::new();
        pipe.read_to_end(&mut buffer)?;
        Ok(buffer)
    })
}

fn collect_pipe(reader: Option<JoinHandle<std::io::Result<Vec<u8>>>>) -> Result<Vec<u8>, OcrError> {
    let Some(reader) = reader else {
        return Ok(Vec::new());
    };
    reader
        .join()
        .map_err(|_| OcrError::Internal("Output reader thread panicked".to_string()))?
        .map_err(|e| OcrError::RecognitionError(format!("Failed to read output: {}", e)))
}
