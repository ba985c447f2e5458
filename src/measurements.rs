//! Append-only measurement log.
//!
//! One `Timestamp,Value` row per saved reading. The file is reopened in
//! append mode for every row, so readings written before a crash survive.

use crate::error::OcrError;
use chrono::{DateTime, Local};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// CSV header row
const HEADER: &str = "Timestamp,Value";
/// Local time, second resolution
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// CSV log of saved readings
#[derive(Debug, Clone)]
pub struct MeasurementLog {
    path: PathBuf,
}

impl MeasurementLog {
    /// Open the log, creating it with a header row if it is missing or empty.
    ///
    /// Existing content is left untouched.
    pub fn open(path: &Path) -> Result<Self, OcrError> {
        let has_content = match File::open(path) {
            Ok(file) => BufReader::new(file).lines().next().is_some(),
            Err(_) => false,
        };

        if !has_content {
            tracing::info!("Creating new measurement log: {}", path.display());
            let mut file = File::create(path).map_err(|e| {
                OcrError::MeasurementLogError(format!("Failed to create {}: {}", path.display(), e))
            })?;
            writeln!(file, "{}", HEADER).map_err(|e| {
                OcrError::MeasurementLogError(format!("Failed to write header: {}", e))
            })?;
        }

        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a cleaned numeric reading. Returns the value that was written.
    pub fn append(&self, reading: &str, at: DateTime<Local>) -> Result<f64, OcrError> {
        let value: f64 = reading.parse().map_err(|e| {
            OcrError::MeasurementLogError(format!("'{}' is not a number: {}", reading, e))
        })?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                OcrError::MeasurementLogError(format!(
                    "Could not open {} (is it open in another program?): {}",
                    self.path.display(),
                    e
                ))
            })?;

        let timestamp = at.format(TIMESTAMP_FORMAT);
        writeln!(file, "{},{}", timestamp, value)
            .map_err(|e| OcrError::MeasurementLogError(format!("Failed to write row: {}", e)))?;

        tracing::info!("Saved: {}, {}", timestamp, value);
        Ok(value)
    }
}
