//! Frame acquisition
//!
//! The driving loop only needs "give me the next color frame". A camera
//! driver would implement [`FrameSource`]; the bundled source replays image
//! files so the tool can run against recorded frames or a static snapshot.

use crate::error::OcrError;
use image::RgbImage;
use std::path::{Path, PathBuf};

/// Source of color frames, one per tick
pub trait FrameSource: Send {
    /// Next frame, or `None` when the source is exhausted
    fn next_frame(&mut self) -> Result<Option<RgbImage>, OcrError>;
}

/// File extensions treated as frames when reading a directory
const FRAME_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "bmp", "tif", "tiff"];

/// Frames read from disk
pub enum ImageSource {
    /// A single image returned on every tick
    Still(RgbImage),
    /// Directory listing consumed in name order
    Sequence { frames: Vec<PathBuf>, next: usize },
}

impl ImageSource {
    /// Open a single image file or a directory of frames
    pub fn open(path: &Path) -> Result<Self, OcrError> {
        if path.is_dir() {
            let mut frames: Vec<PathBuf> = std::fs::read_dir(path)
                .map_err(|e| {
                    OcrError::AcquisitionError(format!("Failed to read {}: {}", path.display(), e))
                })?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| is_frame_file(p))
                .collect();
            frames.sort();

            if frames.is_empty() {
                return Err(OcrError::AcquisitionError(format!(
                    "No image files in {}",
                    path.display()
                )));
            }
            tracing::info!("Replaying {} frames from {}", frames.len(), path.display());
            return Ok(Self::Sequence { frames, next: 0 });
        }

        let frame = load_frame(path)?;
        tracing::info!(
            "Using still image {} ({}x{})",
            path.display(),
            frame.width(),
            frame.height()
        );
        Ok(Self::Still(frame))
    }
}

impl FrameSource for ImageSource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>, OcrError> {
        match self {
            Self::Still(frame) => Ok(Some(frame.clone())),
            Self::Sequence { frames, next } => {
                let Some(path) = frames.get(*next) else {
                    return Ok(None);
                };
                *next += 1;
                load_frame(path).map(Some)
            }
        }
    }
}

fn is_frame_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| FRAME_EXTENSIONS.contains(&ext.as_str()))
}

fn load_frame(path: &Path) -> Result<RgbImage, OcrError> {
    image::open(path)
        .map(|img| img.to_rgb8())
        .map_err(|e| OcrError::AcquisitionError(format!("Failed to load {}: {}", path.display(), e)))
}
