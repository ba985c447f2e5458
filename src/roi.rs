use crate::error::OcrError;
use image::{imageops, GrayImage, RgbImage};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Operator-selected rectangle in frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Roi {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Roi {
    /// Width and height must be positive
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Result<Self, OcrError> {
        if width == 0 || height == 0 {
            return Err(OcrError::InvalidRoi(format!(
                "{}x{} has no area",
                width, height
            )));
        }
        Ok(Self {
            x,
            y,
            width,
            height,
        })
    }

    /// Crop the part of the frame covered by the ROI.
    ///
    /// The ROI is clipped to the frame, so an ROI lying outside the frame
    /// yields an empty image.
    pub fn crop(&self, frame: &RgbImage) -> RgbImage {
        let (frame_width, frame_height) = frame.dimensions();
        let x = self.x.min(frame_width);
        let y = self.y.min(frame_height);
        let width = self.width.min(frame_width - x);
        let height = self.height.min(frame_height - y);
        imageops::crop_imm(frame, x, y, width, height).to_image()
    }
}

impl fmt::Display for Roi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.x, self.y, self.width, self.height)
    }
}

impl FromStr for Roi {
    type Err = OcrError;

    /// Parse `x,y,width,height`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<u32> = s
            .split(',')
            .map(|part| part.trim().parse::<u32>())
            .collect::<Result<_, _>>()
            .map_err(|e| OcrError::InvalidRoi(format!("'{}': {}", s, e)))?;

        match parts.as_slice() {
            [x, y, width, height] => Roi::new(*x, *y, *width, *height),
            _ => Err(OcrError::InvalidRoi(format!(
                "'{}': expected x,y,width,height",
                s
            ))),
        }
    }
}

/// Transient per-cycle state of the ROI, overwritten every cycle
#[derive(Debug, Clone, Default)]
pub struct RoiState {
    /// Last extracted number
    pub last_text: Option<String>,
    /// Last raw recognizer output
    pub raw_text: Option<String>,
    pub cropped: Option<RgbImage>,
    pub binary: Option<GrayImage>,
}

impl RoiState {
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
