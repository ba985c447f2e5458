//! Individual preprocessing steps, in pipeline order

pub mod grayscale;
pub mod resize;
pub mod denoise;
pub mod blur;
pub mod sharpen;
pub mod equalize;
pub mod gradient;
pub mod blend;
pub mod threshold;
pub mod dilate;
