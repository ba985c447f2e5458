use image::{imageops, GrayImage, RgbImage};

/// Convert the color ROI crop to a single luma channel
/// This is the foundation for every other preprocessing step
pub fn apply(image: &RgbImage) -> GrayImage {
    imageops::grayscale(image)
}
