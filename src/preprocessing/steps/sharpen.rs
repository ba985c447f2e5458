use image::GrayImage;
use imageproc::filter::filter3x3;

/// Apply unsharp-style sharpening
/// Restores the stroke contrast lost to denoising and blurring
pub fn apply(image: &GrayImage) -> GrayImage {
    // Center weight 9, all eight neighbors -1
    let kernel: [f32; 9] = [-1.0, -1.0, -1.0, -1.0, 9.0, -1.0, -1.0, -1.0, -1.0];

    filter3x3(image, &kernel)
}
