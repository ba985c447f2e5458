use image::{GrayImage, Luma};

/// Weight of the sharpened intensity image
pub const INTENSITY_WEIGHT: f32 = 0.8;
/// Weight of the normalized gradient image
pub const GRADIENT_WEIGHT: f32 = 0.2;

/// Blend the sharpened image with its gradient magnitude
/// Emphasizes stroke edges while keeping most of the intensity information
pub fn apply(sharpened: &GrayImage, gradient: &GrayImage) -> GrayImage {
    GrayImage::from_fn(sharpened.width(), sharpened.height(), |x, y| {
        let intensity = sharpened.get_pixel(x, y).0[0] as f32;
        let edge = gradient.get_pixel(x, y).0[0] as f32;
        let value = INTENSITY_WEIGHT * intensity + GRADIENT_WEIGHT * edge;
        Luma([value.round().clamp(0.0, 255.0) as u8])
    })
}
