use image::{imageops::FilterType, imageops, GrayImage};

/// Size of the image after scaling, rounded to the nearest pixel
pub fn scaled_dimensions(width: u32, height: u32, scale: f32) -> (u32, u32) {
    let scale = scale as f64;
    let new_width = (width as f64 * scale).round().max(1.0) as u32;
    let new_height = (height as f64 * scale).round().max(1.0) as u32;
    (new_width, new_height)
}

/// Upscale with cubic interpolation
/// Small glyphs survive denoising much better once they are enlarged
pub fn apply(image: &GrayImage, scale: f32) -> GrayImage {
    let (width, height) = image.dimensions();
    let (new_width, new_height) = scaled_dimensions(width, height, scale);

    if (new_width, new_height) == (width, height) {
        return image.clone();
    }

    imageops::resize(image, new_width, new_height, FilterType::CatmullRom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_resize_rounds_to_nearest_pixel() {
        assert_eq!(scaled_dimensions(3, 5, 2.5), (8, 13));
        assert_eq!(scaled_dimensions(10, 4, 1.0), (10, 4));
        assert_eq!(scaled_dimensions(7, 9, 8.0), (56, 72));
    }

    #[test]
    fn test_resize_upscales_small_image() {
        let img = GrayImage::from_pixel(20, 10, Luma([90]));
        let result = apply(&img, 2.5);
        assert_eq!(result.dimensions(), (50, 25));
        // Flat input stays flat under cubic interpolation
        assert!(result.pixels().all(|p| p.0[0] == 90));
    }

    #[test]
    fn test_resize_identity_scale_is_noop() {
        let img = GrayImage::from_fn(6, 4, |x, y| Luma([(x * 10 + y) as u8]));
        let result = apply(&img, 1.0);
        assert_eq!(result, img);
    }
}
