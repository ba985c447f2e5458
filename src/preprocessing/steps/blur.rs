use image::GrayImage;
use imageproc::filter::filter3x3;

/// Apply a light 3x3 Gaussian blur
/// Knocks down residual speckle before sharpening can amplify it
pub fn apply(image: &GrayImage) -> GrayImage {
    // Binomial approximation of a Gaussian with sigma 0.8
    let kernel: [f32; 9] = [
        1.0 / 16.0,
        2.0 / 16.0,
        1.0 / 16.0,
        2.0 / 16.0,
        4.0 / 16.0,
        2.0 / 16.0,
        1.0 / 16.0,
        2.0 / 16.0,
        1.0 / 16.0,
    ];

    filter3x3(image, &kernel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_blur_spreads_isolated_pixel() {
        let mut img = GrayImage::from_pixel(9, 9, Luma([0]));
        img.put_pixel(4, 4, Luma([160]));

        let result = apply(&img);

        assert_eq!(result.get_pixel(4, 4).0[0], 40);
        assert_eq!(result.get_pixel(3, 4).0[0], 20);
        assert_eq!(result.get_pixel(3, 3).0[0], 10);
        assert_eq!(result.get_pixel(0, 0).0[0], 0);
    }

    #[test]
    fn test_blur_keeps_flat_regions() {
        let img = GrayImage::from_pixel(12, 7, Luma([128]));
        let result = apply(&img);
        assert!(result.pixels().all(|p| p.0[0] == 128));
    }
}
