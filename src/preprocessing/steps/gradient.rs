use image::{GrayImage, Luma};
use imageproc::gradients::{horizontal_sobel, vertical_sobel};

/// Compute the Sobel gradient magnitude, rescaled to 0-255
///
/// The rescale uses this frame's own maximum, so the same edge can map to
/// different values on frames with different contrast.
pub fn apply(image: &GrayImage) -> GrayImage {
    let (width, height) = image.dimensions();
    let gx = horizontal_sobel(image);
    let gy = vertical_sobel(image);

    let magnitudes: Vec<f32> = gx
        .pixels()
        .zip(gy.pixels())
        .map(|(x, y)| {
            let x = x.0[0] as f32;
            let y = y.0[0] as f32;
            (x * x + y * y).sqrt()
        })
        .collect();

    let max = magnitudes.iter().copied().fold(0.0f32, f32::max);
    if max <= 0.0 {
        // Flat input has no edges at all
        return GrayImage::new(width, height);
    }

    GrayImage::from_fn(width, height, |x, y| {
        let magnitude = magnitudes[(y * width + x) as usize];
        Luma([(magnitude / max * 255.0) as u8])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gradient_peaks_at_edge() {
        let img = GrayImage::from_fn(20, 10, |x, _| if x < 10 { Luma([40]) } else { Luma([180]) });

        let result = apply(&img);

        assert_eq!(result.get_pixel(9, 5).0[0], 255);
        assert_eq!(result.get_pixel(2, 5).0[0], 0);
        assert_eq!(result.get_pixel(17, 5).0[0], 0);
    }

    #[test]
    fn test_gradient_of_flat_image_is_zero() {
        let img = GrayImage::from_pixel(8, 8, Luma([200]));
        let result = apply(&img);
        assert!(result.pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn test_gradient_normalizes_per_frame() {
        // Same geometry, different contrast: both peak at 255
        let weak = GrayImage::from_fn(12, 6, |x, _| if x < 6 { Luma([100]) } else { Luma([110]) });
        let strong = GrayImage::from_fn(12, 6, |x, _| if x < 6 { Luma([0]) } else { Luma([255]) });

        assert_eq!(apply(&weak).get_pixel(5, 3).0[0], 255);
        assert_eq!(apply(&strong).get_pixel(5, 3).0[0], 255);
    }
}
