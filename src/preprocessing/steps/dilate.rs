use image::GrayImage;
use imageproc::distance_transform::Norm;
use imageproc::morphology;

/// Dilate white strokes with a 3x3 square, one iteration
/// Closes small gaps in segmented digits; too much of it fuses neighbours
pub fn apply(image: &GrayImage) -> GrayImage {
    morphology::dilate(image, Norm::LInf, 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_dilate_grows_single_pixel_to_square() {
        let mut img = GrayImage::new(7, 7);
        img.put_pixel(3, 3, Luma([255]));

        let result = apply(&img);

        let white = result.pixels().filter(|p| p.0[0] == 255).count();
        assert_eq!(white, 9);
        assert_eq!(result.get_pixel(2, 2).0[0], 255);
        assert_eq!(result.get_pixel(1, 3).0[0], 0);
    }

    #[test]
    fn test_dilate_closes_one_pixel_gap() {
        let mut img = GrayImage::new(9, 3);
        for x in [2, 3, 5, 6] {
            img.put_pixel(x, 1, Luma([255]));
        }

        let result = apply(&img);

        assert_eq!(result.get_pixel(4, 1).0[0], 255);
        assert!(result.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
    }
}
