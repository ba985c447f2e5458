use image::{GrayImage, Luma};

/// Filter strength. Larger values remove more noise and more detail
const FILTER_STRENGTH: f32 = 10.0;
/// Radius of the patch compared around each pixel (7x7 template)
const TEMPLATE_RADIUS: i32 = 3;
/// Radius of the area searched for similar patches (21x21 window)
const SEARCH_RADIUS: i32 = 10;

/// Apply non-local means denoising
/// Averages pixels whose surrounding patches look alike, which removes
/// sensor noise without wiping out thin strokes the way a box filter would
pub fn apply(image: &GrayImage) -> GrayImage {
    non_local_means(image, FILTER_STRENGTH, TEMPLATE_RADIUS, SEARCH_RADIUS)
}

/// Non-local means over a replicate-padded copy of the image.
///
/// For every search offset the squared difference between the image and its
/// shifted copy is summed with an integral image, so each patch distance costs
/// four lookups instead of a full template scan.
fn non_local_means(
    image: &GrayImage,
    strength: f32,
    template_radius: i32,
    search_radius: i32,
) -> GrayImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }

    let (w, h) = (width as i32, height as i32);
    let pad = template_radius + search_radius;
    let padded_width = w + 2 * pad;
    let padded_height = h + 2 * pad;

    let padded: Vec<f32> = (0..padded_height)
        .flat_map(|py| {
            (0..padded_width).map(move |px| {
                let x = (px - pad).clamp(0, w - 1) as u32;
                let y = (py - pad).clamp(0, h - 1) as u32;
                image.get_pixel(x, y).0[0] as f32
            })
        })
        .collect();
    let at = |x: i32, y: i32| padded[(y * padded_width + x) as usize];

    // Patch distances are needed for every pixel plus a template-sized margin
    let region_width = w + 2 * template_radius;
    let region_height = h + 2 * template_radius;
    let template_size = 2 * template_radius + 1;
    let template_area = (template_size * template_size) as f64;
    let h2 = (strength * strength) as f64;

    let mut integral = vec![0.0f64; ((region_width + 1) * (region_height + 1)) as usize];
    let stride = region_width + 1;
    let mut numerator = vec![0.0f64; (w * h) as usize];
    let mut denominator = vec![0.0f64; (w * h) as usize];

    for dy in -search_radius..=search_radius {
        for dx in -search_radius..=search_radius {
            for j in 0..region_height {
                let mut row_sum = 0.0f64;
                for i in 0..region_width {
                    let a = at(search_radius + i, search_radius + j);
                    let b = at(search_radius + i + dx, search_radius + j + dy);
                    let diff = (a - b) as f64;
                    row_sum += diff * diff;
                    let idx = ((j + 1) * stride + i + 1) as usize;
                    integral[idx] = integral[idx - stride as usize] + row_sum;
                }
            }

            for y in 0..h {
                for x in 0..w {
                    let x0 = x;
                    let y0 = y;
                    let x1 = x + template_size;
                    let y1 = y + template_size;
                    let sum = integral[(y1 * stride + x1) as usize]
                        - integral[(y0 * stride + x1) as usize]
                        - integral[(y1 * stride + x0) as usize]
                        + integral[(y0 * stride + x0) as usize];

                    let distance = (sum / template_area).max(0.0);
                    let weight = (-distance / h2).exp();
                    let neighbor = at(pad + x + dx, pad + y + dy) as f64;

                    let idx = (y * w + x) as usize;
                    numerator[idx] += weight * neighbor;
                    denominator[idx] += weight;
                }
            }
        }
    }

    GrayImage::from_fn(width, height, |x, y| {
        let idx = (y * width + x) as usize;
        // The zero offset always contributes weight 1, so the denominator is positive
        let value = numerator[idx] / denominator[idx];
        Luma([value.round().clamp(0.0, 255.0) as u8])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denoise_keeps_uniform_image() {
        let img = GrayImage::from_pixel(16, 12, Luma([77]));
        let result = apply(&img);
        assert!(result.pixels().all(|p| p.0[0] == 77));
    }

    #[test]
    fn test_denoise_reduces_sensor_noise() {
        // Flat gray with a deterministic +-12 speckle pattern
        let img = GrayImage::from_fn(24, 24, |x, y| {
            let noise = if (x * 7 + y * 13) % 5 == 0 { 12 } else { 0 };
            let sign = (x + y) % 2 == 0;
            Luma([if sign { 128 + noise } else { 128 - noise }])
        });

        let result = apply(&img);

        assert!(calculate_variance(&result) < calculate_variance(&img));
    }

    #[test]
    fn test_denoise_preserves_strong_edges() {
        let img = GrayImage::from_fn(30, 20, |x, _| if x < 15 { Luma([20]) } else { Luma([230]) });

        let result = apply(&img);

        assert!(result.get_pixel(5, 10).0[0] < 40);
        assert!(result.get_pixel(25, 10).0[0] > 210);
        assert_eq!(result.dimensions(), (30, 20));
    }

    fn calculate_variance(img: &GrayImage) -> f64 {
        let pixels: Vec<f64> = img.pixels().map(|p| p.0[0] as f64).collect();
        let mean = pixels.iter().sum::<f64>() / pixels.len() as f64;
        pixels.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / pixels.len() as f64
    }
}
