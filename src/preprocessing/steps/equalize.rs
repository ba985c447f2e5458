use image::{GrayImage, Luma};

/// Histogram bins above this multiple of the uniform height are clipped
pub const CLIP_LIMIT: f32 = 2.0;
/// Tiles per axis
pub const TILE_GRID: u32 = 8;

/// Apply contrast-limited adaptive histogram equalization (CLAHE)
/// Evens out uneven illumination across the display. Clip limit and tile
/// grid are fixed so consecutive frames are equalized identically.
pub fn apply(image: &GrayImage) -> GrayImage {
    clahe(image, CLIP_LIMIT, TILE_GRID, TILE_GRID)
}

fn clahe(image: &GrayImage, clip_limit: f32, grid_x: u32, grid_y: u32) -> GrayImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }

    // Tiny crops get fewer tiles so that no tile is empty
    let tiles_x = grid_x.min(width).max(1);
    let tiles_y = grid_y.min(height).max(1);

    let bounds = |tile: u32, tiles: u32, size: u32| (tile * size / tiles, (tile + 1) * size / tiles);

    let mut luts = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        let (y0, y1) = bounds(ty, tiles_y, height);
        for tx in 0..tiles_x {
            let (x0, x1) = bounds(tx, tiles_x, width);
            let mut histogram = [0u32; 256];
            for y in y0..y1 {
                for x in x0..x1 {
                    histogram[image.get_pixel(x, y).0[0] as usize] += 1;
                }
            }
            luts.push(tile_lut(&mut histogram, (x1 - x0) * (y1 - y0), clip_limit));
        }
    }

    let tile_width = width as f32 / tiles_x as f32;
    let tile_height = height as f32 / tiles_y as f32;
    let lut = |tx: usize, ty: usize| &luts[ty * tiles_x as usize + tx];

    GrayImage::from_fn(width, height, |x, y| {
        let value = image.get_pixel(x, y).0[0] as usize;

        let (tx1, tx2, xa) = neighbors(x, tile_width, tiles_x);
        let (ty1, ty2, ya) = neighbors(y, tile_height, tiles_y);

        let top = (1.0 - xa) * lut(tx1, ty1)[value] as f32 + xa * lut(tx2, ty1)[value] as f32;
        let bottom = (1.0 - xa) * lut(tx1, ty2)[value] as f32 + xa * lut(tx2, ty2)[value] as f32;
        let mapped = (1.0 - ya) * top + ya * bottom;

        Luma([mapped.round().clamp(0.0, 255.0) as u8])
    })
}

/// The two tile indices whose centers surround `pos`, and the weight of the second
fn neighbors(pos: u32, tile_size: f32, tiles: u32) -> (usize, usize, f32) {
    let t = (pos as f32 + 0.5) / tile_size - 0.5;
    let first = t.floor();
    let weight = t - first;
    let last = tiles as i32 - 1;
    let t1 = (first as i32).clamp(0, last) as usize;
    let t2 = (first as i32 + 1).clamp(0, last) as usize;
    (t1, t2, weight)
}

/// Clip the histogram, spread the excess evenly and turn the CDF into a lookup table
fn tile_lut(histogram: &mut [u32; 256], area: u32, clip_limit: f32) -> [u8; 256] {
    let clip = ((clip_limit * area as f32 / 256.0) as u32).max(1);

    let mut excess = 0u32;
    for bin in histogram.iter_mut() {
        if *bin > clip {
            excess += *bin - clip;
            *bin = clip;
        }
    }

    let batch = excess / 256;
    let mut residual = excess % 256;
    for bin in histogram.iter_mut() {
        *bin += batch;
    }
    if residual > 0 {
        let step = (256 / residual).max(1) as usize;
        for bin in histogram.iter_mut().step_by(step) {
            if residual == 0 {
                break;
            }
            *bin += 1;
            residual -= 1;
        }
    }

    let scale = 255.0 / area as f32;
    let mut lut = [0u8; 256];
    let mut cumulative = 0u32;
    for (entry, count) in lut.iter_mut().zip(histogram.iter()) {
        cumulative += count;
        *entry = (cumulative as f32 * scale).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_lut_is_monotonic_and_full_range() {
        let mut histogram = [0u32; 256];
        histogram[10] = 400;
        histogram[200] = 100;
        histogram[90] = 12;

        let lut = tile_lut(&mut histogram, 512, CLIP_LIMIT);

        assert!(lut.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(lut[255], 255);
    }

    #[test]
    fn test_tile_lut_clips_dominant_bin() {
        let mut histogram = [0u32; 256];
        histogram[128] = 1024;

        let lut = tile_lut(&mut histogram, 1024, CLIP_LIMIT);

        // Without clipping every value >= 128 would map to 255
        assert!(lut[128] < 200, "dominant bin should be clipped, got {}", lut[128]);
    }

    #[test]
    fn test_equalize_preserves_dimensions() {
        let img = GrayImage::from_fn(50, 30, |x, y| Luma([((x * 3 + y) % 256) as u8]));
        let result = apply(&img);
        assert_eq!(result.dimensions(), (50, 30));
    }

    #[test]
    fn test_equalize_is_deterministic() {
        let img = GrayImage::from_fn(40, 40, |x, y| Luma([((x * y) % 97 + 60) as u8]));
        assert_eq!(apply(&img), apply(&img));
    }

    #[test]
    fn test_equalize_handles_tiny_crop() {
        let img = GrayImage::from_pixel(3, 2, Luma([100]));
        let result = apply(&img);
        assert_eq!(result.dimensions(), (3, 2));
    }
}
