//! Perspective warping onto a target pixel grid

use image::RgbImage;
use nalgebra::Vector3;
use rayon::prelude::*;

use super::homography::Homography;
use crate::error::AlignmentError;

/// Bilinear sample at a real-valued position; `None` outside the image
fn sample_bilinear(src: &RgbImage, x: f64, y: f64) -> Option<[u8; 3]> {
    let (w, h) = (src.width() as f64, src.height() as f64);
    if !(x >= 0.0 && y >= 0.0 && x <= w - 1.0 && y <= h - 1.0) {
        return None;
    }
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(src.width() - 1);
    let y1 = (y0 + 1).min(src.height() - 1);
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let p00 = src.get_pixel(x0, y0).0;
    let p10 = src.get_pixel(x1, y0).0;
    let p01 = src.get_pixel(x0, y1).0;
    let p11 = src.get_pixel(x1, y1).0;

    let mut out = [0u8; 3];
    for c in 0..3 {
        let top = p00[c] as f64 * (1.0 - fx) + p10[c] as f64 * fx;
        let bottom = p01[c] as f64 * (1.0 - fx) + p11[c] as f64 * fx;
        out[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Some(out)
}

/// Resample `src` through `transform` (source to target coordinates) onto a
/// `width` x `height` grid
///
/// Each target pixel is inverse-mapped into the source; pixels that land outside
/// the source are black.
pub fn warp_perspective(
    src: &RgbImage,
    transform: &Homography,
    width: u32,
    height: u32,
) -> Result<RgbImage, AlignmentError> {
    let inverse = transform
        .try_inverse()
        .ok_or(AlignmentError::Degenerate {
            determinant: transform.determinant(),
        })?;

    let row_len = width as usize * 3;
    let mut buffer = vec![0u8; row_len * height as usize];
    buffer
        .par_chunks_mut(row_len.max(1))
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..width as usize {
                let p = inverse * Vector3::new(x as f64, y as f64, 1.0);
                if p[2].abs() < 1e-12 {
                    continue;
                }
                if let Some(rgb) = sample_bilinear(src, p[0] / p[2], p[1] / p[2]) {
                    row[x * 3..x * 3 + 3].copy_from_slice(&rgb);
                }
            }
        });

    // Buffer length always matches the dimensions
    Ok(RgbImage::from_raw(width, height, buffer).unwrap_or_else(|| RgbImage::new(width, height)))
}
