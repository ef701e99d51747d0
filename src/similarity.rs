//! Perceptual similarity between images
//!
//! A fingerprint is the classic 64-bit DCT hash: the luma image is shrunk to 32x32,
//! transformed with a 2-D DCT-II, and the 8x8 lowest-frequency coefficients are
//! compared against their median. Visually similar images differ in few bits.

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::library::ImageRecord;

const SAMPLE_SIZE: usize = 32;
const HASH_SIZE: usize = 8;

/// 64-bit perceptual hash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(pub u64);

impl Fingerprint {
    pub fn distance(self, other: Fingerprint) -> u32 {
        (self.0 ^ other.0).count_ones()
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Hamming distance between two fingerprints
pub fn distance(a: Fingerprint, b: Fingerprint) -> u32 {
    a.distance(b)
}

/// Cosine basis for the DCT-II of length `SAMPLE_SIZE`, first `HASH_SIZE` rows only
fn dct_basis() -> [[f64; SAMPLE_SIZE]; HASH_SIZE] {
    let mut basis = [[0.0; SAMPLE_SIZE]; HASH_SIZE];
    let n = SAMPLE_SIZE as f64;
    for (k, row) in basis.iter_mut().enumerate() {
        for (i, value) in row.iter_mut().enumerate() {
            *value = (std::f64::consts::PI * (2.0 * i as f64 + 1.0) * k as f64 / (2.0 * n)).cos();
        }
    }
    basis
}

fn hash_luma(luma: &GrayImage) -> Fingerprint {
    let small = imageops::resize(luma, SAMPLE_SIZE as u32, SAMPLE_SIZE as u32, FilterType::Lanczos3);
    let basis = dct_basis();

    // Rows first, keeping only the low horizontal frequencies
    let mut rows = [[0.0f64; HASH_SIZE]; SAMPLE_SIZE];
    for (y, row) in rows.iter_mut().enumerate() {
        for (v, out) in row.iter_mut().enumerate() {
            *out = (0..SAMPLE_SIZE)
                .map(|x| small.get_pixel(x as u32, y as u32)[0] as f64 * basis[v][x])
                .sum();
        }
    }

    let mut coefficients = [0.0f64; HASH_SIZE * HASH_SIZE];
    for u in 0..HASH_SIZE {
        for v in 0..HASH_SIZE {
            coefficients[u * HASH_SIZE + v] =
                (0..SAMPLE_SIZE).map(|y| basis[u][y] * rows[y][v]).sum();
        }
    }

    let mut sorted = coefficients;
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    let median = (sorted[mid - 1] + sorted[mid]) / 2.0;

    let bits = coefficients
        .iter()
        .enumerate()
        .filter(|(_, c)| **c > median)
        .fold(0u64, |acc, (i, _)| acc | (1 << i));
    Fingerprint(bits)
}

/// Fingerprint of an already decoded image
pub fn fingerprint_image(image: &DynamicImage) -> Fingerprint {
    hash_luma(&image.to_luma8())
}

/// Decode a file and fingerprint it
pub fn fingerprint(path: &Path) -> Result<Fingerprint> {
    let image = image::open(path).map_err(|e| Error::decode(path, e))?;
    Ok(fingerprint_image(&image))
}

/// Distance oracle used by the pair matcher
pub trait Similarity: Send + Sync {
    fn distance(&self, a: &ImageRecord, b: &ImageRecord) -> Result<u32>;
}

/// Production oracle: perceptual hashes, computed once per file
#[derive(Debug, Default)]
pub struct PerceptualHasher {
    cache: Mutex<HashMap<PathBuf, Fingerprint>>,
}

impl PerceptualHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fingerprint(&self, path: &Path) -> Result<Fingerprint> {
        if let Some(hit) = self.cached(path) {
            return Ok(hit);
        }
        let print = fingerprint(path)?;
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(path.to_path_buf(), print);
        }
        Ok(print)
    }

    fn cached(&self, path: &Path) -> Option<Fingerprint> {
        self.cache.lock().ok()?.get(path).copied()
    }

    pub fn cached_count(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }
}

impl Similarity for PerceptualHasher {
    fn distance(&self, a: &ImageRecord, b: &ImageRecord) -> Result<u32> {
        let fa = self.fingerprint(&a.path)?;
        let fb = self.fingerprint(&b.path)?;
        Ok(fa.distance(fb))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, RgbImage};

    fn gradient(width: u32, height: u32, flip: bool) -> DynamicImage {
        let img = GrayImage::from_fn(width, height, |x, _| {
            let v = (x * 255 / (width - 1)) as u8;
            Luma([if flip { 255 - v } else { v }])
        });
        DynamicImage::ImageLuma8(img)
    }

    #[test]
    fn test_hamming_metric() {
        let a = Fingerprint(0b1011);
        let b = Fingerprint(0b0001);
        let c = Fingerprint(u64::MAX);
        assert_eq!(distance(a, a), 0);
        assert_eq!(distance(a, b), 2);
        assert_eq!(distance(a, b), distance(b, a));
        assert!(distance(a, c) <= distance(a, b) + distance(b, c));
        assert_eq!(distance(Fingerprint(0), c), 64);
    }

    #[test]
    fn test_identical_images_have_zero_distance() {
        let a = fingerprint_image(&gradient(64, 48, false));
        let b = fingerprint_image(&gradient(64, 48, false));
        assert_eq!(distance(a, b), 0);
    }

    #[test]
    fn test_mirrored_gradient_differs() {
        let a = fingerprint_image(&gradient(64, 48, false));
        let b = fingerprint_image(&gradient(64, 48, true));
        assert!(distance(a, b) > 0);
    }

    #[test]
    fn test_missing_file_is_decode_error() {
        assert!(matches!(
            fingerprint(Path::new("/nonexistent/a.jpg")),
            Err(Error::Decode { .. })
        ));
    }

    #[test]
    fn test_hasher_caches_per_file() {
        let dir = tempfile::tempdir().unwrap();
        let path_a = dir.path().join("a.png");
        let path_b = dir.path().join("b.png");
        let img = RgbImage::from_fn(40, 30, |x, y| image::Rgb([(x * 6) as u8, (y * 8) as u8, 90]));
        img.save(&path_a).unwrap();
        img.save(&path_b).unwrap();

        let hasher = PerceptualHasher::new();
        let a = ImageRecord::new(&path_a, None, 0);
        let b = ImageRecord::new(&path_b, None, 0);
        assert_eq!(hasher.distance(&a, &b).unwrap(), 0);
        assert_eq!(hasher.distance(&b, &a).unwrap(), 0);
        assert_eq!(hasher.cached_count(), 2);
    }
}
