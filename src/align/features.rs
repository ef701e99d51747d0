//! Oriented FAST + rotated BRIEF features
//!
//! Keypoints come from FAST-9 on a 16-pixel circle, run over an image pyramid with
//! 3x3 non-maximum suppression. Each keypoint gets an orientation from the intensity
//! centroid of its patch, and a 256-bit binary descriptor sampled with a fixed,
//! seeded pattern rotated to that orientation.

use image::imageops::{self, FilterType};
use image::GrayImage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use super::AlignConfig;

/// Radius of the orientation / descriptor patch
const PATCH_RADIUS: i32 = 15;

/// Keypoints closer than this to an edge are dropped
const BORDER: usize = PATCH_RADIUS as usize + 1;

const DESCRIPTOR_BITS: usize = 256;

/// Bresenham circle of radius 3, clockwise from 12 o'clock
const CIRCLE: [(i32, i32); 16] = [
    (0, -3),
    (1, -3),
    (2, -2),
    (3, -1),
    (3, 0),
    (3, 1),
    (2, 2),
    (1, 3),
    (0, 3),
    (-1, 3),
    (-2, 2),
    (-3, 1),
    (-3, 0),
    (-3, -1),
    (-2, -2),
    (-1, -3),
];

/// Minimum contiguous arc length for a FAST corner
const ARC_LENGTH: usize = 9;

/// 256-bit binary descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Descriptor(pub [u64; 4]);

impl Descriptor {
    pub fn hamming(&self, other: &Descriptor) -> u32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }

    fn set_bit(&mut self, bit: usize) {
        self.0[bit / 64] |= 1 << (bit % 64);
    }
}

/// A detected keypoint with its descriptor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Feature {
    /// Position in the coordinates of the image passed to `detect`
    pub x: f32,
    pub y: f32,
    /// Pyramid level the keypoint was found on
    pub level: usize,
    pub score: u32,
    /// Orientation in radians
    pub angle: f32,
    pub descriptor: Descriptor,
}

/// Multi-scale oriented FAST / rotated BRIEF extractor
#[derive(Debug, Clone)]
pub struct OrbDetector {
    max_features: usize,
    scale_factor: f32,
    levels: usize,
    fast_threshold: u8,
    /// Point pairs (x1, y1, x2, y2) inside the patch disc
    pattern: Vec<[i8; 4]>,
}

impl OrbDetector {
    pub fn new(config: &AlignConfig) -> Self {
        Self {
            max_features: config.max_features,
            scale_factor: config.scale_factor.max(1.01),
            levels: config.pyramid_levels.max(1),
            fast_threshold: config.fast_threshold,
            pattern: sampling_pattern(config.seed),
        }
    }

    /// Features to keep on each pyramid level, decreasing geometrically
    fn level_quotas(&self) -> Vec<usize> {
        let factor = 1.0 / self.scale_factor as f64;
        let n = self.levels as f64;
        let first = self.max_features as f64 * (1.0 - factor) / (1.0 - factor.powf(n));
        let mut quotas: Vec<usize> = (0..self.levels)
            .map(|l| (first * factor.powi(l as i32)).round() as usize)
            .collect();
        // Rounding slack goes to the finest level
        let assigned: usize = quotas.iter().sum();
        if let Some(q) = quotas.first_mut() {
            *q = (*q + self.max_features).saturating_sub(assigned);
        }
        quotas
    }

    /// Detect keypoints and compute their descriptors
    pub fn detect(&self, image: &GrayImage) -> Vec<Feature> {
        let quotas = self.level_quotas();
        let mut features = Vec::with_capacity(self.max_features);

        for (level, quota) in quotas.into_iter().enumerate() {
            let scale = self.scale_factor.powi(level as i32);
            let width = (image.width() as f32 / scale).round() as u32;
            let height = (image.height() as f32 / scale).round() as u32;
            if (width as usize) <= 2 * BORDER || (height as usize) <= 2 * BORDER {
                break;
            }

            let level_image = if level == 0 {
                image.clone()
            } else {
                imageops::resize(image, width, height, FilterType::Triangle)
            };
            let smoothed = imageops::blur(&level_image, 2.0);

            let mut corners = detect_corners(&level_image, self.fast_threshold);
            corners.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| (a.1, a.0).cmp(&(b.1, b.0))));
            corners.truncate(quota);

            for (x, y, score) in corners {
                let angle = intensity_centroid_angle(&level_image, x, y);
                let descriptor = self.describe(&smoothed, x, y, angle);
                features.push(Feature {
                    x: x as f32 * scale,
                    y: y as f32 * scale,
                    level,
                    score,
                    angle,
                    descriptor,
                });
            }
        }

        log::trace!("Detected {} features", features.len());
        features
    }

    /// Steered BRIEF: compare pattern pairs rotated by the keypoint angle
    fn describe(&self, image: &GrayImage, x: usize, y: usize, angle: f32) -> Descriptor {
        let (sin, cos) = angle.sin_cos();
        let rotate = |px: i8, py: i8| -> (i32, i32) {
            let (px, py) = (px as f32, py as f32);
            (
                (cos * px - sin * py).round() as i32,
                (sin * px + cos * py).round() as i32,
            )
        };
        let sample = |dx: i32, dy: i32| -> u8 {
            image.get_pixel((x as i32 + dx) as u32, (y as i32 + dy) as u32)[0]
        };

        let mut descriptor = Descriptor::default();
        for (bit, pair) in self.pattern.iter().enumerate() {
            let (x1, y1) = rotate(pair[0], pair[1]);
            let (x2, y2) = rotate(pair[2], pair[3]);
            if sample(x1, y1) < sample(x2, y2) {
                descriptor.set_bit(bit);
            }
        }
        descriptor
    }
}

/// Deterministic BRIEF pattern: 256 point pairs uniformly inside the patch disc
fn sampling_pattern(seed: u64) -> Vec<[i8; 4]> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut point = || loop {
        let x = rng.gen_range(-PATCH_RADIUS..=PATCH_RADIUS);
        let y = rng.gen_range(-PATCH_RADIUS..=PATCH_RADIUS);
        if x * x + y * y <= PATCH_RADIUS * PATCH_RADIUS {
            return (x as i8, y as i8);
        }
    };
    (0..DESCRIPTOR_BITS)
        .map(|_| {
            let (x1, y1) = point();
            let (x2, y2) = point();
            [x1, y1, x2, y2]
        })
        .collect()
}

/// Longest circular run of `want` in the circle states
fn longest_arc(states: &[i8; 16], want: i8) -> usize {
    let mut best = 0;
    let mut run = 0;
    for i in 0..32 {
        if states[i % 16] == want {
            run += 1;
            best = best.max(run);
        } else {
            run = 0;
        }
    }
    best.min(16)
}

/// FAST-9 score at (x, y): sum of threshold excess on the winning side, 0 if not a corner
fn fast_score(data: &[u8], width: usize, x: usize, y: usize, threshold: i16) -> u32 {
    let at = |dx: i32, dy: i32| -> i16 {
        let px = (x as i32 + dx) as usize;
        let py = (y as i32 + dy) as usize;
        data[py * width + px] as i16
    };
    let p = data[y * width + x] as i16;

    // Any 9-arc covers at least two of the four compass points
    let compass = [at(0, -3), at(3, 0), at(0, 3), at(-3, 0)];
    let bright = compass.iter().filter(|&&v| v > p + threshold).count();
    let dark = compass.iter().filter(|&&v| v < p - threshold).count();
    if bright < 2 && dark < 2 {
        return 0;
    }

    let mut states = [0i8; 16];
    let mut bright_sum = 0u32;
    let mut dark_sum = 0u32;
    for (i, &(dx, dy)) in CIRCLE.iter().enumerate() {
        let v = at(dx, dy);
        if v > p + threshold {
            states[i] = 1;
            bright_sum += (v - p - threshold) as u32;
        } else if v < p - threshold {
            states[i] = -1;
            dark_sum += (p - threshold - v) as u32;
        }
    }

    let mut score = 0;
    if longest_arc(&states, 1) >= ARC_LENGTH {
        score = bright_sum;
    }
    if longest_arc(&states, -1) >= ARC_LENGTH {
        score = score.max(dark_sum);
    }
    score
}

/// FAST corners with 3x3 non-maximum suppression, as (x, y, score)
fn detect_corners(image: &GrayImage, threshold: u8) -> Vec<(usize, usize, u32)> {
    let width = image.width() as usize;
    let height = image.height() as usize;
    let data = image.as_raw();
    let threshold = threshold as i16;

    let mut scores = vec![0u32; width * height];
    scores
        .par_chunks_mut(width)
        .enumerate()
        .filter(|(y, _)| *y >= BORDER && *y < height - BORDER)
        .for_each(|(y, row)| {
            for (x, score) in row.iter_mut().enumerate().take(width - BORDER).skip(BORDER) {
                *score = fast_score(data, width, x, y, threshold);
            }
        });

    let mut corners = Vec::new();
    for y in BORDER..height - BORDER {
        for x in BORDER..width - BORDER {
            let score = scores[y * width + x];
            if score == 0 {
                continue;
            }
            let mut is_max = true;
            'neighbours: for ny in y - 1..=y + 1 {
                for nx in x - 1..=x + 1 {
                    if (nx, ny) == (x, y) {
                        continue;
                    }
                    let other = scores[ny * width + nx];
                    // Ties go to the first pixel in raster order
                    let earlier = (ny, nx) < (y, x);
                    if other > score || (earlier && other == score) {
                        is_max = false;
                        break 'neighbours;
                    }
                }
            }
            if is_max {
                corners.push((x, y, score));
            }
        }
    }
    corners
}

/// Orientation from the intensity centroid of the patch disc
fn intensity_centroid_angle(image: &GrayImage, x: usize, y: usize) -> f32 {
    let mut m01 = 0.0f64;
    let mut m10 = 0.0f64;
    for dy in -PATCH_RADIUS..=PATCH_RADIUS {
        for dx in -PATCH_RADIUS..=PATCH_RADIUS {
            if dx * dx + dy * dy > PATCH_RADIUS * PATCH_RADIUS {
                continue;
            }
            let v = image.get_pixel((x as i32 + dx) as u32, (y as i32 + dy) as u32)[0] as f64;
            m10 += v * dx as f64;
            m01 += v * dy as f64;
        }
    }
    m01.atan2(m10) as f32
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::Luma;

    /// Deterministic cluttered scene: overlapping rectangles of random intensity
    pub(crate) fn scene(width: u32, height: u32, seed: u64) -> GrayImage {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut img = GrayImage::from_pixel(width, height, Luma([20]));
        for _ in 0..80 {
            let w = rng.gen_range(8..48);
            let h = rng.gen_range(8..48);
            let x0 = rng.gen_range(0..width - w);
            let y0 = rng.gen_range(0..height - h);
            let v = rng.gen_range(60..=255u8);
            for y in y0..y0 + h {
                for x in x0..x0 + w {
                    img.put_pixel(x, y, Luma([v]));
                }
            }
        }
        img
    }

    #[test]
    fn test_hamming_distance() {
        let a = Descriptor([0, 0, 0, 0]);
        let b = Descriptor([1, 3, 0, u64::MAX]);
        assert_eq!(a.hamming(&b), 1 + 2 + 64);
        assert_eq!(b.hamming(&b), 0);
    }

    #[test]
    fn test_longest_arc_wraps() {
        let mut states = [0i8; 16];
        for i in [12, 13, 14, 15, 0, 1, 2, 3, 4] {
            states[i] = 1;
        }
        assert_eq!(longest_arc(&states, 1), 9);
        assert_eq!(longest_arc(&states, -1), 0);
    }

    #[test]
    fn test_uniform_image_has_no_features() {
        let detector = OrbDetector::new(&AlignConfig::default());
        let img = GrayImage::from_pixel(200, 150, Luma([128]));
        assert!(detector.detect(&img).is_empty());
    }

    #[test]
    fn test_detects_rectangle_corners() {
        let detector = OrbDetector::new(&AlignConfig::default());
        let img = scene(320, 240, 7);
        let features = detector.detect(&img);

        assert!(features.len() > 50);
        assert!(features.len() <= AlignConfig::default().max_features);
        for f in &features {
            assert!(f.x >= 0.0 && f.x < 320.0);
            assert!(f.y >= 0.0 && f.y < 240.0);
        }
    }

    #[test]
    fn test_detection_is_deterministic() {
        let detector = OrbDetector::new(&AlignConfig::default());
        let img = scene(160, 120, 3);
        assert_eq!(detector.detect(&img), detector.detect(&img));
    }

    #[test]
    fn test_pattern_stays_inside_patch() {
        for pair in sampling_pattern(42) {
            for (x, y) in [(pair[0], pair[1]), (pair[2], pair[3])] {
                let (x, y) = (x as i32, y as i32);
                assert!(x * x + y * y <= PATCH_RADIUS * PATCH_RADIUS);
            }
        }
    }
}
