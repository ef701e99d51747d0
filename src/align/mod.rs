//! Geometric alignment of a stereo pair
//!
//! The right image is registered onto the left image's pixel grid:
//! features are detected on both luma channels, matched with a cross-check,
//! a homography is fitted robustly, and the right RGB image is warped through it.

pub mod features;
pub mod homography;
pub mod matcher;
pub mod warp;

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, RgbImage};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{AlignmentError, Error, Result};
use features::{Feature, OrbDetector};
use homography::{Homography, RansacConfig};

/// Aligner tuning
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AlignConfig {
    /// Keypoints kept per image across all pyramid levels
    pub max_features: usize,
    pub scale_factor: f32,
    pub pyramid_levels: usize,
    pub fast_threshold: u8,
    /// Fewer descriptors than this in either image fails the pair
    pub min_descriptors: usize,
    /// Fewer cross-checked matches than this fails the pair
    pub min_matches: usize,
    /// RANSAC reprojection threshold in full-resolution pixels
    pub ransac_threshold: f64,
    pub ransac_max_iterations: usize,
    pub ransac_confidence: f64,
    /// Seed for the descriptor pattern and RANSAC sampling
    pub seed: u64,
    /// Images larger than this are downscaled for detection (0 disables)
    pub detect_max_dimension: u32,
}

impl Default for AlignConfig {
    fn default() -> Self {
        Self {
            max_features: 1000,
            scale_factor: 1.2,
            pyramid_levels: 8,
            fast_threshold: 20,
            min_descriptors: 10,
            min_matches: 10,
            ransac_threshold: 5.0,
            ransac_max_iterations: 2000,
            ransac_confidence: 0.995,
            seed: 0x5EED_0B1F,
            detect_max_dimension: 1600,
        }
    }
}

impl AlignConfig {
    fn ransac(&self) -> RansacConfig {
        RansacConfig {
            threshold: self.ransac_threshold,
            max_iterations: self.ransac_max_iterations.max(1),
            confidence: self.ransac_confidence.clamp(0.5, 0.999_999),
            seed: self.seed,
        }
    }
}

/// Fitted transform plus the right image resampled onto the left grid
#[derive(Debug, Clone)]
pub struct AlignmentResult {
    /// Maps right-image coordinates to left-image coordinates
    pub homography: Homography,
    pub inliers: usize,
    pub correspondences: usize,
    pub aligned_right: RgbImage,
}

/// Left image and aligned right image, same dimensions
#[derive(Debug, Clone)]
pub struct AlignedPair {
    pub left: RgbImage,
    pub alignment: AlignmentResult,
}

impl AlignedPair {
    pub fn right(&self) -> &RgbImage {
        &self.alignment.aligned_right
    }
}

/// Features of one image, in full-resolution coordinates
struct Detection {
    features: Vec<Feature>,
    /// Full-resolution pixels per detection pixel
    scale: f64,
}

impl Detection {
    fn point(&self, index: usize) -> (f64, f64) {
        let f = &self.features[index];
        (f.x as f64 * self.scale, f.y as f64 * self.scale)
    }
}

pub struct Aligner {
    config: AlignConfig,
    detector: OrbDetector,
}

impl Aligner {
    pub fn new(config: AlignConfig) -> Self {
        let detector = OrbDetector::new(&config);
        Self { config, detector }
    }

    pub fn config(&self) -> &AlignConfig {
        &self.config
    }

    fn detect(&self, luma: &GrayImage) -> Detection {
        let longest = luma.width().max(luma.height());
        let limit = self.config.detect_max_dimension;
        if limit == 0 || longest <= limit {
            return Detection {
                features: self.detector.detect(luma),
                scale: 1.0,
            };
        }

        let factor = limit as f64 / longest as f64;
        let width = ((luma.width() as f64 * factor).round() as u32).max(1);
        let height = ((luma.height() as f64 * factor).round() as u32).max(1);
        let small = imageops::resize(luma, width, height, FilterType::Triangle);
        Detection {
            features: self.detector.detect(&small),
            scale: luma.width() as f64 / width as f64,
        }
    }

    /// Fit the right-to-left homography from precomputed features
    pub fn estimate(
        &self,
        left: &[Feature],
        right: &[Feature],
    ) -> std::result::Result<(Homography, usize, usize), AlignmentError> {
        let left = Detection {
            features: left.to_vec(),
            scale: 1.0,
        };
        let right = Detection {
            features: right.to_vec(),
            scale: 1.0,
        };
        self.estimate_detections(&left, &right)
    }

    fn estimate_detections(
        &self,
        left: &Detection,
        right: &Detection,
    ) -> std::result::Result<(Homography, usize, usize), AlignmentError> {
        let left_desc: Vec<_> = left.features.iter().map(|f| f.descriptor).collect();
        let right_desc: Vec<_> = right.features.iter().map(|f| f.descriptor).collect();

        let matches = matcher::cross_check_match(&right_desc, &left_desc);
        if matches.len() < self.config.min_matches {
            return Err(AlignmentError::TooFewMatches {
                found: matches.len(),
                required: self.config.min_matches,
            });
        }

        let src: Vec<_> = matches.iter().map(|m| right.point(m.query)).collect();
        let dst: Vec<_> = matches.iter().map(|m| left.point(m.train)).collect();
        let fit = homography::estimate_ransac(&src, &dst, &self.config.ransac())?;
        Ok((fit.homography, fit.inlier_count(), matches.len()))
    }

    /// Align two decoded images; paths are only used in error reports
    pub fn align_images(
        &self,
        left: &DynamicImage,
        right: &DynamicImage,
        left_path: &Path,
        right_path: &Path,
    ) -> Result<AlignedPair> {
        let left_luma = left.to_luma8();
        let right_luma = right.to_luma8();
        let (left_det, right_det) =
            rayon::join(|| self.detect(&left_luma), || self.detect(&right_luma));

        for (det, path) in [(&left_det, left_path), (&right_det, right_path)] {
            if det.features.len() < self.config.min_descriptors {
                return Err(Error::InsufficientFeatures {
                    path: path.to_path_buf(),
                    found: det.features.len(),
                    required: self.config.min_descriptors,
                });
            }
        }

        let (homography, inliers, correspondences) =
            self.estimate_detections(&left_det, &right_det)?;
        log::debug!(
            "Aligned {} onto {}: {} inliers of {} matches",
            right_path.display(),
            left_path.display(),
            inliers,
            correspondences
        );

        let left_rgb = left.to_rgb8();
        let aligned_right = warp::warp_perspective(
            &right.to_rgb8(),
            &homography,
            left_rgb.width(),
            left_rgb.height(),
        )?;

        Ok(AlignedPair {
            left: left_rgb,
            alignment: AlignmentResult {
                homography,
                inliers,
                correspondences,
                aligned_right,
            },
        })
    }

    /// Decode and align two image files
    pub fn align_pair(&self, left_path: &Path, right_path: &Path) -> Result<AlignedPair> {
        let (left, right) = rayon::join(|| image::open(left_path), || image::open(right_path));
        let left = left.map_err(|e| Error::decode(left_path, e))?;
        let right = right.map_err(|e| Error::decode(right_path, e))?;
        self.align_images(&left, &right, left_path, right_path)
    }
}

/// Decode and align two files with a one-off aligner
pub fn align_pair(left: &Path, right: &Path, config: &AlignConfig) -> Result<AlignedPair> {
    Aligner::new(config.clone()).align_pair(left, right)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::features::tests::scene;
    use crate::align::features::Descriptor;
    use image::Luma;

    fn shifted(img: &GrayImage, dx: u32) -> GrayImage {
        GrayImage::from_fn(img.width(), img.height(), |x, y| {
            if x + dx < img.width() {
                *img.get_pixel(x + dx, y)
            } else {
                Luma([20])
            }
        })
    }

    #[test]
    fn test_recovers_translation() {
        let left = scene(320, 240, 11);
        let right = shifted(&left, 6);
        let aligner = Aligner::new(AlignConfig::default());
        let pair = aligner
            .align_images(
                &DynamicImage::ImageLuma8(left),
                &DynamicImage::ImageLuma8(right),
                Path::new("left.png"),
                Path::new("right.png"),
            )
            .unwrap();

        // Right pixel (x, y) shows left pixel (x + 6, y)
        let (x, y) = homography::transform_point(&pair.alignment.homography, (150.0, 120.0)).unwrap();
        assert!((x - 156.0).abs() < 1.0, "x = {}", x);
        assert!((y - 120.0).abs() < 1.0, "y = {}", y);
        assert!(pair.alignment.inliers >= 10);
        assert_eq!(pair.right().dimensions(), pair.left.dimensions());
    }

    #[test]
    fn test_featureless_image_is_insufficient() {
        let left = DynamicImage::ImageLuma8(scene(200, 150, 5));
        let right = DynamicImage::ImageLuma8(GrayImage::from_pixel(200, 150, Luma([90])));
        let err = Aligner::new(AlignConfig::default())
            .align_images(&left, &right, Path::new("l.jpg"), Path::new("r.jpg"))
            .unwrap_err();
        match err {
            Error::InsufficientFeatures { path, found, required } => {
                assert_eq!(path, Path::new("r.jpg"));
                assert_eq!(found, 0);
                assert_eq!(required, 10);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_too_few_correspondences() {
        let feature = |i: usize, descriptor: Descriptor| Feature {
            x: i as f32 * 10.0,
            y: (i % 3) as f32 * 7.0,
            level: 0,
            score: 1,
            angle: 0.0,
            descriptor,
        };
        let left: Vec<_> = (0..12).map(|i| feature(i, Descriptor([1 << i, 0, 0, 0]))).collect();
        let right: Vec<_> = (0..12).map(|i| feature(i, Descriptor::default())).collect();

        let err = Aligner::new(AlignConfig::default())
            .estimate(&left, &right)
            .unwrap_err();
        assert_eq!(
            err,
            AlignmentError::TooFewMatches {
                found: 1,
                required: 10
            }
        );
    }

    #[test]
    fn test_missing_file_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.png");
        scene(64, 64, 1).save(&good).unwrap();
        let err = align_pair(&good, &dir.path().join("missing.png"), &AlignConfig::default())
            .unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
    }

    #[test]
    fn test_large_images_are_detected_downscaled() {
        let aligner = Aligner::new(AlignConfig {
            detect_max_dimension: 160,
            ..AlignConfig::default()
        });
        let detection = aligner.detect(&scene(320, 240, 2));
        assert_eq!(detection.scale, 2.0);
        for i in 0..detection.features.len() {
            let (x, y) = detection.point(i);
            assert!(x < 320.0 && y < 240.0);
        }
    }
}
