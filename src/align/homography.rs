//! Robust planar homography estimation
//!
//! Four-point DLT (Hartley-normalized, solved via SVD) inside a RANSAC loop with an
//! adaptive iteration count, followed by a least-squares refit on all inliers.

use nalgebra::{DMatrix, Matrix3, Vector3};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;

use crate::error::AlignmentError;

/// 3x3 projective transform, source coordinates to destination coordinates
pub type Homography = Matrix3<f64>;

/// Determinants below this are treated as singular
const MIN_DETERMINANT: f64 = 1e-10;

const SAMPLE_SIZE: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct RansacConfig {
    /// Maximum reprojection error for an inlier, in pixels
    pub threshold: f64,
    pub max_iterations: usize,
    /// Desired probability of drawing at least one outlier-free sample
    pub confidence: f64,
    pub seed: u64,
}

impl Default for RansacConfig {
    fn default() -> Self {
        Self {
            threshold: 5.0,
            max_iterations: 2000,
            confidence: 0.995,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RansacResult {
    pub homography: Homography,
    /// Inlier mask, one entry per correspondence
    pub inliers: Vec<bool>,
}

impl RansacResult {
    pub fn inlier_count(&self) -> usize {
        self.inliers.iter().filter(|&&i| i).count()
    }
}

/// Apply a homography to a point; `None` when the point maps to infinity
pub fn transform_point(h: &Homography, (x, y): (f64, f64)) -> Option<(f64, f64)> {
    let p = h * Vector3::new(x, y, 1.0);
    if p[2].abs() < 1e-12 {
        return None;
    }
    Some((p[0] / p[2], p[1] / p[2]))
}

/// Similarity transform that moves the centroid to the origin and the mean
/// distance to sqrt(2)
fn normalization(points: &[(f64, f64)]) -> Matrix3<f64> {
    let n = points.len() as f64;
    let cx = points.iter().map(|p| p.0).sum::<f64>() / n;
    let cy = points.iter().map(|p| p.1).sum::<f64>() / n;
    let mean_dist = points
        .iter()
        .map(|p| ((p.0 - cx).powi(2) + (p.1 - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    let s = if mean_dist > 1e-12 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };
    Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0)
}

/// Direct linear transform over `src.len() >= 4` correspondences
pub fn fit_dlt(src: &[(f64, f64)], dst: &[(f64, f64)]) -> Option<Homography> {
    if src.len() != dst.len() || src.len() < SAMPLE_SIZE {
        return None;
    }

    let t_src = normalization(src);
    let t_dst = normalization(dst);

    let rows = (2 * src.len()).max(9);
    let mut a = DMatrix::<f64>::zeros(rows, 9);
    for (i, (s, d)) in src.iter().zip(dst).enumerate() {
        let (x1, y1) = transform_point(&t_src, *s)?;
        let (x2, y2) = transform_point(&t_dst, *d)?;
        let r = 2 * i;
        a.row_mut(r)
            .copy_from_slice(&[-x1, -y1, -1.0, 0.0, 0.0, 0.0, x2 * x1, x2 * y1, x2]);
        a.row_mut(r + 1)
            .copy_from_slice(&[0.0, 0.0, 0.0, -x1, -y1, -1.0, y2 * x1, y2 * y1, y2]);
    }

    // Extra zero rows (minimal samples) give SVD a full 9x9 V
    let svd = a.svd(false, true);
    let v_t = svd.v_t?;
    let (smallest, _) = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))?;
    let h = v_t.row(smallest);
    let normalized = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);

    let h = t_dst.try_inverse()? * normalized * t_src;
    if h[(2, 2)].abs() < 1e-12 {
        return Some(h);
    }
    Some(h / h[(2, 2)])
}

/// Any three of the four sample points (nearly) on one line
fn is_degenerate_sample(points: &[(f64, f64)]) -> bool {
    let area = |a: (f64, f64), b: (f64, f64), c: (f64, f64)| {
        ((b.0 - a.0) * (c.1 - a.1) - (b.1 - a.1) * (c.0 - a.0)).abs()
    };
    for i in 0..points.len() {
        for j in i + 1..points.len() {
            for k in j + 1..points.len() {
                if area(points[i], points[j], points[k]) < 1e-6 {
                    return true;
                }
            }
        }
    }
    false
}

fn inlier_mask(h: &Homography, src: &[(f64, f64)], dst: &[(f64, f64)], threshold: f64) -> Vec<bool> {
    let limit = threshold * threshold;
    src.iter()
        .zip(dst)
        .map(|(s, d)| match transform_point(h, *s) {
            Some((x, y)) => (x - d.0).powi(2) + (y - d.1).powi(2) <= limit,
            None => false,
        })
        .collect()
}

/// Iterations needed to hit `confidence` given the current inlier ratio
fn required_iterations(inlier_ratio: f64, confidence: f64, max_iterations: usize) -> usize {
    let good_sample = inlier_ratio.powi(SAMPLE_SIZE as i32);
    if good_sample <= f64::EPSILON {
        return max_iterations;
    }
    if good_sample >= 1.0 - f64::EPSILON {
        return 1;
    }
    let n = (1.0 - confidence).ln() / (1.0 - good_sample).ln();
    if n.is_finite() {
        (n.ceil() as usize).clamp(1, max_iterations)
    } else {
        max_iterations
    }
}

/// Estimate the homography mapping `src` onto `dst`
pub fn estimate_ransac(
    src: &[(f64, f64)],
    dst: &[(f64, f64)],
    config: &RansacConfig,
) -> Result<RansacResult, AlignmentError> {
    let matches = src.len().min(dst.len());
    if matches < SAMPLE_SIZE {
        return Err(AlignmentError::NoConsensus { matches });
    }
    let (src, dst) = (&src[..matches], &dst[..matches]);

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut best: Option<(Homography, Vec<bool>, usize)> = None;
    let mut needed = config.max_iterations;
    let mut iteration = 0;

    while iteration < needed {
        iteration += 1;
        let sample = index::sample(&mut rng, matches, SAMPLE_SIZE);
        let s: Vec<_> = sample.iter().map(|i| src[i]).collect();
        let d: Vec<_> = sample.iter().map(|i| dst[i]).collect();
        if is_degenerate_sample(&s) || is_degenerate_sample(&d) {
            continue;
        }
        let Some(h) = fit_dlt(&s, &d) else { continue };

        let mask = inlier_mask(&h, src, dst, config.threshold);
        let count = mask.iter().filter(|&&m| m).count();
        if best.as_ref().map_or(true, |(_, _, c)| count > *c) {
            needed = required_iterations(
                count as f64 / matches as f64,
                config.confidence,
                config.max_iterations,
            );
            best = Some((h, mask, count));
        }
    }

    let (mut homography, mut inliers, count) = best
        .filter(|(_, _, count)| *count >= SAMPLE_SIZE)
        .ok_or(AlignmentError::NoConsensus { matches })?;
    log::debug!(
        "RANSAC: {} / {} inliers after {} iterations",
        count,
        matches,
        iteration
    );

    // Refit on the consensus set, keeping it only if it does not lose inliers
    let (s, d): (Vec<_>, Vec<_>) = src
        .iter()
        .zip(dst)
        .zip(&inliers)
        .filter(|(_, inlier)| **inlier)
        .map(|((s, d), _)| (*s, *d))
        .unzip();
    if let Some(refit) = fit_dlt(&s, &d) {
        let mask = inlier_mask(&refit, src, dst, config.threshold);
        if mask.iter().filter(|&&m| m).count() >= count {
            homography = refit;
            inliers = mask;
        }
    }

    let determinant = homography.determinant();
    if !determinant.is_finite() || determinant.abs() < MIN_DETERMINANT {
        return Err(AlignmentError::Degenerate { determinant });
    }

    Ok(RansacResult {
        homography,
        inliers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn grid() -> Vec<(f64, f64)> {
        let mut points = Vec::new();
        for i in 0..6 {
            for j in 0..5 {
                points.push((20.0 + i as f64 * 37.0, 15.0 + j as f64 * 29.0 + i as f64 * 3.0));
            }
        }
        points
    }

    fn assert_close(a: (f64, f64), b: (f64, f64), tol: f64) {
        assert!(
            (a.0 - b.0).abs() < tol && (a.1 - b.1).abs() < tol,
            "{:?} vs {:?}",
            a,
            b
        );
    }

    #[test]
    fn test_dlt_recovers_projective_map() {
        let truth = Matrix3::new(1.02, 0.05, 12.0, -0.03, 0.98, -7.0, 1e-4, -5e-5, 1.0);
        let src = grid();
        let dst: Vec<_> = src.iter().map(|p| transform_point(&truth, *p).unwrap()).collect();

        let h = fit_dlt(&src, &dst).unwrap();
        for p in &src {
            assert_close(
                transform_point(&h, *p).unwrap(),
                transform_point(&truth, *p).unwrap(),
                1e-6,
            );
        }
    }

    #[test]
    fn test_ransac_ignores_outliers() {
        let src = grid();
        let mut dst: Vec<_> = src.iter().map(|p| (p.0 + 6.0, p.1 - 2.0)).collect();
        let mut rng = StdRng::seed_from_u64(9);
        for d in dst.iter_mut().step_by(4) {
            *d = (rng.gen_range(0.0..300.0), rng.gen_range(0.0..200.0));
        }

        let result = estimate_ransac(&src, &dst, &RansacConfig::default()).unwrap();
        assert!(result.inlier_count() >= 22);
        assert_close(
            transform_point(&result.homography, (100.0, 100.0)).unwrap(),
            (106.0, 98.0),
            0.5,
        );
    }

    #[test]
    fn test_ransac_needs_four_points() {
        let pts = vec![(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)];
        assert_eq!(
            estimate_ransac(&pts, &pts, &RansacConfig::default()).unwrap_err(),
            AlignmentError::NoConsensus { matches: 3 }
        );
    }

    #[test]
    fn test_collinear_points_have_no_consensus() {
        let src: Vec<_> = (0..12).map(|i| (i as f64 * 10.0, i as f64 * 5.0)).collect();
        let result = estimate_ransac(&src, &src, &RansacConfig::default());
        assert!(matches!(result, Err(AlignmentError::NoConsensus { .. })));
    }

    #[test]
    fn test_required_iterations() {
        assert_eq!(required_iterations(1.0, 0.995, 2000), 1);
        assert_eq!(required_iterations(0.0, 0.995, 2000), 2000);
        let n = required_iterations(0.5, 0.995, 2000);
        assert!(n > 50 && n < 100);
    }
}
