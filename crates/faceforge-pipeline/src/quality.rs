//! Advisory quality score of a composed image.
//!
//! Three sub-scores, each in `[0, 1]`, are combined with fixed weights:
//!
//! - **similarity** (0.3): a global SSIM over the luma of both images,
//! - **symmetry** (0.4): how evenly paired landmarks sit around the
//!   face's vertical midline,
//! - **naturalness** (0.3): color-histogram correlation, penalized by
//!   the share of channel values that changed by more than
//!   [`EXTREME_CHANGE`].
//!
//! The score never gates anything. Whenever a sub-score cannot be
//! computed the whole score is [`QualityAssessor::NEUTRAL`].

use serde::Serialize;

use crate::types::{LandmarkSet, RgbaImage};

/// Per-channel absolute change treated as "extreme".
pub const EXTREME_CHANGE: u8 = 100;

/// Left/right landmark pairs: outer eye corners, mouth corners,
/// cheekbones, jaw.
const SYMMETRY_PAIRS: [(usize, usize); 4] = [(33, 362), (61, 291), (116, 345), (172, 397)];

/// Histogram bins per color channel.
const BINS: usize = 16;

/// Sub-scores and the weighted total.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QualityBreakdown {
    pub similarity: f64,
    pub symmetry: f64,
    pub naturalness: f64,
    pub score: f64,
}

/// Stateless scorer.
#[derive(Debug, Clone, Copy, Default)]
pub struct QualityAssessor;

impl QualityAssessor {
    /// Score used when any sub-score cannot be computed.
    pub const NEUTRAL: f64 = 0.5;

    pub const SIMILARITY_WEIGHT: f64 = 0.3;
    pub const SYMMETRY_WEIGHT: f64 = 0.4;
    pub const NATURALNESS_WEIGHT: f64 = 0.3;

    /// Minimum landmark count needed for the symmetry pairs.
    pub const MIN_LANDMARKS: usize = 398;

    /// Combined score in `[0, 1]`.
    #[must_use]
    pub fn score(self, original: &RgbaImage, processed: &RgbaImage, landmarks: &LandmarkSet) -> f64 {
        self.assess(original, processed, landmarks)
            .map_or(Self::NEUTRAL, |b| b.score)
    }

    /// Every sub-score, or `None` if the images differ in size, are
    /// empty, or the landmarks are insufficient.
    #[must_use]
    pub fn assess(
        self,
        original: &RgbaImage,
        processed: &RgbaImage,
        landmarks: &LandmarkSet,
    ) -> Option<QualityBreakdown> {
        if original.dimensions() != processed.dimensions() || original.is_empty() {
            return None;
        }
        let similarity = similarity(original, processed)?;
        let symmetry = symmetry(landmarks)?;
        let naturalness = naturalness(original, processed)?;
        let score = Self::NATURALNESS_WEIGHT.mul_add(
            naturalness,
            Self::SIMILARITY_WEIGHT.mul_add(similarity, Self::SYMMETRY_WEIGHT * symmetry),
        );
        unit(score).map(|score| QualityBreakdown {
            similarity,
            symmetry,
            naturalness,
            score,
        })
    }
}

fn unit(value: f64) -> Option<f64> {
    value.is_finite().then(|| value.clamp(0.0, 1.0))
}

#[allow(clippy::cast_precision_loss)]
fn similarity(a: &RgbaImage, b: &RgbaImage) -> Option<f64> {
    const C1: f64 = (0.01 * 255.0) * (0.01 * 255.0);
    const C2: f64 = (0.03 * 255.0) * (0.03 * 255.0);

    let ga = image::imageops::grayscale(a);
    let gb = image::imageops::grayscale(b);
    let n = ga.as_raw().len() as f64;
    if n == 0.0 {
        return None;
    }

    let mean = |raw: &[u8]| raw.iter().map(|&v| f64::from(v)).sum::<f64>() / n;
    let (ma, mb) = (mean(ga.as_raw()), mean(gb.as_raw()));

    let (mut var_a, mut var_b, mut cov) = (0.0, 0.0, 0.0);
    for (&pa, &pb) in ga.as_raw().iter().zip(gb.as_raw()) {
        let da = f64::from(pa) - ma;
        let db = f64::from(pb) - mb;
        var_a += da * da;
        var_b += db * db;
        cov += da * db;
    }
    let (var_a, var_b, cov) = (var_a / n, var_b / n, cov / n);

    let ssim = (2.0f64.mul_add(ma * mb, C1) * 2.0f64.mul_add(cov, C2))
        / ((ma.mul_add(ma, mb * mb) + C1) * (var_a + var_b + C2));
    unit(ssim)
}

fn symmetry(landmarks: &LandmarkSet) -> Option<f64> {
    if landmarks.len() < QualityAssessor::MIN_LANDMARKS {
        return None;
    }
    let midline = landmarks.centroid()?.x;
    let scores: Vec<f64> = SYMMETRY_PAIRS
        .iter()
        .filter_map(|&(l, r)| {
            let left = (landmarks.get(l)?.x - midline).abs();
            let right = (landmarks.get(r)?.x - midline).abs();
            let max = left.max(right);
            (max > 0.0).then(|| 1.0 - (left - right).abs() / max)
        })
        .collect();
    if scores.is_empty() {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let mean = scores.iter().sum::<f64>() / scores.len() as f64;
    unit(mean)
}

fn histogram(image: &RgbaImage) -> Vec<f64> {
    let mut bins = vec![0.0; BINS * BINS * BINS];
    let bin = |v: u8| usize::from(v) * BINS / 256;
    for p in image.pixels() {
        let [r, g, b, _] = p.0;
        bins[(bin(r) * BINS + bin(g)) * BINS + bin(b)] += 1.0;
    }
    bins
}

/// Pearson correlation of two equally long series. Two flat series are
/// perfectly correlated if equal and uncorrelated otherwise.
#[allow(clippy::cast_precision_loss)]
fn correlation(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len() as f64;
    let ma = a.iter().sum::<f64>() / n;
    let mb = b.iter().sum::<f64>() / n;
    let (mut num, mut da2, mut db2) = (0.0, 0.0, 0.0);
    for (&x, &y) in a.iter().zip(b) {
        let dx = x - ma;
        let dy = y - mb;
        num += dx * dy;
        da2 += dx * dx;
        db2 += dy * dy;
    }
    let denom = (da2 * db2).sqrt();
    if denom > 0.0 {
        num / denom
    } else if a == b {
        1.0
    } else {
        0.0
    }
}

#[allow(clippy::cast_precision_loss)]
fn naturalness(original: &RgbaImage, processed: &RgbaImage) -> Option<f64> {
    let corr = correlation(&histogram(original), &histogram(processed));

    let mut extreme = 0usize;
    let mut total = 0usize;
    for (a, b) in original.pixels().zip(processed.pixels()) {
        for c in 0..3 {
            total += 1;
            if a.0[c].abs_diff(b.0[c]) > EXTREME_CHANGE {
                extreme += 1;
            }
        }
    }
    if total == 0 {
        return None;
    }
    unit(corr * (1.0 - extreme as f64 / total as f64))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::Rgba;

    use super::*;
    use crate::types::Point;

    /// Landmarks placed symmetrically about x = 50.
    fn symmetric_landmarks() -> LandmarkSet {
        let mut points = vec![Point::new(50.0, 50.0); LandmarkSet::FACE_MESH_LEN];
        for (i, &(l, r)) in SYMMETRY_PAIRS.iter().enumerate() {
            #[allow(clippy::cast_precision_loss)]
            let offset = 10.0 + i as f64 * 5.0;
            points[l] = Point::new(50.0 - offset, 40.0);
            points[r] = Point::new(50.0 + offset, 40.0);
        }
        LandmarkSet::new(points)
    }

    fn gradient(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| {
            Rgba([(x * 255 / w) as u8, (y * 255 / h) as u8, 128, 255])
        })
    }

    #[test]
    fn identical_images_score_high() {
        let img = gradient(32, 32);
        let b = QualityAssessor.assess(&img, &img, &symmetric_landmarks()).unwrap();
        assert!((b.similarity - 1.0).abs() < 1e-9);
        assert!((b.symmetry - 1.0).abs() < 1e-9);
        assert!((b.naturalness - 1.0).abs() < 1e-9);
        assert!((b.score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn insufficient_landmarks_is_neutral() {
        let img = gradient(16, 16);
        let short = LandmarkSet::new(vec![Point::new(1.0, 1.0); 10]);
        assert!((QualityAssessor.score(&img, &img, &short) - 0.5).abs() < f64::EPSILON);
        assert!(
            (QualityAssessor.score(&img, &img, &LandmarkSet::default()) - 0.5).abs()
                < f64::EPSILON
        );
    }

    #[test]
    fn mismatched_sizes_are_neutral() {
        let score = QualityAssessor.score(&gradient(8, 8), &gradient(8, 9), &symmetric_landmarks());
        assert!((score - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn degenerate_images_stay_in_range() {
        let black = RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 255]));
        let white = RgbaImage::from_pixel(8, 8, Rgba([255, 255, 255, 255]));
        let lm = symmetric_landmarks();
        for (a, b) in [(&black, &black), (&black, &white), (&white, &black)] {
            let score = QualityAssessor.score(a, b, &lm);
            assert!((0.0..=1.0).contains(&score), "score {score}");
        }
    }

    #[test]
    fn extreme_change_lowers_naturalness() {
        let black = RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 255]));
        let white = RgbaImage::from_pixel(8, 8, Rgba([255, 255, 255, 255]));
        let b = QualityAssessor.assess(&black, &white, &symmetric_landmarks()).unwrap();
        assert!(b.naturalness.abs() < 1e-9);
    }

    #[test]
    fn asymmetry_lowers_symmetry() {
        let mut lm = symmetric_landmarks();
        lm.points_mut()[33] = Point::new(0.0, 40.0);
        let img = gradient(16, 16);
        let b = QualityAssessor.assess(&img, &img, &lm).unwrap();
        assert!(b.symmetry < 0.95);
    }

    #[test]
    fn flat_histograms_correlate_when_equal() {
        assert!((correlation(&[1.0, 1.0], &[1.0, 1.0]) - 1.0).abs() < f64::EPSILON);
        assert!(correlation(&[1.0, 1.0], &[2.0, 2.0]).abs() < f64::EPSILON);
    }
}
