//! Built-in geometry effects.
//!
//! A geometry effect first moves the landmarks of its region, with
//! displacements proportional to the face size, then warps the image so
//! pixels follow them. The warp is an inverse mapping: each output pixel
//! near a moved landmark samples the source at its position minus a
//! Gaussian-weighted average of nearby displacements.

use image::Rgba;

use super::regions::{
    self, CHIN, JAW, JAW_CORNERS, LEFT_CHEEKBONE, LEFT_EYE, LEFT_FACE_EDGE, LEFT_OUTER_EYE,
    NOSE_BRIDGE_SIDES, NOSE_TIP, NOSE_WINGS, RIGHT_CHEEKBONE, RIGHT_EYE, RIGHT_FACE_EDGE,
    RIGHT_OUTER_EYE,
};
use crate::applier::{AppliedEffect, EffectApplier};
use crate::effect::{CheekboneConfig, EffectConfig, EyeConfig, JawlineConfig, NoseConfig};
use crate::types::{ApplierError, LandmarkSet, Point, RgbaImage};

/// Warp influence radius as a fraction of face width.
const FALLOFF: f64 = 0.12;

/// Displacements below this many pixels are not resampled.
const MIN_SHIFT: f64 = 1e-3;

struct Frame {
    width: f64,
    height: f64,
    midline: f64,
}

impl Frame {
    fn of(landmarks: &LandmarkSet) -> Result<Self, ApplierError> {
        let (width, height) = regions::face_size(landmarks)?;
        let left = regions::landmark(landmarks, LEFT_FACE_EDGE)?;
        let right = regions::landmark(landmarks, RIGHT_FACE_EDGE)?;
        Ok(Self {
            width,
            height,
            midline: (left.x + right.x) / 2.0,
        })
    }
}

fn side(x: f64, center: f64) -> f64 {
    if x < center { -1.0 } else { 1.0 }
}

fn shift(points: &mut [Point], indices: &[usize], f: impl Fn(Point) -> Point) {
    for &i in indices {
        if let Some(p) = points.get_mut(i) {
            *p = f(*p);
        }
    }
}

fn nose(lm: &mut LandmarkSet, c: &NoseConfig) -> Result<(), ApplierError> {
    regions::require(lm, NOSE_TIP)?;
    regions::require(lm, NOSE_WINGS)?;
    regions::require(lm, NOSE_BRIDGE_SIDES)?;
    let f = Frame::of(lm)?;
    let axis = regions::landmark(lm, NOSE_TIP[0])?.x;
    let points = lm.points_mut();

    shift(points, NOSE_TIP, |p| Point {
        y: c.height.mul_add(-0.04 * f.height, p.y),
        ..p
    });
    shift(points, &NOSE_TIP[..2], |p| Point {
        y: c.tip.mul_add(0.02 * f.height, p.y),
        ..p
    });
    shift(points, NOSE_WINGS, |p| Point {
        x: (side(p.x, axis) * c.width).mul_add(0.04 * f.width, p.x),
        ..p
    });
    shift(points, NOSE_BRIDGE_SIDES, |p| Point {
        x: (side(p.x, axis) * c.bridge).mul_add(0.02 * f.width, p.x),
        ..p
    });
    Ok(())
}

fn eyes(lm: &mut LandmarkSet, c: &EyeConfig) -> Result<(), ApplierError> {
    let f = Frame::of(lm)?;
    for (contour, outer) in [(LEFT_EYE, LEFT_OUTER_EYE), (RIGHT_EYE, RIGHT_OUTER_EYE)] {
        let center = regions::center(lm, contour)?;
        let scale = c.size.mul_add(0.15, 1.0);
        let squash = c.shape.mul_add(-0.1, 1.0);
        let dx = (side(center.x, f.midline) * c.position) * 0.02 * f.width;
        let points = lm.points_mut();
        shift(points, contour, |p| Point {
            x: (p.x - center.x).mul_add(scale, center.x) + dx,
            y: (p.y - center.y).mul_add(scale * squash, center.y),
            ..p
        });
        shift(points, &[outer], |p| Point {
            y: c.angle.mul_add(-0.02 * f.height, p.y),
            ..p
        });
    }
    Ok(())
}

fn jawline(lm: &mut LandmarkSet, c: &JawlineConfig) -> Result<(), ApplierError> {
    regions::require(lm, JAW)?;
    let f = Frame::of(lm)?;
    let points = lm.points_mut();
    shift(points, JAW, |p| Point {
        x: (p.x - f.midline).mul_add(c.width * 0.1, p.x),
        ..p
    });
    shift(points, JAW_CORNERS, |p| Point {
        x: (p.x - f.midline).mul_add(-c.angle * 0.05, p.x),
        ..p
    });
    shift(points, CHIN, |p| Point {
        y: c.length.mul_add(0.05 * f.height, p.y),
        ..p
    });
    Ok(())
}

fn cheekbones(lm: &mut LandmarkSet, c: &CheekboneConfig) -> Result<(), ApplierError> {
    regions::require(lm, LEFT_CHEEKBONE)?;
    regions::require(lm, RIGHT_CHEEKBONE)?;
    let f = Frame::of(lm)?;
    let outward = c.prominence.mul_add(0.04, c.width * 0.08);
    let points = lm.points_mut();
    for side_points in [LEFT_CHEEKBONE, RIGHT_CHEEKBONE] {
        shift(points, side_points, |p| Point {
            x: (p.x - f.midline).mul_add(outward, p.x),
            y: c.height.mul_add(-0.03 * f.height, p.y),
            ..p
        });
    }
    Ok(())
}

/// Bilinear sample with edge clamping.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn sample(image: &RgbaImage, x: f64, y: f64) -> Rgba<u8> {
    let (w, h) = image.dimensions();
    let max_x = f64::from(w - 1);
    let max_y = f64::from(h - 1);
    let x = x.clamp(0.0, max_x);
    let y = y.clamp(0.0, max_y);
    let (x0, y0) = (x.floor(), y.floor());
    let (fx, fy) = (x - x0, y - y0);
    let (x0, y0) = (x0 as u32, y0 as u32);
    let (x1, y1) = ((x0 + 1).min(w - 1), (y0 + 1).min(h - 1));

    let (p00, p10) = (image.get_pixel(x0, y0).0, image.get_pixel(x1, y0).0);
    let (p01, p11) = (image.get_pixel(x0, y1).0, image.get_pixel(x1, y1).0);
    Rgba(std::array::from_fn(|c| {
        let top = fx.mul_add(f64::from(p10[c]) - f64::from(p00[c]), f64::from(p00[c]));
        let bottom = fx.mul_add(f64::from(p11[c]) - f64::from(p01[c]), f64::from(p01[c]));
        fy.mul_add(bottom - top, top).round().clamp(0.0, 255.0) as u8
    }))
}

/// Warp `image` so content at each `from` landmark moves to its `to`.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn warp(image: &RgbaImage, from: &LandmarkSet, to: &LandmarkSet, radius: f64) -> RgbaImage {
    let moves: Vec<(Point, f64, f64)> = from
        .points()
        .iter()
        .zip(to.points())
        .filter(|(a, b)| a != b)
        .map(|(a, b)| (*b, b.x - a.x, b.y - a.y))
        .collect();
    let mut out = image.clone();
    let (w, h) = image.dimensions();
    if moves.is_empty() || w == 0 || h == 0 {
        return out;
    }

    let reach = radius * 3.0;
    let min_x = moves.iter().map(|m| m.0.x).fold(f64::INFINITY, f64::min) - reach;
    let max_x = moves.iter().map(|m| m.0.x).fold(f64::NEG_INFINITY, f64::max) + reach;
    let min_y = moves.iter().map(|m| m.0.y).fold(f64::INFINITY, f64::min) - reach;
    let max_y = moves.iter().map(|m| m.0.y).fold(f64::NEG_INFINITY, f64::max) + reach;
    let clamp_x = |v: f64| v.clamp(0.0, f64::from(w - 1)) as u32;
    let clamp_y = |v: f64| v.clamp(0.0, f64::from(h - 1)) as u32;
    let two_r2 = 2.0 * radius * radius;

    for y in clamp_y(min_y)..=clamp_y(max_y) {
        for x in clamp_x(min_x)..=clamp_x(max_x) {
            let p = Point::new(f64::from(x), f64::from(y));
            let (mut sum_w, mut dx, mut dy) = (0.0, 0.0, 0.0);
            for &(target, mx, my) in &moves {
                let weight = (-p.distance_squared(target) / two_r2).exp();
                sum_w += weight;
                dx = weight.mul_add(mx, dx);
                dy = weight.mul_add(my, dy);
            }
            let norm = sum_w.max(1.0);
            let (dx, dy) = (dx / norm, dy / norm);
            if dx.abs() < MIN_SHIFT && dy.abs() < MIN_SHIFT {
                continue;
            }
            out.put_pixel(x, y, sample(image, p.x - dx, p.y - dy));
        }
    }
    out
}

/// Applier for every geometry effect.
#[derive(Debug, Clone, Copy, Default)]
pub struct SurgeryApplier;

impl EffectApplier for SurgeryApplier {
    fn apply(
        &self,
        image: &RgbaImage,
        landmarks: &LandmarkSet,
        config: &EffectConfig,
    ) -> Result<AppliedEffect, ApplierError> {
        let mut moved = landmarks.clone();
        match config {
            EffectConfig::NoseSurgery(c) => nose(&mut moved, c)?,
            EffectConfig::EyeSurgery(c) => eyes(&mut moved, c)?,
            EffectConfig::JawlineSurgery(c) => jawline(&mut moved, c)?,
            EffectConfig::CheekboneSurgery(c) => cheekbones(&mut moved, c)?,
            other => {
                return Err(ApplierError::UnsupportedConfig { effect: other.id() });
            }
        }
        let (width, _) = regions::face_size(landmarks)?;
        Ok(AppliedEffect {
            image: warp(image, landmarks, &moved, width * FALLOFF),
            landmarks: Some(moved),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::appliers::template_landmarks;
    use crate::effect::{BlendMode, BlushConfig, EffectId};
    use crate::types::Color;

    fn checker(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| {
            if (x / 4 + y / 4) % 2 == 0 {
                Rgba([230, 190, 170, 255])
            } else {
                Rgba([120, 80, 60, 255])
            }
        })
    }

    #[test]
    fn bilinear_sample_interpolates_and_clamps() {
        let img = RgbaImage::from_fn(2, 1, |x, _| Rgba([if x == 0 { 0 } else { 100 }, 0, 0, 255]));
        assert_eq!(sample(&img, 0.5, 0.0).0[0], 50);
        assert_eq!(sample(&img, -3.0, 0.0).0[0], 0);
        assert_eq!(sample(&img, 9.0, 9.0).0[0], 100);
    }

    #[test]
    fn unmoved_landmarks_leave_image_alone() {
        let img = checker(32, 32);
        let lm = template_landmarks(32, 32);
        assert_eq!(warp(&img, &lm, &lm, 4.0), img);
    }

    #[test]
    fn zero_adjustment_is_identity() {
        let img = checker(64, 64);
        let lm = template_landmarks(64, 64);
        let out = SurgeryApplier
            .apply(&img, &lm, &EffectConfig::NoseSurgery(NoseConfig::default()))
            .unwrap();
        assert_eq!(out.image, img);
        assert_eq!(out.landmarks, Some(lm));
    }

    #[test]
    fn every_geometry_effect_moves_landmarks_and_pixels() {
        let (w, h) = (96, 96);
        let img = checker(w, h);
        let lm = template_landmarks(w, h);
        let configs = [
            EffectConfig::NoseSurgery(NoseConfig {
                height: 0.5,
                width: -0.6,
                tip: 0.3,
                bridge: -0.4,
            }),
            EffectConfig::EyeSurgery(EyeConfig {
                size: 0.8,
                shape: 0.2,
                position: 0.3,
                angle: 0.5,
            }),
            EffectConfig::JawlineSurgery(JawlineConfig {
                width: -0.7,
                angle: 0.4,
                length: 0.6,
            }),
            EffectConfig::CheekboneSurgery(CheekboneConfig {
                height: 0.5,
                width: 0.6,
                prominence: 0.4,
            }),
        ];
        for config in &configs {
            let out = SurgeryApplier.apply(&img, &lm, config).unwrap();
            let moved = out.landmarks.unwrap();
            assert_eq!(moved.len(), lm.len());
            assert_ne!(moved, lm, "{} moved nothing", config.id());
            assert_ne!(out.image, img, "{} warped nothing", config.id());
            assert_eq!(out.image.dimensions(), (w, h));
        }
    }

    #[test]
    fn longer_jaw_moves_chin_down() {
        let lm = template_landmarks(100, 100);
        let out = SurgeryApplier
            .apply(
                &checker(100, 100),
                &lm,
                &EffectConfig::JawlineSurgery(JawlineConfig {
                    length: 1.0,
                    ..JawlineConfig::default()
                }),
            )
            .unwrap();
        let before = lm.get(regions::CHIN_TIP).unwrap().y;
        let after = out.landmarks.unwrap().get(regions::CHIN_TIP).unwrap().y;
        assert!((after - before - 4.0).abs() < 1e-9);
    }

    #[test]
    fn appearance_configs_are_unsupported() {
        let config = EffectConfig::Blush(BlushConfig {
            color: Color::rgb(1, 2, 3),
            intensity: 0.5,
            blend_mode: BlendMode::Normal,
        });
        assert_eq!(
            SurgeryApplier
                .apply(&checker(8, 8), &LandmarkSet::default(), &config)
                .unwrap_err(),
            ApplierError::UnsupportedConfig {
                effect: EffectId::BLUSH
            }
        );
    }
}
